/*
Pseudo-atom definitions: the interaction sites every Atoms store refers to
through its `Type` index. Immutable once the force field is loaded.
 */

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PseudoAtomDefinitions {
    pub name: Vec<String>,
    pub symbol: Vec<String>,
    pub symbol_index: Vec<usize>,
    pub mass: Vec<f64>,
}

/// One row of the definitions table.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PseudoAtom<'a> {
    pub name: &'a str,
    pub symbol: &'a str,
    pub symbol_index: usize,
    pub mass: f64,
}

impl PseudoAtomDefinitions {
    /// Register a pseudo atom; sites sharing a chemical symbol share a symbol index.
    pub fn push(&mut self, name: &str, symbol: &str, mass: f64) -> Result<usize> {
        if self.index_of(name).is_some() {
            return Err(Error::InvalidParameter(format!(
                "pseudo atom '{name}' defined twice"
            )));
        }
        if mass < 0.0 {
            return Err(Error::InvalidParameter(format!(
                "pseudo atom '{name}' has negative mass {mass}"
            )));
        }
        let symbol_index = match self.symbol.iter().position(|s| s == symbol) {
            Some(i) => self.symbol_index[i],
            None => self.symbol_index.iter().max().map_or(0, |m| m + 1),
        };
        self.name.push(name.to_string());
        self.symbol.push(symbol.to_string());
        self.symbol_index.push(symbol_index);
        self.mass.push(mass);
        Ok(self.name.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.name.iter().position(|n| n == name)
    }

    pub fn get(&self, index: usize) -> Result<PseudoAtom<'_>> {
        if index >= self.len() {
            return Err(Error::invalid_index("pseudo atom", index, self.len()));
        }
        Ok(PseudoAtom {
            name: &self.name[index],
            symbol: &self.symbol[index],
            symbol_index: self.symbol_index[index],
            mass: self.mass[index],
        })
    }

    pub fn mass_of(&self, index: usize) -> Result<f64> {
        self.get(index).map(|p| p.mass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_index_shared() {
        let mut defs = PseudoAtomDefinitions::default();
        let o_co2 = defs.push("O_co2", "O", 15.9994).unwrap();
        let c_co2 = defs.push("C_co2", "C", 12.0).unwrap();
        let o_h2o = defs.push("O_h2o", "O", 15.9994).unwrap();
        assert_eq!(defs.len(), 3);
        assert_eq!(defs.symbol_index[o_co2], defs.symbol_index[o_h2o]);
        assert_ne!(defs.symbol_index[o_co2], defs.symbol_index[c_co2]);
    }

    #[test]
    fn test_duplicate_and_lookup() {
        let mut defs = PseudoAtomDefinitions::default();
        defs.push("CH4", "C", 16.04).unwrap();
        assert!(defs.push("CH4", "C", 16.04).is_err());
        assert_eq!(defs.index_of("CH4"), Some(0));
        assert_eq!(defs.get(0).unwrap().name, "CH4");
        assert!(defs.get(1).is_err());
    }
}
