/*
Force field: pairwise interaction tables plus the global cutoffs.

Tables are flat, indexed by `type_i * size + type_j`, and symmetric. They are
built once from an `InputContainer` (per-atom parameters + mixing) and then only
read during the simulation.

Lorentz-Berthelot mixing rules:
    eps_ij   = sqrt(eps_i * eps_j)
    sigma_ij = (sigma_i + sigma_j) / 2
 */

use log::debug;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CUTOFF, DEFAULT_OVERLAP_CRITERIA};
use crate::error::{Error, Result};
use crate::lj_parameters::{lennard_jones_potential, lennard_jones_tail};

/// Per pseudo-atom parameters as they come out of the force-field input.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtomFF {
    pub name: String,
    pub epsilon: f64,
    pub sigma: f64,
    pub shift: bool,
    pub tail: bool,
}

/// Long-range correction for one type pair.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Tail {
    pub use_tail: bool,
    pub energy: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum PotentialKind {
    None = 0,
    LennardJones = 1,
}

impl PotentialKind {
    pub fn from_i32(v: i32) -> Self {
        match v {
            1 => PotentialKind::LennardJones,
            _ => PotentialKind::None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PairParameters {
    pub epsilon: f64,
    pub sigma: f64,
    pub shift: f64,
    pub kind: PotentialKind,
}

/// Force-field input: per-atom parameters, global settings, and the mixed tables.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct InputContainer {
    pub atom_ff: Vec<AtomFF>,
    #[serde(skip)]
    pub mix_epsilon: Vec<f64>,
    #[serde(skip)]
    pub mix_sigma: Vec<f64>,
    #[serde(skip)]
    pub mix_shift: Vec<f64>,
    #[serde(skip)]
    pub mix_tail: Vec<Tail>,
    pub cutoff_vdw: f64,
    pub cutoff_coul: f64,
    pub vdw_real_bias: bool,
    pub overlap_criteria: f64,
    pub no_charges: bool,
}

impl Default for InputContainer {
    fn default() -> Self {
        InputContainer {
            atom_ff: Vec::new(),
            mix_epsilon: Vec::new(),
            mix_sigma: Vec::new(),
            mix_shift: Vec::new(),
            mix_tail: Vec::new(),
            cutoff_vdw: DEFAULT_CUTOFF,
            cutoff_coul: DEFAULT_CUTOFF,
            vdw_real_bias: true,
            overlap_criteria: DEFAULT_OVERLAP_CRITERIA,
            no_charges: false,
        }
    }
}

impl InputContainer {
    /// Fill the mixed n x n tables from the per-atom parameters.
    pub fn process_mixing(&mut self) -> Result<()> {
        if self.cutoff_vdw <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "VDW cutoff must be positive, got {}",
                self.cutoff_vdw
            )));
        }
        let n = self.atom_ff.len();
        self.mix_epsilon = vec![0.0; n * n];
        self.mix_sigma = vec![0.0; n * n];
        self.mix_shift = vec![0.0; n * n];
        self.mix_tail = vec![Tail::default(); n * n];

        for (i, a) in self.atom_ff.iter().enumerate() {
            for (j, b) in self.atom_ff.iter().enumerate() {
                let idx = i * n + j;
                let epsilon = (a.epsilon * b.epsilon).sqrt();
                let sigma = 0.5 * (a.sigma + b.sigma);
                self.mix_epsilon[idx] = epsilon;
                self.mix_sigma[idx] = sigma;
                if a.shift || b.shift {
                    self.mix_shift[idx] = lennard_jones_potential(self.cutoff_vdw, sigma, epsilon);
                }
                if a.tail || b.tail {
                    self.mix_tail[idx] = Tail {
                        use_tail: true,
                        energy: lennard_jones_tail(epsilon, sigma, self.cutoff_vdw),
                    };
                }
            }
        }
        debug!("mixed force field for {n} pseudo atoms");
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct ForceField {
    pub epsilon: Vec<f64>,
    pub sigma: Vec<f64>,
    pub shift: Vec<f64>,
    pub ff_type: Vec<i32>,
    pub tail: Vec<Tail>,
    /// number of pseudo-atom types; tables hold size * size entries
    pub size: usize,
    pub cutoff_vdw: f64,
    pub cutoff_coul: f64,
    pub overlap_criteria: f64,
    pub vdw_real_bias: bool,
    pub no_charges: bool,
}

impl ForceField {
    /// All-zero tables for `size` types.
    pub fn new(size: usize) -> Self {
        ForceField {
            epsilon: vec![0.0; size * size],
            sigma: vec![0.0; size * size],
            shift: vec![0.0; size * size],
            ff_type: vec![PotentialKind::None as i32; size * size],
            tail: vec![Tail::default(); size * size],
            size,
            cutoff_vdw: DEFAULT_CUTOFF,
            cutoff_coul: DEFAULT_CUTOFF,
            overlap_criteria: DEFAULT_OVERLAP_CRITERIA,
            vdw_real_bias: true,
            no_charges: false,
        }
    }

    pub fn from_input(input: &InputContainer) -> Result<Self> {
        let n = input.atom_ff.len();
        let mut input = input.clone();
        if input.mix_epsilon.len() != n * n {
            input.process_mixing()?;
        }
        let mut ff = ForceField::new(n);
        ff.cutoff_vdw = input.cutoff_vdw;
        ff.cutoff_coul = input.cutoff_coul;
        ff.overlap_criteria = input.overlap_criteria;
        ff.vdw_real_bias = input.vdw_real_bias;
        ff.no_charges = input.no_charges;
        ff.epsilon = input.mix_epsilon;
        ff.sigma = input.mix_sigma;
        ff.shift = input.mix_shift;
        ff.tail = input.mix_tail;
        ff.ff_type = ff
            .epsilon
            .iter()
            .map(|&e| {
                if e > 0.0 {
                    PotentialKind::LennardJones as i32
                } else {
                    PotentialKind::None as i32
                }
            })
            .collect();
        ff.validate()?;
        Ok(ff)
    }

    #[inline]
    pub fn index(&self, type_i: usize, type_j: usize) -> usize {
        type_i * self.size + type_j
    }

    #[inline]
    pub fn lookup(&self, type_i: usize, type_j: usize) -> PairParameters {
        let idx = self.index(type_i, type_j);
        PairParameters {
            epsilon: self.epsilon[idx],
            sigma: self.sigma[idx],
            shift: self.shift[idx],
            kind: PotentialKind::from_i32(self.ff_type[idx]),
        }
    }

    /// Set one pair, keeping the tables symmetric.
    pub fn set_pair(&mut self, type_i: usize, type_j: usize, epsilon: f64, sigma: f64, shift: bool) -> Result<()> {
        if type_i >= self.size || type_j >= self.size {
            return Err(Error::invalid_index("pseudo atom type", type_i.max(type_j), self.size));
        }
        let shift = if shift {
            lennard_jones_potential(self.cutoff_vdw, sigma, epsilon)
        } else {
            0.0
        };
        let kind = if epsilon > 0.0 {
            PotentialKind::LennardJones
        } else {
            PotentialKind::None
        };
        for idx in [self.index(type_i, type_j), self.index(type_j, type_i)] {
            self.epsilon[idx] = epsilon;
            self.sigma[idx] = sigma;
            self.shift[idx] = shift;
            self.ff_type[idx] = kind as i32;
        }
        Ok(())
    }

    pub fn set_tail(&mut self, type_i: usize, type_j: usize, use_tail: bool) -> Result<()> {
        if type_i >= self.size || type_j >= self.size {
            return Err(Error::invalid_index("pseudo atom type", type_i.max(type_j), self.size));
        }
        let p = self.lookup(type_i, type_j);
        let tail = Tail {
            use_tail,
            energy: if use_tail {
                lennard_jones_tail(p.epsilon, p.sigma, self.cutoff_vdw)
            } else {
                0.0
            },
        };
        let (a, b) = (self.index(type_i, type_j), self.index(type_j, type_i));
        self.tail[a] = tail;
        self.tail[b] = tail;
        Ok(())
    }

    pub fn uses_tail(&self) -> bool {
        self.tail.iter().any(|t| t.use_tail)
    }

    pub fn validate(&self) -> Result<()> {
        let n2 = self.size * self.size;
        for (what, len) in [
            ("epsilon", self.epsilon.len()),
            ("sigma", self.sigma.len()),
            ("shift", self.shift.len()),
            ("FFType", self.ff_type.len()),
            ("tail", self.tail.len()),
        ] {
            if len != n2 {
                return Err(Error::InvalidParameter(format!(
                    "force field table {what} has {len} entries, expected {n2}"
                )));
            }
        }
        for i in 0..self.size {
            for j in (i + 1)..self.size {
                let (a, b) = (self.index(i, j), self.index(j, i));
                if self.epsilon[a] != self.epsilon[b]
                    || self.sigma[a] != self.sigma[b]
                    || self.shift[a] != self.shift[b]
                {
                    return Err(Error::InvalidParameter(format!(
                        "force field tables not symmetric for types ({i}, {j})"
                    )));
                }
            }
        }
        if self.cutoff_vdw <= 0.0 || self.cutoff_coul <= 0.0 {
            return Err(Error::InvalidParameter("cutoffs must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn two_atom_input() -> InputContainer {
        InputContainer {
            atom_ff: vec![
                AtomFF {
                    name: "CH4".to_string(),
                    epsilon: 158.5,
                    sigma: 3.72,
                    shift: false,
                    tail: true,
                },
                AtomFF {
                    name: "Zn".to_string(),
                    epsilon: 62.4,
                    sigma: 2.46,
                    shift: true,
                    tail: false,
                },
            ],
            ..InputContainer::default()
        }
    }

    #[test]
    fn test_lorentz_berthelot_mixing() {
        let ff = ForceField::from_input(&two_atom_input()).unwrap();
        let p = ff.lookup(0, 1);
        assert_relative_eq!(p.epsilon, (158.5f64 * 62.4).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(p.sigma, 0.5 * (3.72 + 2.46), epsilon = 1e-12);
        assert_eq!(p.kind, PotentialKind::LennardJones);
    }

    #[test]
    fn test_tables_are_symmetric() {
        let ff = ForceField::from_input(&two_atom_input()).unwrap();
        for i in 0..ff.size {
            for j in 0..ff.size {
                assert_eq!(ff.lookup(i, j), ff.lookup(j, i));
            }
        }
        assert_eq!(ff.epsilon.len(), ff.size * ff.size);
    }

    #[test]
    fn test_shift_and_tail_flags() {
        let ff = ForceField::from_input(&two_atom_input()).unwrap();
        // pure CH4 pair: no shift, tail on
        assert_eq!(ff.lookup(0, 0).shift, 0.0);
        assert!(ff.tail[ff.index(0, 0)].use_tail);
        // Zn requests a shift, so every pair with Zn is shifted
        assert!(ff.lookup(0, 1).shift != 0.0);
        assert!(!ff.tail[ff.index(1, 1)].use_tail);
    }

    #[test]
    fn test_set_pair_keeps_symmetry() {
        let mut ff = ForceField::new(3);
        ff.set_pair(0, 2, 1.0, 1.0, false).unwrap();
        assert_eq!(ff.lookup(2, 0).epsilon, 1.0);
        assert!(ff.validate().is_ok());
        assert!(ff.set_pair(0, 3, 1.0, 1.0, false).is_err());
    }

    #[test]
    fn test_asymmetric_table_rejected() {
        let mut ff = ForceField::new(2);
        ff.epsilon[1] = 1.0;
        assert!(ff.validate().is_err());
    }
}
