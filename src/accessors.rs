/*
Symbolic field names for the array accessors.

Names are parsed once into a closed set of variants; anything outside the set is
`UnknownFieldName`. Accepted names:

    FF.epsilon, FF.sigma, FF.shift                  (f64 tables, n_types^2)
    FF.FFType                                       (i32 table, n_types^2)
    Vars.SystemComponents[i].HostSystem[j].charge   (f64, one per atom)
 */

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ArrayField {
    Epsilon,
    Sigma,
    Shift,
    Charge { system: usize, component: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IntArrayField {
    FfType,
}

/// Parse `<prefix>[<index>]` and return the index and the remainder after `]`.
fn bracketed<'a>(s: &'a str, prefix: &str) -> Option<(usize, &'a str)> {
    let rest = s.strip_prefix(prefix)?.strip_prefix('[')?;
    let close = rest.find(']')?;
    let index = rest[..close].trim().parse().ok()?;
    Some((index, &rest[close + 1..]))
}

impl FromStr for ArrayField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FF.epsilon" => return Ok(ArrayField::Epsilon),
            "FF.sigma" => return Ok(ArrayField::Sigma),
            "FF.shift" => return Ok(ArrayField::Shift),
            _ => {}
        }
        let charge = bracketed(s, "Vars.SystemComponents").and_then(|(system, rest)| {
            let (component, rest) = bracketed(rest, ".HostSystem")?;
            (rest == ".charge").then_some(ArrayField::Charge { system, component })
        });
        charge.ok_or_else(|| Error::UnknownFieldName(s.to_string()))
    }
}

impl FromStr for IntArrayField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "FF.FFType" => Ok(IntArrayField::FfType),
            _ => Err(Error::UnknownFieldName(s.to_string())),
        }
    }
}

impl fmt::Display for ArrayField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArrayField::Epsilon => f.write_str("FF.epsilon"),
            ArrayField::Sigma => f.write_str("FF.sigma"),
            ArrayField::Shift => f.write_str("FF.shift"),
            ArrayField::Charge { system, component } => {
                write!(f, "Vars.SystemComponents[{system}].HostSystem[{component}].charge")
            }
        }
    }
}

impl fmt::Display for IntArrayField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntArrayField::FfType => f.write_str("FF.FFType"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_force_field_names() {
        assert_eq!("FF.epsilon".parse::<ArrayField>().unwrap(), ArrayField::Epsilon);
        assert_eq!("FF.shift".parse::<ArrayField>().unwrap(), ArrayField::Shift);
        assert_eq!("FF.FFType".parse::<IntArrayField>().unwrap(), IntArrayField::FfType);
    }

    #[test]
    fn test_charge_name_with_indices() {
        let f: ArrayField = "Vars.SystemComponents[2].HostSystem[13].charge".parse().unwrap();
        assert_eq!(
            f,
            ArrayField::Charge {
                system: 2,
                component: 13
            }
        );
        assert_eq!(f.to_string(), "Vars.SystemComponents[2].HostSystem[13].charge");
    }

    #[test]
    fn test_unknown_names() {
        for bad in [
            "FF.epsilons",
            "FF.FFType",
            "Vars.SystemComponents[0].HostSystem[0].pos",
            "Vars.SystemComponents[x].HostSystem[0].charge",
            "",
        ] {
            assert!(matches!(bad.parse::<ArrayField>(), Err(Error::UnknownFieldName(_))));
        }
        assert!(matches!("FF.epsilon".parse::<IntArrayField>(), Err(Error::UnknownFieldName(_))));
    }
}
