/*
In-memory run configuration.

Everything `Variables::from_input` needs to build a run: pseudo atoms, force-field
settings and per-atom parameters, boxes with their components, cycle counts and
engine knobs. Loadable from JSON; every field has a default.

The pseudo-atom order fixes the type indices. `force_field.atom_ff` entries are
matched to pseudo atoms by name.
 */

use log::info;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::atoms::AtomRecord;
use crate::components::{Component, Components, MoveProbabilities};
use crate::constants::{DEFAULT_EWALD_PRECISION, DEFAULT_NBLOCKS, DEFAULT_RANDOM_SIZE};
use crate::error::{Error, Result};
use crate::force_field::{AtomFF, ForceField, InputContainer};
use crate::pbc::Boxsize;
use crate::pseudo_atoms::PseudoAtomDefinitions;
use crate::random_number::RandomNumber;
use crate::variables::{CycleCounts, Variables};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PseudoAtomInput {
    pub name: String,
    pub symbol: String,
    pub mass: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateAtomInput {
    pub pseudo_atom: String,
    pub position: [f64; 3],
    pub charge: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentInput {
    pub name: String,
    pub framework: bool,
    pub atoms: Vec<TemplateAtomInput>,
    pub fugacity_coefficient: f64,
    pub mol_fraction: f64,
    pub probabilities: MoveProbabilities,
    pub max_translation: f64,
    pub max_rotation: f64,
    pub create_molecules: usize,
    pub trial_positions: usize,
    /// molecules placed at setup, each a list of positions in template order
    pub molecules: Vec<Vec<[f64; 3]>>,
}

impl Default for ComponentInput {
    fn default() -> Self {
        ComponentInput {
            name: String::new(),
            framework: false,
            atoms: Vec::new(),
            fugacity_coefficient: 1.0,
            mol_fraction: 1.0,
            probabilities: MoveProbabilities::default(),
            max_translation: 1.0,
            max_rotation: 0.5,
            create_molecules: 0,
            trial_positions: 1,
            molecules: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxInput {
    /// a, b, c in Angstrom
    pub lengths: [f64; 3],
    /// alpha, beta, gamma in degrees
    pub angles: [f64; 3],
    pub temperature: f64,
    /// Pa
    pub pressure: f64,
    pub components: Vec<ComponentInput>,
}

impl Default for BoxInput {
    fn default() -> Self {
        BoxInput {
            lengths: [30.0; 3],
            angles: [90.0; 3],
            temperature: 300.0,
            pressure: 1.0e5,
            components: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationInput {
    pub seed: u64,
    pub random_size: usize,
    pub nblocks: usize,
    pub ewald_precision: f64,
    pub adjust_every: usize,
    pub max_create_attempts: usize,
    pub show_progress: bool,
    pub cycles: CycleCounts,
    pub pseudo_atoms: Vec<PseudoAtomInput>,
    pub force_field: InputContainer,
    pub boxes: Vec<BoxInput>,
}

impl Default for SimulationInput {
    fn default() -> Self {
        SimulationInput {
            seed: 42,
            random_size: DEFAULT_RANDOM_SIZE,
            nblocks: DEFAULT_NBLOCKS,
            ewald_precision: DEFAULT_EWALD_PRECISION,
            adjust_every: 10,
            max_create_attempts: 10_000,
            show_progress: false,
            cycles: CycleCounts::default(),
            pseudo_atoms: Vec::new(),
            force_field: InputContainer::default(),
            boxes: Vec::new(),
        }
    }
}

impl SimulationInput {
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        let input: SimulationInput = serde_json::from_reader(reader)?;
        info!("loaded configuration from {}", path.as_ref().display());
        Ok(input)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// Small self-contained system: united-atom methane and rigid CO2 in an
    /// empty 30 A box at 300 K and 1 bar.
    pub fn demo() -> Self {
        let pseudo = |name: &str, symbol: &str, mass: f64| PseudoAtomInput {
            name: name.to_string(),
            symbol: symbol.to_string(),
            mass,
        };
        let ff = |name: &str, epsilon: f64, sigma: f64| AtomFF {
            name: name.to_string(),
            epsilon,
            sigma,
            shift: false,
            tail: true,
        };
        let atom = |pseudo_atom: &str, x: f64, charge: f64| TemplateAtomInput {
            pseudo_atom: pseudo_atom.to_string(),
            position: [x, 0.0, 0.0],
            charge,
        };
        let mover = MoveProbabilities {
            translation: 1.0,
            rotation: 1.0,
            insertion: 1.0,
            deletion: 1.0,
        };
        SimulationInput {
            cycles: CycleCounts {
                initialization: 20,
                equilibration: 20,
                production: 50,
            },
            pseudo_atoms: vec![
                pseudo("CH4_sp3", "C", 16.04246),
                pseudo("C_co2", "C", 12.0107),
                pseudo("O_co2", "O", 15.9994),
            ],
            force_field: InputContainer {
                atom_ff: vec![
                    ff("CH4_sp3", 158.5, 3.72),
                    ff("C_co2", 27.0, 2.80),
                    ff("O_co2", 79.0, 3.05),
                ],
                ..InputContainer::default()
            },
            boxes: vec![BoxInput {
                components: vec![
                    ComponentInput {
                        name: "methane".to_string(),
                        atoms: vec![atom("CH4_sp3", 0.0, 0.0)],
                        probabilities: MoveProbabilities {
                            rotation: 0.0,
                            ..mover
                        },
                        create_molecules: 10,
                        ..ComponentInput::default()
                    },
                    ComponentInput {
                        name: "CO2".to_string(),
                        atoms: vec![
                            atom("O_co2", -1.16, -0.35),
                            atom("C_co2", 0.0, 0.70),
                            atom("O_co2", 1.16, -0.35),
                        ],
                        probabilities: mover,
                        create_molecules: 5,
                        trial_positions: 4,
                        ..ComponentInput::default()
                    },
                ],
                ..BoxInput::default()
            }],
            ..SimulationInput::default()
        }
    }
}

fn template_atoms(input: &ComponentInput, pseudo: &PseudoAtomDefinitions) -> Result<Vec<AtomRecord>> {
    input
        .atoms
        .iter()
        .map(|a| {
            let atom_type = pseudo.index_of(&a.pseudo_atom).ok_or_else(|| {
                Error::InvalidParameter(format!(
                    "component '{}' uses unknown pseudo atom '{}'",
                    input.name, a.pseudo_atom
                ))
            })?;
            let [x, y, z] = a.position;
            Ok(AtomRecord::new(Vector3::new(x, y, z), a.charge, atom_type, 0))
        })
        .collect()
}

impl Variables {
    /// Build the whole context: pseudo atoms, mixed force field, random pool and
    /// every box (uploaded, with its starting energy computed).
    pub fn from_input(input: &SimulationInput) -> Result<Self> {
        let mut pseudo = PseudoAtomDefinitions::default();
        for p in &input.pseudo_atoms {
            pseudo.push(&p.name, &p.symbol, p.mass)?;
        }

        // per-atom parameters in pseudo-atom order
        let mut container = input.force_field.clone();
        container.atom_ff = pseudo
            .name
            .iter()
            .map(|name| {
                input
                    .force_field
                    .atom_ff
                    .iter()
                    .find(|a| &a.name == name)
                    .cloned()
                    .ok_or_else(|| Error::InvalidParameter(format!("no force-field parameters for '{name}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        container.process_mixing()?;
        let force_field = ForceField::from_input(&container)?;

        let random = RandomNumber::new(input.random_size, input.seed)?;
        let mut vars = Variables::new(force_field, pseudo, random)?;
        vars.cycles = input.cycles;
        vars.ewald_precision = input.ewald_precision;
        vars.adjust_every = input.adjust_every;
        vars.max_create_attempts = input.max_create_attempts;
        vars.show_progress = input.show_progress;

        for b in &input.boxes {
            let [a, bb, c] = b.lengths;
            let [al, be, ga] = b.angles;
            let boxsize = Boxsize::from_lengths_and_angles(a, bb, c, al, be, ga)?;
            let mut comps = Components::new(b.temperature, b.pressure, vars.pseudo_atoms.len())?;
            for ci in &b.components {
                let atoms = template_atoms(ci, &vars.pseudo_atoms)?;
                let mut def = Component::new(&ci.name, ci.framework, &atoms, &vars.pseudo_atoms)?;
                def.fugacity_coefficient = ci.fugacity_coefficient;
                def.mol_fraction = ci.mol_fraction;
                def.probabilities = ci.probabilities;
                def.max_translation = ci.max_translation;
                def.max_rotation = ci.max_rotation;
                def.create_molecules = ci.create_molecules;
                def.trial_positions = ci.trial_positions.max(1);
                let molsize = def.molsize();
                let capacity = molsize * (ci.molecules.len() + ci.create_molecules).max(1);
                let component = comps.add_component(def, capacity)?;

                // a framework without explicit placements sits at its template positions
                if ci.framework && ci.molecules.is_empty() {
                    comps.push_molecule(component, &atoms)?;
                }
                for positions in &ci.molecules {
                    if positions.len() != molsize {
                        return Err(Error::InvalidParameter(format!(
                            "component '{}': molecule with {} positions, expected {molsize}",
                            ci.name,
                            positions.len()
                        )));
                    }
                    let placed: Vec<AtomRecord> = atoms
                        .iter()
                        .zip(positions)
                        .map(|(t, &[x, y, z])| AtomRecord {
                            pos: Vector3::new(x, y, z),
                            ..*t
                        })
                        .collect();
                    comps.push_molecule(component, &placed)?;
                }
            }
            vars.add_box(comps, boxsize, input.nblocks)?;
        }
        Ok(vars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_builds() {
        let mut input = SimulationInput::demo();
        input.random_size = 10_000;
        let vars = Variables::from_input(&input).unwrap();
        assert_eq!(vars.num_boxes(), 1);
        assert_eq!(vars.force_field.size, 3);
        let comps = &vars.system_components[0];
        assert_eq!(comps.counts.adsorbate, 2);
        assert_eq!(comps.num_molecules, vec![0, 0]);
        assert!(vars.sims[0].ewald.is_enabled());
    }

    #[test]
    fn test_json_defaults_fill_in() {
        let input = SimulationInput::from_json_str(
            r#"{ "seed": 7, "cycles": { "production": 3 }, "boxes": [ { "temperature": 250.0 } ] }"#,
        )
        .unwrap();
        assert_eq!(input.seed, 7);
        assert_eq!(input.cycles.production, 3);
        assert_eq!(input.cycles.initialization, 0);
        assert_eq!(input.boxes[0].lengths, [30.0; 3]);
        assert_eq!(input.boxes[0].temperature, 250.0);
        assert_eq!(input.nblocks, DEFAULT_NBLOCKS);
    }

    #[test]
    fn test_missing_force_field_entry() {
        let mut input = SimulationInput::demo();
        input.random_size = 100;
        input.force_field.atom_ff.pop();
        assert!(matches!(Variables::from_input(&input), Err(Error::InvalidParameter(_))));
    }

    #[test]
    fn test_demo_round_trips_through_json() {
        let input = SimulationInput::demo();
        let text = serde_json::to_string(&input).unwrap();
        let back = SimulationInput::from_json_str(&text).unwrap();
        assert_eq!(back.boxes[0].components.len(), 2);
        assert_eq!(back.force_field.atom_ff.len(), 3);
    }
}
