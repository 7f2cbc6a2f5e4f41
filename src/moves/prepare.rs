use log::debug;
use nalgebra::{Rotation3, Unit, Vector3};
use std::f64::consts::PI;

use crate::atoms::AtomRecord;
use crate::components::center_of_mass;
use crate::error::{Error, Result};
use crate::moves::{random_configuration, MoveType, Trial, TrialState};
use crate::variables::Variables;

impl Variables {
    /// Draw the random numbers for one trial and build the trial configuration.
    /// Nothing committed is modified.
    ///
    /// `molecule` is the molecule's index inside `component`; an insertion
    /// targets the next free index (the current number of molecules).
    pub fn single_body_prepare(&mut self, box_index: usize, molecule: usize, component: usize, move_type: MoveType) -> Result<()> {
        self.check_box(box_index)?;
        let sim = &mut self.sims[box_index];
        let comps = &mut self.system_components[box_index];

        if sim.has_pending_trial() {
            return Err(Error::sequencing(
                box_index,
                format!("prepare of {move_type} while {}", sim.trial.describe()),
            ));
        }
        comps.check_component(component)?;
        if comps.is_host(component) {
            return Err(Error::InvalidMove {
                component,
                molecule,
                detail: "framework components are rigid".to_string(),
            });
        }
        comps.ensure_consistent(box_index, component, &sim.d_a)?;

        let n_mol = sim.d_a[component].num_molecules();
        let valid = match move_type {
            MoveType::SingleInsertion => molecule == n_mol,
            _ => molecule < n_mol,
        };
        if !valid {
            return Err(Error::InvalidMove {
                component,
                molecule,
                detail: format!("{move_type} with {n_mol} molecules present"),
            });
        }

        let cycle = sim.cycle;
        let old = if move_type == MoveType::SingleInsertion {
            Vec::new()
        } else {
            sim.d_a[component]
                .molecule(molecule)
                .map_err(|f| f.into_error("read_molecule", box_index, move_type.name(), cycle))?
        };

        let def = &comps.components[component];
        let candidates = match move_type {
            MoveType::Translation => {
                let r = self.random.uniform3()?;
                let disp = Vector3::new(2.0 * r[0] - 1.0, 2.0 * r[1] - 1.0, 2.0 * r[2] - 1.0) * def.max_translation;
                vec![old.iter().map(|a| AtomRecord { pos: a.pos + disp, ..*a }).collect()]
            }
            MoveType::Rotation => {
                let r = self.random.uniform3()?;
                let masses = old
                    .iter()
                    .map(|a| self.pseudo_atoms.mass_of(a.atom_type))
                    .collect::<Result<Vec<f64>>>()?;
                let com = center_of_mass(&old, &masses);
                // uniform axis on the sphere from two numbers, angle from the third
                let cos_theta = 2.0 * r[0] - 1.0;
                let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
                let phi = 2.0 * PI * r[1];
                let axis = Unit::new_normalize(Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta));
                let rot = Rotation3::from_axis_angle(&axis, (2.0 * r[2] - 1.0) * def.max_rotation);
                vec![old
                    .iter()
                    .map(|a| AtomRecord {
                        pos: com + rot * (a.pos - com),
                        ..*a
                    })
                    .collect()]
            }
            MoveType::SingleInsertion | MoveType::SingleDeletion => {
                let k = def.trial_positions.max(1);
                let extra = if move_type == MoveType::SingleInsertion { k } else { k - 1 };
                let mut out = Vec::with_capacity(extra);
                for _ in 0..extra {
                    let r = self.random.take(6)?;
                    out.push(random_configuration(&def.template, &sim.boxsize, r, molecule));
                }
                out
            }
        };

        let trial = Trial {
            component,
            molecule,
            move_type,
            old,
            candidates,
        };
        debug!("box {box_index}: proposed {}", trial.describe());
        sim.trial = TrialState::Proposed(trial);
        Ok(())
    }
}
