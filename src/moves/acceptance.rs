use log::debug;
use serde::Serialize;

use crate::atoms::SyncOutcome;
use crate::constants::{ANGSTROM3_TO_M3, BOLTZMANN_K};
use crate::energy::MoveEnergy;
use crate::error::{Error, Result};
use crate::moves::{Evaluation, MoveType, Trial, TrialState};
use crate::variables::{SimulationMode, Variables};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct AcceptanceOutcome {
    pub accepted: bool,
    /// acceptance probability the random number was compared against
    pub probability: f64,
    /// host resynchronization performed after a commit
    #[serde(skip)]
    pub sync: Option<SyncOutcome>,
}

/// beta * f * V with f the component's fugacity in Pa and V in Angstrom^3.
fn beta_fugacity_volume(pressure: f64, fugacity_coefficient: f64, mol_fraction: f64, volume: f64, temperature: f64) -> f64 {
    let fugacity = pressure * fugacity_coefficient * mol_fraction;
    fugacity * volume * ANGSTROM3_TO_M3 / (BOLTZMANN_K * temperature)
}

impl Variables {
    /// Accept or reject the evaluated trial. `delta` must be the energy returned
    /// by the preceding Calculation. One random number is drawn in every case;
    /// an overlapping trial is always rejected and never touches the stores.
    pub fn single_body_acceptance(
        &mut self,
        box_index: usize,
        molecule: usize,
        component: usize,
        move_type: MoveType,
        delta: MoveEnergy,
    ) -> Result<AcceptanceOutcome> {
        self.check_box(box_index)?;
        let sim = &mut self.sims[box_index];
        let comps = &mut self.system_components[box_index];

        let (trial, eval): (Trial, Evaluation) = match std::mem::take(&mut sim.trial) {
            TrialState::Evaluated(t, e) if t.matches(component, molecule, move_type) && e.energy == delta => (t, e),
            other => {
                let detail = format!(
                    "acceptance of {move_type} (molecule {molecule}, component {component}) while {}",
                    other.describe()
                );
                sim.trial = other;
                return Err(Error::sequencing(box_index, detail));
            }
        };

        let u = self.random.uniform()?;
        let beta = comps.beta;
        let def = &comps.components[component];
        let d_e = delta.total();
        let n = comps.num_molecules[component] as f64;

        let probability = if eval.overlap {
            0.0
        } else {
            match move_type {
                MoveType::Translation | MoveType::Rotation => (-beta * d_e).exp().min(1.0),
                MoveType::SingleInsertion => {
                    let bfv = beta_fugacity_volume(
                        comps.pressure,
                        def.fugacity_coefficient,
                        def.mol_fraction,
                        sim.boxsize.volume,
                        comps.temperature,
                    );
                    eval.rosenbluth * (-beta * (d_e - eval.bias)).exp() * bfv / (n + 1.0)
                }
                MoveType::SingleDeletion => {
                    let bfv = beta_fugacity_volume(
                        comps.pressure,
                        def.fugacity_coefficient,
                        def.mol_fraction,
                        sim.boxsize.volume,
                        comps.temperature,
                    );
                    eval.rosenbluth * (-beta * (d_e + eval.bias)).exp() * n / bfv
                }
            }
        };

        let accepted = if eval.overlap {
            false
        } else if self.mode == SimulationMode::CreateMolecule {
            true
        } else {
            match move_type {
                MoveType::Translation | MoveType::Rotation => d_e <= 0.0 || u < probability,
                _ => u < probability,
            }
        };

        let mut sync = None;
        if accepted {
            let cycle = sim.cycle;
            let store = &mut sim.d_a[component];
            let written = match move_type {
                MoveType::Translation | MoveType::Rotation => store.write_molecule(molecule, &eval.selected),
                MoveType::SingleInsertion => store.append_molecule(&eval.selected).map(|_| ()),
                MoveType::SingleDeletion => store.remove_molecule(molecule),
            };
            if let Err(f) = written {
                sim.ewald.reject();
                return Err(f.into_error("commit", box_index, move_type.name(), cycle));
            }
            sim.ewald.accept();
            sync = Some(comps.copy_atom_data_from_device(component, &sim.d_a)?);
            if move_type.is_swap() {
                comps.apply_molecule_change(component, move_type == MoveType::SingleInsertion);
            }
            sim.energy += delta;
        } else {
            sim.ewald.reject();
        }

        comps.components[component]
            .stats
            .counter_mut(move_type)
            .record(accepted);
        debug!(
            "box {box_index}: {} {} (p = {:.4}, u = {:.4})",
            trial.describe(),
            if accepted { "accepted" } else { "rejected" },
            probability,
            u
        );
        Ok(AcceptanceOutcome {
            accepted,
            probability,
            sync,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_beta_fugacity_volume() {
        // 1 bar, 1000 A^3, 300 K: N_ideal = pV / kT
        let bfv = beta_fugacity_volume(1e5, 1.0, 1.0, 1000.0, 300.0);
        assert_relative_eq!(bfv, 1e5 * 1e-27 / (1.380_649e-23 * 300.0), epsilon = 1e-12);
        assert_eq!(beta_fugacity_volume(1e5, 1.0, 0.0, 1000.0, 300.0), 0.0);
    }
}
