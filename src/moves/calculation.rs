use log::debug;

use crate::components::molecule_ewald_correction;
use crate::device::DeviceFault;
use crate::energy::{MoveEnergy, Pairing};
use crate::error::{Error, Result};
use crate::interactions::{charge_sites, tail_energy, InteractionContext, MoleculeEnergy};
use crate::moves::{Evaluation, MoveType, Trial, TrialState};
use crate::variables::Variables;

/// exp(-beta E), zero for an overlapping configuration.
fn boltzmann_weight(e: &MoleculeEnergy, beta: f64, vdw_real_bias: bool) -> f64 {
    if e.overlap() {
        0.0
    } else {
        (-beta * e.bias(vdw_real_bias)).exp()
    }
}

impl Variables {
    /// Energy difference (new - old) of the proposed trial against the rest of
    /// the box. An overlapping trial short-circuits to an infeasible energy
    /// (infinite VDW on the side where the overlap was found).
    pub fn single_body_calculation(&mut self, box_index: usize, molecule: usize, component: usize, move_type: MoveType) -> Result<MoveEnergy> {
        self.check_box(box_index)?;
        let sim = &mut self.sims[box_index];
        let comps = &self.system_components[box_index];

        let trial: Trial = match std::mem::take(&mut sim.trial) {
            TrialState::Proposed(t) if t.matches(component, molecule, move_type) => t,
            other => {
                let detail = format!(
                    "calculation of {move_type} (molecule {molecule}, component {component}) while {}",
                    other.describe()
                );
                sim.trial = other;
                return Err(Error::sequencing(box_index, detail));
            }
        };

        let ff = &self.force_field;
        let ctx = InteractionContext {
            ff,
            boxsize: &sim.boxsize,
            launch: &sim.launch,
        };
        let cycle = sim.cycle;
        let fault = move |kernel: &'static str| move |f: DeviceFault| f.into_error(kernel, box_index, move_type.name(), cycle);
        let framework = comps.counts.framework;
        let beta = comps.beta;
        let def = &comps.components[component];

        let mut energy = MoveEnergy::default();
        let mut selected = Vec::new();
        let mut rosenbluth = 1.0;
        let mut bias = 0.0;
        let mut overlap_pairing = None;

        match move_type {
            MoveType::Translation | MoveType::Rotation => {
                let new = &trial.candidates[0];
                let e_new = ctx
                    .molecule_energy(&sim.d_a, framework, component, Some(molecule), new)
                    .map_err(fault("molecule_energy"))?;
                if e_new.overlap() {
                    overlap_pairing = Some(e_new.overlap_pairing());
                } else {
                    let e_old = ctx
                        .molecule_energy(&sim.d_a, framework, component, Some(molecule), &trial.old)
                        .map_err(fault("molecule_energy"))?;
                    let mut old = e_old.to_move_energy();
                    old.take_negative();
                    energy = e_new.to_move_energy() + old;
                    selected = new.clone();
                }
            }
            MoveType::SingleInsertion => {
                let energies = trial
                    .candidates
                    .iter()
                    .map(|c| ctx.molecule_energy(&sim.d_a, framework, component, None, c))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(fault("molecule_energy"))?;
                let weights: Vec<f64> = energies
                    .iter()
                    .map(|e| boltzmann_weight(e, beta, ff.vdw_real_bias))
                    .collect();
                let total: f64 = weights.iter().sum();
                if total <= 0.0 || !total.is_finite() {
                    overlap_pairing = Some(
                        energies
                            .iter()
                            .find(|e| e.overlap())
                            .map_or(Pairing::GuestGuest, |e| e.overlap_pairing()),
                    );
                } else {
                    let pick = if weights.len() == 1 {
                        0
                    } else {
                        let u = self.random.uniform()? * total;
                        let mut acc = 0.0;
                        weights
                            .iter()
                            .position(|w| {
                                acc += w;
                                u < acc
                            })
                            .unwrap_or(weights.len() - 1)
                    };
                    let chosen = energies[pick];
                    energy = chosen.to_move_energy();
                    bias = chosen.bias(ff.vdw_real_bias);
                    rosenbluth = total / weights.len() as f64;
                    selected = trial.candidates[pick].clone();
                }
            }
            MoveType::SingleDeletion => {
                let e_old = ctx
                    .molecule_energy(&sim.d_a, framework, component, Some(molecule), &trial.old)
                    .map_err(fault("molecule_energy"))?;
                // the current position is the first of the k reference trials
                let mut total = (-beta * e_old.bias(ff.vdw_real_bias)).exp();
                for c in &trial.candidates {
                    let e = ctx
                        .molecule_energy(&sim.d_a, framework, component, Some(molecule), c)
                        .map_err(fault("molecule_energy"))?;
                    total += boltzmann_weight(&e, beta, ff.vdw_real_bias);
                }
                let k = (trial.candidates.len() + 1) as f64;
                rosenbluth = if total > 0.0 { k / total } else { 0.0 };
                bias = e_old.bias(ff.vdw_real_bias);
                energy = e_old.to_move_energy();
                energy.take_negative();
            }
        }

        // a correction that is not finite makes the trial infeasible
        if overlap_pairing.is_none() {
            if let Some(correction) = self.correction.as_deref() {
                energy.dnn_e = correction.delta(component, &trial.old, &selected);
                if !energy.dnn_e.is_finite() {
                    debug!("box {box_index}: correction {} for {}", energy.dnn_e, trial.describe());
                    overlap_pairing = Some(Pairing::GuestGuest);
                }
            }
        }

        if let Some(pairing) = overlap_pairing {
            debug!("box {box_index}: {} overlaps", trial.describe());
            let energy = MoveEnergy::infeasible(pairing);
            sim.trial = TrialState::Evaluated(
                trial,
                Evaluation {
                    energy,
                    overlap: true,
                    selected: Vec::new(),
                    rosenbluth: 0.0,
                    bias: 0.0,
                },
            );
            return Ok(energy);
        }

        // reciprocal part: only the guest structure factor moves
        let charged = trial.old.iter().chain(&selected).any(|a| a.charge != 0.0);
        if sim.ewald.is_enabled() && !ff.no_charges && charged {
            let recip = sim
                .ewald
                .trial(&charge_sites(&trial.old), &charge_sites(&selected), &sim.launch)
                .map_err(fault("ewald_delta"))?;
            energy.hg_ewald_e = recip.host_guest;
            energy.gg_ewald_e = recip.guest_guest;
            match move_type {
                MoveType::SingleInsertion => energy.gg_ewald_e += def.ewald_correction,
                MoveType::SingleDeletion => {
                    energy.gg_ewald_e -= molecule_ewald_correction(&trial.old, sim.boxsize.alpha, false)
                }
                _ => {}
            }
        }

        if move_type.is_swap() {
            let sign = if move_type == MoveType::SingleInsertion { 1 } else { -1 };
            let volume = sim.boxsize.volume;
            let before = tail_energy(ff, volume, &comps.host_type_counts, &comps.guest_type_counts);
            let after = tail_energy(
                ff,
                volume,
                &comps.host_type_counts,
                &comps.guest_type_counts_after(component, sign),
            );
            energy.tail_e = after - before;
        }

        debug!(
            "box {box_index}: evaluated {}, dE = {:.5} K",
            trial.describe(),
            energy.total()
        );
        sim.trial = TrialState::Evaluated(
            trial,
            Evaluation {
                energy,
                overlap: false,
                selected,
                rosenbluth,
                bias,
            },
        );
        Ok(energy)
    }
}
