/*
Simulation driver.

    CREATE_MOLECULE   insert `create_molecules` molecules per adsorbate, taking any
                      trial that does not overlap
    INITIALIZATION    Monte Carlo cycles, max displacements tuned towards 50 %
    EQUILIBRATION     same as INITIALIZATION
    PRODUCTION        Monte Carlo cycles, energy and loading averages sampled

A cycle is max(20, number of guest molecules) steps; every step picks an
adsorbate component, a move type and a molecule from the random pool and runs
one Prepare/Calculation/Acceptance trial. Boxes are run one after the other.
 */

use chrono::Utc;
use kdam::tqdm;
use log::{debug, info};
use serde::Serialize;

use crate::constants::{MAX_ROTATION_CAP, MAX_TRANSLATION_CAP, MIN_STEPS_PER_CYCLE, TARGET_ACCEPTANCE};
use crate::energy::MoveEnergy;
use crate::error::{Error, Result};
use crate::moves::MoveType;
use crate::variables::{EnergyCheck, SimulationMode, Variables};

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct MoveTally {
    pub attempted: usize,
    pub accepted: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ModeSummary {
    pub mode: SimulationMode,
    pub cycles: usize,
    pub steps: usize,
    pub translation: MoveTally,
    pub rotation: MoveTally,
    pub insertion: MoveTally,
    pub deletion: MoveTally,
    /// PRODUCTION only: cycle averages of the total energy and of the loading per component
    pub average_energy: Option<f64>,
    pub average_loading: Option<Vec<f64>>,
    pub final_energy: MoveEnergy,
    /// running total against a recomputation at the end of the mode
    pub energy_check: Option<EnergyCheck>,
}

impl ModeSummary {
    fn tally_mut(&mut self, move_type: MoveType) -> &mut MoveTally {
        match move_type {
            MoveType::Translation => &mut self.translation,
            MoveType::Rotation => &mut self.rotation,
            MoveType::SingleInsertion => &mut self.insertion,
            MoveType::SingleDeletion => &mut self.deletion,
        }
    }

    pub fn accepted(&self) -> usize {
        self.translation.accepted + self.rotation.accepted + self.insertion.accepted + self.deletion.accepted
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoxSummary {
    pub box_index: usize,
    pub modes: Vec<ModeSummary>,
    pub final_energy: MoveEnergy,
    pub molecules: Vec<usize>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RunSummary {
    pub started: String,
    pub finished: String,
    pub seed: u64,
    pub random_rounds: usize,
    pub boxes: Vec<BoxSummary>,
}

/// Running sums for PRODUCTION averages.
#[derive(Default)]
struct Averages {
    samples: usize,
    energy: f64,
    loading: Vec<f64>,
}

impl Averages {
    fn sample(&mut self, energy: f64, loading: &[usize]) {
        if self.loading.len() != loading.len() {
            self.loading = vec![0.0; loading.len()];
        }
        self.samples += 1;
        self.energy += energy;
        for (acc, n) in self.loading.iter_mut().zip(loading) {
            *acc += *n as f64;
        }
    }

    fn finish(self) -> (Option<f64>, Option<Vec<f64>>) {
        if self.samples == 0 {
            return (None, None);
        }
        let n = self.samples as f64;
        (
            Some(self.energy / n),
            Some(self.loading.into_iter().map(|l| l / n).collect()),
        )
    }
}

/// Run one full trial. Returns whether it was accepted, or None when the drawn
/// move has no valid target (no molecule to move or delete).
pub fn single_move(vars: &mut Variables, box_index: usize, component: usize, move_type: MoveType) -> Result<Option<bool>> {
    vars.check_box(box_index)?;
    vars.system_components[box_index].check_component(component)?;
    let n_mol = vars.system_components[box_index].num_molecules[component];
    let molecule = match move_type {
        MoveType::SingleInsertion => n_mol,
        _ if n_mol == 0 => return Ok(None),
        _ => vars.random.index(n_mol)?,
    };
    vars.single_body_prepare(box_index, molecule, component, move_type)?;
    let delta = vars.single_body_calculation(box_index, molecule, component, move_type)?;
    let outcome = vars.single_body_acceptance(box_index, molecule, component, move_type, delta)?;
    Ok(Some(outcome.accepted))
}

fn create_molecules(vars: &mut Variables, box_index: usize, summary: &mut ModeSummary) -> Result<()> {
    let comps = &vars.system_components[box_index];
    let targets: Vec<(usize, usize)> = (comps.counts.framework..comps.counts.total)
        .map(|c| (c, comps.components[c].create_molecules))
        .collect();
    for (component, wanted) in targets {
        let mut created = 0;
        let mut attempts = 0;
        while created < wanted {
            if attempts >= vars.max_create_attempts * wanted.max(1) {
                return Err(Error::InvalidParameter(format!(
                    "box {box_index}: placed only {created} of {wanted} molecules of component {component} in {attempts} attempts"
                )));
            }
            attempts += 1;
            let accepted = single_move(vars, box_index, component, MoveType::SingleInsertion)?.unwrap_or(false);
            summary.insertion.attempted += 1;
            summary.steps += 1;
            if accepted {
                summary.insertion.accepted += 1;
                created += 1;
            }
        }
        info!("box {box_index}: created {created} molecules of component {component} ({attempts} attempts)");
    }
    Ok(())
}

/// Scale the max translation and rotation of every adsorbate by acceptance / target.
fn adjust_max_displacements(vars: &mut Variables, box_index: usize) {
    let comps = &mut vars.system_components[box_index];
    let framework = comps.counts.framework;
    for def in comps.components.iter_mut().skip(framework) {
        if let Some(ratio) = def.stats.translation.take_window() {
            let scale = (ratio / TARGET_ACCEPTANCE).clamp(0.5, 1.5);
            def.max_translation = (def.max_translation * scale).clamp(1e-3, MAX_TRANSLATION_CAP);
        }
        if let Some(ratio) = def.stats.rotation.take_window() {
            let scale = (ratio / TARGET_ACCEPTANCE).clamp(0.5, 1.5);
            def.max_rotation = (def.max_rotation * scale).clamp(1e-3, MAX_ROTATION_CAP);
        }
        debug!(
            "{}: max translation {:.4} A, max rotation {:.4} rad",
            def.name, def.max_translation, def.max_rotation
        );
    }
}

fn monte_carlo_cycles(vars: &mut Variables, box_index: usize, mode: SimulationMode, summary: &mut ModeSummary) -> Result<()> {
    let cycles = vars.cycles.for_mode(mode);
    let (framework, total) = {
        let c = &vars.system_components[box_index].counts;
        (c.framework, c.total)
    };
    if framework == total {
        info!("box {box_index}: no adsorbate components, skipping {mode}");
        return Ok(());
    }
    let mut averages = Averages::default();
    let progress = tqdm!(
        0..cycles,
        desc = format!("box {box_index} {mode}"),
        disable = !vars.show_progress
    );
    for cycle in progress {
        vars.sims[box_index].cycle = cycle;
        let steps = vars.system_components[box_index]
            .total_guest_molecules()
            .max(MIN_STEPS_PER_CYCLE);
        for _ in 0..steps {
            let component = framework + vars.random.index(total - framework)?;
            let u = vars.random.uniform()?;
            let Some(move_type) = vars.system_components[box_index].components[component]
                .probabilities
                .select(u)
            else {
                continue;
            };
            summary.steps += 1;
            if let Some(accepted) = single_move(vars, box_index, component, move_type)? {
                let tally = summary.tally_mut(move_type);
                tally.attempted += 1;
                if accepted {
                    tally.accepted += 1;
                }
            }
        }
        summary.cycles += 1;

        match mode {
            SimulationMode::Initialization | SimulationMode::Equilibration => {
                if vars.adjust_every > 0 && (cycle + 1) % vars.adjust_every == 0 {
                    adjust_max_displacements(vars, box_index);
                }
            }
            SimulationMode::Production => {
                let energy = vars.sims[box_index].energy.total();
                averages.sample(energy, &vars.system_components[box_index].num_molecules);
            }
            SimulationMode::CreateMolecule => {}
        }
    }
    let (avg_e, avg_n) = averages.finish();
    summary.average_energy = avg_e;
    summary.average_loading = avg_n;
    Ok(())
}

/// Run one simulation mode on one box, then check the running energy.
pub fn run_simulation_for_one_box(vars: &mut Variables, box_index: usize, mode: SimulationMode) -> Result<ModeSummary> {
    vars.check_box(box_index)?;
    vars.mode = mode;
    info!("box {box_index}: starting {mode}");
    let mut summary = ModeSummary {
        mode,
        cycles: 0,
        steps: 0,
        translation: MoveTally::default(),
        rotation: MoveTally::default(),
        insertion: MoveTally::default(),
        deletion: MoveTally::default(),
        average_energy: None,
        average_loading: None,
        final_energy: MoveEnergy::default(),
        energy_check: None,
    };
    match mode {
        SimulationMode::CreateMolecule => create_molecules(vars, box_index, &mut summary)?,
        _ => monte_carlo_cycles(vars, box_index, mode, &mut summary)?,
    }
    summary.final_energy = vars.sims[box_index].energy;
    summary.energy_check = Some(vars.check_energy(box_index)?);
    info!(
        "box {box_index}: finished {mode}: {} cycles, {} steps, {} accepted, E = {:.5} K",
        summary.cycles,
        summary.steps,
        summary.accepted(),
        summary.final_energy.total()
    );
    Ok(summary)
}

/// Every mode, in order, for every box.
pub fn run(vars: &mut Variables) -> Result<RunSummary> {
    let started = Utc::now();
    let mut boxes = Vec::with_capacity(vars.num_boxes());
    for box_index in 0..vars.num_boxes() {
        let mut modes = Vec::with_capacity(SimulationMode::ALL.len());
        for mode in SimulationMode::ALL {
            modes.push(run_simulation_for_one_box(vars, box_index, mode)?);
        }
        boxes.push(BoxSummary {
            box_index,
            modes,
            final_energy: vars.sims[box_index].energy,
            molecules: vars.system_components[box_index].num_molecules.clone(),
        });
    }
    let finished = Utc::now();
    info!(
        "run finished in {:.3} s",
        (finished - started).num_milliseconds() as f64 / 1000.0
    );
    Ok(RunSummary {
        started: started.to_rfc3339(),
        finished: finished.to_rfc3339(),
        seed: vars.random.seed(),
        random_rounds: vars.random.rounds,
        boxes,
    })
}
