/*
The simulation context.

`Variables` is built once and passed explicitly to everything that needs it: the
force field and pseudo atoms (shared, read-only during moves), the random pool,
and per box the host-side `Components` and the device-side `Simulations`.
 */

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::accessors::{ArrayField, IntArrayField};
use crate::atoms::{AtomRecord, AtomsSnapshot, SyncOutcome};
use crate::components::Components;
use crate::constants::DEFAULT_EWALD_PRECISION;
use crate::energy::MoveEnergy;
use crate::error::{Error, Result};
use crate::ewald::Ewald;
use crate::force_field::{ForceField, PotentialKind};
use crate::interactions::{charge_sites, system_energy, InteractionContext};
use crate::pbc::Boxsize;
use crate::pseudo_atoms::PseudoAtomDefinitions;
use crate::random_number::RandomNumber;
use crate::simulation::Simulations;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SimulationMode {
    CreateMolecule,
    Initialization,
    Equilibration,
    Production,
}

impl SimulationMode {
    pub const ALL: [SimulationMode; 4] = [
        SimulationMode::CreateMolecule,
        SimulationMode::Initialization,
        SimulationMode::Equilibration,
        SimulationMode::Production,
    ];
}

impl fmt::Display for SimulationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SimulationMode::CreateMolecule => "CREATE_MOLECULE",
            SimulationMode::Initialization => "INITIALIZATION",
            SimulationMode::Equilibration => "EQUILIBRATION",
            SimulationMode::Production => "PRODUCTION",
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleCounts {
    pub initialization: usize,
    pub equilibration: usize,
    pub production: usize,
}

impl CycleCounts {
    pub fn for_mode(&self, mode: SimulationMode) -> usize {
        match mode {
            SimulationMode::CreateMolecule => 0,
            SimulationMode::Initialization => self.initialization,
            SimulationMode::Equilibration => self.equilibration,
            SimulationMode::Production => self.production,
        }
    }
}

/// External energy model (e.g. a machine-learned correction). Its value for a
/// trial lands in the DNN_E category.
pub trait EnergyCorrection: Send + Sync {
    fn delta(&self, component: usize, old: &[AtomRecord], new: &[AtomRecord]) -> f64;
}

/// Running total against a from-scratch recomputation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EnergyCheck {
    pub box_index: usize,
    pub running: MoveEnergy,
    pub recomputed: MoveEnergy,
    pub drift: MoveEnergy,
    pub overlap: bool,
}

impl EnergyCheck {
    pub fn total_drift(&self) -> f64 {
        self.drift.total()
    }
}

pub struct Variables {
    pub force_field: ForceField,
    pub pseudo_atoms: PseudoAtomDefinitions,
    pub random: RandomNumber,
    pub system_components: Vec<Components>,
    pub sims: Vec<Simulations>,
    pub cycles: CycleCounts,
    pub mode: SimulationMode,
    pub ewald_precision: f64,
    /// cycles between max displacement adjustments
    pub adjust_every: usize,
    /// insertion attempts per requested molecule in CREATE_MOLECULE
    pub max_create_attempts: usize,
    pub show_progress: bool,
    pub(crate) correction: Option<Box<dyn EnergyCorrection>>,
}

impl Variables {
    pub fn new(force_field: ForceField, pseudo_atoms: PseudoAtomDefinitions, mut random: RandomNumber) -> Result<Self> {
        force_field.validate()?;
        if force_field.size != pseudo_atoms.len() {
            return Err(Error::InvalidParameter(format!(
                "force field has {} types but {} pseudo atoms are defined",
                force_field.size,
                pseudo_atoms.len()
            )));
        }
        random.allocate_random()?;
        random.device_random()?;
        Ok(Variables {
            force_field,
            pseudo_atoms,
            random,
            system_components: Vec::new(),
            sims: Vec::new(),
            cycles: CycleCounts::default(),
            mode: SimulationMode::CreateMolecule,
            ewald_precision: DEFAULT_EWALD_PRECISION,
            adjust_every: 10,
            max_create_attempts: 100_000,
            show_progress: false,
            correction: None,
        })
    }

    pub fn set_energy_correction(&mut self, correction: Box<dyn EnergyCorrection>) {
        self.correction = Some(correction);
    }

    /// Add a box: pick the Ewald parameters, upload the stores to the device and
    /// compute the starting energy.
    pub fn add_box(&mut self, mut comps: Components, mut boxsize: Boxsize, nblocks: usize) -> Result<usize> {
        let box_index = self.sims.len();
        boxsize.check_cutoff(self.force_field.cutoff_vdw)?;
        let charged = !self.force_field.no_charges && comps.components.iter().any(|c| c.has_charges());
        let ewald = if charged {
            boxsize.check_cutoff(self.force_field.cutoff_coul)?;
            boxsize.set_ewald_parameters(self.ewald_precision, self.force_field.cutoff_coul);
            Ewald::new(&boxsize)
        } else {
            boxsize.alpha = 0.0;
            Ewald::disabled()
        };
        for c in comps.components.iter_mut() {
            c.set_ewald_correction(boxsize.alpha);
        }
        let mut sim = Simulations::new(boxsize, nblocks);
        sim.ewald = ewald;
        sim.upload(&comps, box_index)?;
        self.system_components.push(comps);
        self.sims.push(sim);
        let energy = self.initialize_box_energy(box_index)?;
        info!("box {box_index}: initial energy {:.5} K", energy.total());
        Ok(box_index)
    }

    pub fn num_boxes(&self) -> usize {
        self.sims.len()
    }

    pub fn check_box(&self, box_index: usize) -> Result<()> {
        if box_index >= self.sims.len() {
            return Err(Error::invalid_index("box", box_index, self.sims.len()));
        }
        Ok(())
    }

    fn reference_energy(&mut self, box_index: usize) -> Result<(MoveEnergy, bool)> {
        let sim = &self.sims[box_index];
        let comps = &mut self.system_components[box_index];
        comps.copy_all_from_device(&sim.d_a)?;
        let ctx = InteractionContext {
            ff: &self.force_field,
            boxsize: &sim.boxsize,
            launch: &sim.launch,
        };
        system_energy(&ctx, &sim.ewald, comps, box_index)
    }

    /// Rebuild the structure factors and reset the running total from scratch.
    pub fn initialize_box_energy(&mut self, box_index: usize) -> Result<MoveEnergy> {
        self.check_box(box_index)?;
        let (energy, overlap) = self.reference_energy(box_index)?;
        if overlap {
            warn!("box {box_index}: starting configuration contains an overlap");
        }
        let sim = &mut self.sims[box_index];
        let comps = &self.system_components[box_index];
        let mut host = Vec::new();
        let mut guest = Vec::new();
        for c in 0..comps.counts.total {
            let sites = charge_sites(&comps.host_system[c].records().collect::<Vec<_>>());
            if comps.is_host(c) {
                host.extend(sites);
            } else {
                guest.extend(sites);
            }
        }
        let cycle = sim.cycle;
        sim.ewald
            .recompute(&host, &guest, &sim.launch)
            .map_err(|f| f.into_error("ewald_recompute", box_index, "setup", cycle))?;
        sim.energy = energy;
        sim.initial_energy = energy;
        Ok(energy)
    }

    /// Recompute the box energy and compare with the running total.
    pub fn check_energy(&mut self, box_index: usize) -> Result<EnergyCheck> {
        self.check_box(box_index)?;
        let (mut recomputed, overlap) = self.reference_energy(box_index)?;
        let running = self.sims[box_index].energy;
        // the external correction has no from-scratch form
        recomputed.dnn_e = running.dnn_e;
        let mut negative = running;
        negative.take_negative();
        let drift = recomputed + negative;
        info!(
            "box {box_index}: running {:.5} K, recomputed {:.5} K, drift {:.3e} K",
            running.total(),
            recomputed.total(),
            drift.total()
        );
        for (category, value) in drift.iter() {
            if value.abs() > 1e-6 * running.get(category).abs().max(1.0) {
                warn!("box {box_index}: {} drift {:.5e} K", category.name(), value);
            }
        }
        Ok(EnergyCheck {
            box_index,
            running,
            recomputed,
            drift,
            overlap,
        })
    }

    pub fn running_energy(&self, box_index: usize) -> Result<MoveEnergy> {
        self.check_box(box_index)?;
        Ok(self.sims[box_index].energy)
    }

    /// Download one component's device store into the host store.
    pub fn copy_atom_data_from_gpu(&mut self, box_index: usize, component: usize) -> Result<SyncOutcome> {
        self.check_box(box_index)?;
        self.system_components[box_index].copy_atom_data_from_device(component, &self.sims[box_index].d_a)
    }

    /// Read-only view of one host store, valid until its next resync.
    pub fn get_all_atoms(&self, box_index: usize, component: usize) -> Result<AtomsSnapshot<'_>> {
        self.check_box(box_index)?;
        let comps = &self.system_components[box_index];
        comps.check_component(component)?;
        Ok(comps.host_system[component].snapshot())
    }

    pub fn get_pseudo_atom_definitions(&self) -> &PseudoAtomDefinitions {
        &self.pseudo_atoms
    }

    pub fn get_arr(&self, field: ArrayField) -> Result<&[f64]> {
        match field {
            ArrayField::Epsilon => Ok(&self.force_field.epsilon),
            ArrayField::Sigma => Ok(&self.force_field.sigma),
            ArrayField::Shift => Ok(&self.force_field.shift),
            ArrayField::Charge { system, component } => {
                self.check_box(system)?;
                let comps = &self.system_components[system];
                comps.check_component(component)?;
                Ok(comps.host_system[component].charges())
            }
        }
    }

    pub fn get_ptr_int(&self, field: IntArrayField) -> Result<&[i32]> {
        match field {
            IntArrayField::FfType => Ok(&self.force_field.ff_type),
        }
    }

    /// Write one element through a symbolic field. Force-field tables are written
    /// symmetrically; affected boxes get their running energy rebuilt.
    pub fn change_val(&mut self, field: ArrayField, index: usize, value: f64) -> Result<()> {
        let affected: Vec<usize> = match field {
            ArrayField::Charge { system, .. } => vec![system],
            _ => (0..self.sims.len()).collect(),
        };
        for &b in &affected {
            self.check_box(b)?;
            if self.sims[b].has_pending_trial() {
                return Err(Error::sequencing(
                    b,
                    format!("{field} changed while {}", self.sims[b].trial.describe()),
                ));
            }
        }

        match field {
            ArrayField::Charge { system, component } => {
                let sim = &mut self.sims[system];
                let comps = &mut self.system_components[system];
                comps.check_component(component)?;
                comps.copy_atom_data_from_device(component, &sim.d_a)?;
                let len = comps.host_system[component].size();
                if index >= len {
                    return Err(Error::invalid_index("atom", index, len));
                }
                // a first nonzero charge in an uncharged box switches Ewald on
                if value != 0.0 && !self.force_field.no_charges && !sim.ewald.is_enabled() {
                    sim.boxsize.check_cutoff(self.force_field.cutoff_coul)?;
                    sim.boxsize
                        .set_ewald_parameters(self.ewald_precision, self.force_field.cutoff_coul);
                    sim.ewald = Ewald::new(&sim.boxsize);
                    for c in comps.components.iter_mut() {
                        c.set_ewald_correction(sim.boxsize.alpha);
                    }
                    info!(
                        "box {system}: Ewald enabled by charge edit (alpha {:.5}, {} k-vectors)",
                        sim.boxsize.alpha,
                        sim.ewald.kvectors.len()
                    );
                }
                comps.host_system[component].charges_mut()[index] = value;
                sim.d_a[component].charge[index] = value;
            }
            ArrayField::Epsilon | ArrayField::Sigma | ArrayField::Shift => {
                let ff = &mut self.force_field;
                let n2 = ff.size * ff.size;
                if index >= n2 {
                    return Err(Error::invalid_index("force field entry", index, n2));
                }
                let (i, j) = (index / ff.size, index % ff.size);
                for idx in [ff.index(i, j), ff.index(j, i)] {
                    match field {
                        ArrayField::Epsilon => {
                            ff.epsilon[idx] = value;
                            ff.ff_type[idx] = if value > 0.0 {
                                PotentialKind::LennardJones as i32
                            } else {
                                PotentialKind::None as i32
                            };
                        }
                        ArrayField::Sigma => ff.sigma[idx] = value,
                        _ => ff.shift[idx] = value,
                    }
                }
                let use_tail = ff.tail[ff.index(i, j)].use_tail;
                if use_tail && field != ArrayField::Shift {
                    ff.set_tail(i, j, true)?;
                }
            }
        }

        for b in affected {
            self.initialize_box_energy(b)?;
        }
        Ok(())
    }
}
