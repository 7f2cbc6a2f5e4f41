/*
Per-box device state: geometry, the device copy of every component store, the
kernel launch configuration, the Ewald structure factors, the running energy
total and the in-flight trial (if any).

Boxes share nothing mutable; the force field and pseudo atoms live on
`Variables` and are only read from here.
 */

use log::info;

use crate::components::Components;
use crate::device::{DeviceAtoms, LaunchConfig};
use crate::energy::MoveEnergy;
use crate::error::Result;
use crate::ewald::Ewald;
use crate::moves::TrialState;
use crate::pbc::Boxsize;

#[derive(Clone, Debug)]
pub struct Simulations {
    pub boxsize: Boxsize,
    pub d_a: Vec<DeviceAtoms>,
    pub launch: LaunchConfig,
    pub ewald: Ewald,
    /// running total, updated by every accepted move
    pub energy: MoveEnergy,
    pub initial_energy: MoveEnergy,
    pub cycle: usize,
    pub(crate) trial: TrialState,
}

impl Simulations {
    pub fn new(boxsize: Boxsize, nblocks: usize) -> Self {
        Simulations {
            boxsize,
            d_a: Vec::new(),
            launch: LaunchConfig::new(nblocks),
            ewald: Ewald::disabled(),
            energy: MoveEnergy::default(),
            initial_energy: MoveEnergy::default(),
            cycle: 0,
            trial: TrialState::Idle,
        }
    }

    pub fn nblocks(&self) -> usize {
        self.launch.nblocks
    }

    /// Copy every host store to the device. Replaces whatever the device held.
    pub fn upload(&mut self, comps: &Components, box_index: usize) -> Result<()> {
        self.d_a = comps
            .host_system
            .iter()
            .map(DeviceAtoms::from_host)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|f| f.into_error("upload", box_index, "setup", self.cycle))?;
        info!(
            "box {box_index}: uploaded {} component stores ({} atoms)",
            self.d_a.len(),
            self.d_a.iter().map(|d| d.size()).sum::<usize>()
        );
        Ok(())
    }

    pub fn has_pending_trial(&self) -> bool {
        !matches!(self.trial, TrialState::Idle)
    }
}
