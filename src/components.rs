/*
Per-box component state.

A box holds one Atoms store per molecular species. Framework components come
first and are the "host" side of every energy split; adsorbates follow and are
the "guests". `ComponentCounts` is the (total, framework, adsorbate) triple and
bounds every per-component loop, including the host resynchronization.
 */

use log::{debug, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::atoms::{AtomRecord, Atoms, SyncOutcome};
use crate::device::DeviceAtoms;
use crate::error::{Error, Result};
use crate::ewald::{exclusion_energy, self_energy, ChargeSite};
use crate::moves::MoveType;
use crate::pseudo_atoms::PseudoAtomDefinitions;

/// Number of components: x = total, y = framework, z = adsorbate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentCounts {
    pub total: usize,
    pub framework: usize,
    pub adsorbate: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoveProbabilities {
    pub translation: f64,
    pub rotation: f64,
    pub insertion: f64,
    pub deletion: f64,
}

impl Default for MoveProbabilities {
    fn default() -> Self {
        MoveProbabilities {
            translation: 1.0,
            rotation: 0.0,
            insertion: 0.0,
            deletion: 0.0,
        }
    }
}

impl MoveProbabilities {
    /// Pick a move from one uniform number using the cumulative, normalized weights.
    pub fn select(&self, u: f64) -> Option<MoveType> {
        let weights = [
            (MoveType::Translation, self.translation),
            (MoveType::Rotation, self.rotation),
            (MoveType::SingleInsertion, self.insertion),
            (MoveType::SingleDeletion, self.deletion),
        ];
        let total: f64 = weights.iter().map(|(_, w)| w.max(0.0)).sum();
        if total <= 0.0 {
            return None;
        }
        let mut acc = 0.0;
        for (mv, w) in weights {
            acc += w.max(0.0) / total;
            if u < acc && w > 0.0 {
                return Some(mv);
            }
        }
        weights.iter().rev().find(|(_, w)| *w > 0.0).map(|(mv, _)| *mv)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveCounter {
    pub attempted: usize,
    pub accepted: usize,
    /// attempts and acceptances since the last step-size adjustment
    pub window_attempted: usize,
    pub window_accepted: usize,
}

impl MoveCounter {
    pub fn record(&mut self, accepted: bool) {
        self.attempted += 1;
        self.window_attempted += 1;
        if accepted {
            self.accepted += 1;
            self.window_accepted += 1;
        }
    }

    pub fn acceptance(&self) -> f64 {
        if self.attempted == 0 {
            0.0
        } else {
            self.accepted as f64 / self.attempted as f64
        }
    }

    /// Acceptance ratio of the current window, then start a new window.
    pub fn take_window(&mut self) -> Option<f64> {
        let ratio = (self.window_attempted > 0)
            .then(|| self.window_accepted as f64 / self.window_attempted as f64);
        self.window_attempted = 0;
        self.window_accepted = 0;
        ratio
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveStatistics {
    pub translation: MoveCounter,
    pub rotation: MoveCounter,
    pub insertion: MoveCounter,
    pub deletion: MoveCounter,
}

impl MoveStatistics {
    pub fn counter_mut(&mut self, move_type: MoveType) -> &mut MoveCounter {
        match move_type {
            MoveType::Translation => &mut self.translation,
            MoveType::Rotation => &mut self.rotation,
            MoveType::SingleInsertion => &mut self.insertion,
            MoveType::SingleDeletion => &mut self.deletion,
        }
    }

    pub fn counter(&self, move_type: MoveType) -> &MoveCounter {
        match move_type {
            MoveType::Translation => &self.translation,
            MoveType::Rotation => &self.rotation,
            MoveType::SingleInsertion => &self.insertion,
            MoveType::SingleDeletion => &self.deletion,
        }
    }

    pub fn total_accepted(&self) -> usize {
        MoveType::ALL.iter().map(|&m| self.counter(m).accepted).sum()
    }
}

/// Static description of one molecular species plus its tunable move settings.
#[derive(Clone, Debug)]
pub struct Component {
    pub name: String,
    pub is_framework: bool,
    /// atoms of one molecule, positions relative to the center of mass
    pub template: Vec<AtomRecord>,
    pub mass: f64,
    pub fugacity_coefficient: f64,
    pub mol_fraction: f64,
    pub probabilities: MoveProbabilities,
    pub max_translation: f64,
    pub max_rotation: f64,
    pub create_molecules: usize,
    pub trial_positions: usize,
    /// Ewald self + intramolecular exclusion energy of one molecule
    pub ewald_correction: f64,
    pub stats: MoveStatistics,
}

impl Component {
    /// Build from template atoms (any origin); the template is re-centered on its
    /// center of mass using the pseudo-atom masses.
    pub fn new(name: &str, is_framework: bool, atoms: &[AtomRecord], pseudo: &PseudoAtomDefinitions) -> Result<Self> {
        if atoms.is_empty() {
            return Err(Error::InvalidParameter(format!("component '{name}' has no atoms")));
        }
        let masses = atoms
            .iter()
            .map(|a| pseudo.mass_of(a.atom_type))
            .collect::<Result<Vec<f64>>>()?;
        let mass: f64 = masses.iter().sum();
        let template = if is_framework {
            atoms.to_vec()
        } else {
            let com = center_of_mass(atoms, &masses);
            atoms
                .iter()
                .map(|a| AtomRecord {
                    pos: a.pos - com,
                    mol_id: 0,
                    ..*a
                })
                .collect()
        };
        Ok(Component {
            name: name.to_string(),
            is_framework,
            template,
            mass,
            fugacity_coefficient: 1.0,
            mol_fraction: 1.0,
            probabilities: MoveProbabilities::default(),
            max_translation: 1.0,
            max_rotation: 0.5,
            create_molecules: 0,
            trial_positions: 1,
            ewald_correction: 0.0,
            stats: MoveStatistics::default(),
        })
    }

    pub fn molsize(&self) -> usize {
        self.template.len()
    }

    /// Rigid molecules keep their self/exclusion energy constant; store it once.
    pub fn set_ewald_correction(&mut self, alpha: f64) {
        self.ewald_correction = molecule_ewald_correction(&self.template, alpha, self.is_framework);
    }

    pub fn has_charges(&self) -> bool {
        self.template.iter().any(|a| a.charge != 0.0)
    }
}

/// Ewald self energy of one molecule, plus its intramolecular exclusion term
/// unless it belongs to a framework.
pub fn molecule_ewald_correction(atoms: &[AtomRecord], alpha: f64, is_framework: bool) -> f64 {
    let sites: Vec<ChargeSite> = atoms
        .iter()
        .map(|a| ChargeSite {
            pos: a.pos,
            charge: a.effective_charge(),
        })
        .collect();
    let self_e = self_energy(sites.iter().map(|s| s.charge), alpha);
    if is_framework {
        self_e
    } else {
        self_e + exclusion_energy(&sites, alpha)
    }
}

pub fn center_of_mass(atoms: &[AtomRecord], masses: &[f64]) -> Vector3<f64> {
    let total: f64 = masses.iter().sum();
    if total <= 0.0 {
        // massless sites: geometric center
        let n = atoms.len().max(1) as f64;
        return atoms.iter().map(|a| a.pos).sum::<Vector3<f64>>() / n;
    }
    atoms
        .iter()
        .zip(masses)
        .map(|(a, m)| a.pos * *m)
        .sum::<Vector3<f64>>()
        / total
}

/// Everything one box knows about its components.
#[derive(Clone, Debug, Default)]
pub struct Components {
    pub counts: ComponentCounts,
    pub components: Vec<Component>,
    pub host_system: Vec<Atoms>,
    pub num_molecules: Vec<usize>,
    pub temperature: f64,
    pub beta: f64,
    /// Pa
    pub pressure: f64,
    /// atoms per pseudo-atom type on the framework side and on the guest side
    pub host_type_counts: Vec<usize>,
    pub guest_type_counts: Vec<usize>,
}

impl Components {
    pub fn new(temperature: f64, pressure: f64, n_types: usize) -> Result<Self> {
        if temperature <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "temperature must be positive, got {temperature}"
            )));
        }
        Ok(Components {
            temperature,
            beta: 1.0 / temperature,
            pressure,
            host_type_counts: vec![0; n_types],
            guest_type_counts: vec![0; n_types],
            ..Components::default()
        })
    }

    /// Register a component with an empty store. Frameworks must come before adsorbates.
    pub fn add_component(&mut self, component: Component, initial_capacity: usize) -> Result<usize> {
        if component.is_framework && self.counts.adsorbate > 0 {
            return Err(Error::InvalidParameter(format!(
                "framework component '{}' added after an adsorbate",
                component.name
            )));
        }
        let store = Atoms::with_capacity(initial_capacity.max(component.molsize()), component.molsize())?;
        if component.is_framework {
            self.counts.framework += 1;
        } else {
            self.counts.adsorbate += 1;
        }
        self.counts.total += 1;
        self.components.push(component);
        self.host_system.push(store);
        self.num_molecules.push(0);
        Ok(self.counts.total - 1)
    }

    pub fn is_host(&self, component: usize) -> bool {
        component < self.counts.framework
    }

    pub fn check_component(&self, component: usize) -> Result<()> {
        if component >= self.counts.total {
            return Err(Error::invalid_index("component", component, self.counts.total));
        }
        Ok(())
    }

    /// Append a molecule to the host store during setup (before the device copy exists).
    pub fn push_molecule(&mut self, component: usize, atoms: &[AtomRecord]) -> Result<usize> {
        self.check_component(component)?;
        let molsize = self.components[component].molsize();
        if atoms.len() != molsize {
            return Err(Error::InvalidMove {
                component,
                molecule: self.num_molecules[component],
                detail: format!("expected {molsize} atoms, got {}", atoms.len()),
            });
        }
        let molecule = self.num_molecules[component];
        let is_host = self.is_host(component);
        for a in atoms {
            self.host_system[component].push(AtomRecord { mol_id: molecule, ..*a })?;
            self.count_type(a.atom_type, is_host, 1)?;
        }
        self.num_molecules[component] += 1;
        Ok(molecule)
    }

    fn count_type(&mut self, atom_type: usize, is_host: bool, n: usize) -> Result<()> {
        let counts = if is_host {
            &mut self.host_type_counts
        } else {
            &mut self.guest_type_counts
        };
        let len = counts.len();
        let slot = counts
            .get_mut(atom_type)
            .ok_or_else(|| Error::invalid_index("pseudo atom type", atom_type, len))?;
        *slot += n;
        Ok(())
    }

    /// Guest type counts after adding (`sign` = 1) or removing (`sign` = -1) one
    /// molecule of `component`.
    pub fn guest_type_counts_after(&self, component: usize, sign: i64) -> Vec<usize> {
        let mut counts = self.guest_type_counts.clone();
        for a in &self.components[component].template {
            if let Some(c) = counts.get_mut(a.atom_type) {
                *c = (*c as i64 + sign).max(0) as usize;
            }
        }
        counts
    }

    /// Bookkeeping after a committed insertion or deletion.
    pub fn apply_molecule_change(&mut self, component: usize, inserted: bool) {
        self.guest_type_counts = self.guest_type_counts_after(component, if inserted { 1 } else { -1 });
        if inserted {
            self.num_molecules[component] += 1;
        } else {
            self.num_molecules[component] = self.num_molecules[component].saturating_sub(1);
        }
    }

    pub fn total_guest_molecules(&self) -> usize {
        (self.counts.framework..self.counts.total)
            .map(|c| self.num_molecules[c])
            .sum()
    }

    /// Download one component's device store into its host store (CopyAtomDataFromGPU).
    pub fn copy_atom_data_from_device(&mut self, component: usize, device: &[DeviceAtoms]) -> Result<SyncOutcome> {
        self.check_component(component)?;
        let d = device
            .get(component)
            .ok_or_else(|| Error::invalid_index("device store", component, device.len()))?;
        let header = d.header();
        let outcome = self.host_system[component].resync_from_device(header, d)?;
        debug!("component {component}: host synchronized ({outcome:?}, size {})", header.size);
        Ok(outcome)
    }

    /// Resynchronize every component, bounded by the total component count.
    pub fn copy_all_from_device(&mut self, device: &[DeviceAtoms]) -> Result<Vec<SyncOutcome>> {
        (0..self.counts.total)
            .map(|c| self.copy_atom_data_from_device(c, device))
            .collect()
    }

    /// Capacity check outside the synchronization path. A mismatch is reported
    /// and repaired by a full resync of that component.
    pub fn ensure_consistent(&mut self, box_index: usize, component: usize, device: &[DeviceAtoms]) -> Result<()> {
        self.check_component(component)?;
        let d = device
            .get(component)
            .ok_or_else(|| Error::invalid_index("device store", component, device.len()))?;
        let host = &self.host_system[component];
        if host.allocate_size() != d.allocate_size() || host.size() != d.size() {
            let e = Error::InconsistentCapacity {
                box_index,
                component,
                host: host.allocate_size(),
                device: d.allocate_size(),
            };
            warn!("{e}; resynchronizing");
            self.copy_atom_data_from_device(component, device)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> PseudoAtomDefinitions {
        let mut d = PseudoAtomDefinitions::default();
        d.push("O", "O", 16.0).unwrap();
        d.push("C", "C", 12.0).unwrap();
        d
    }

    fn co2_atoms() -> Vec<AtomRecord> {
        vec![
            AtomRecord::new(Vector3::new(3.0, 0.0, 0.0), -0.35, 0, 0),
            AtomRecord::new(Vector3::new(4.16, 0.0, 0.0), 0.7, 1, 0),
            AtomRecord::new(Vector3::new(5.32, 0.0, 0.0), -0.35, 0, 0),
        ]
    }

    #[test]
    fn test_template_centered_on_mass() {
        let c = Component::new("CO2", false, &co2_atoms(), &defs()).unwrap();
        assert_eq!(c.molsize(), 3);
        assert!((c.mass - 44.0).abs() < 1e-12);
        assert!(c.template[1].pos.norm() < 1e-12);
    }

    #[test]
    fn test_framework_after_adsorbate_rejected() {
        let d = defs();
        let mut comps = Components::new(300.0, 1e5, d.len()).unwrap();
        comps
            .add_component(Component::new("CO2", false, &co2_atoms(), &d).unwrap(), 3)
            .unwrap();
        let fw = Component::new("MOF", true, &co2_atoms(), &d).unwrap();
        assert!(comps.add_component(fw, 3).is_err());
    }

    #[test]
    fn test_counts_and_type_bookkeeping() {
        let d = defs();
        let mut comps = Components::new(300.0, 1e5, d.len()).unwrap();
        let fw = comps
            .add_component(Component::new("MOF", true, &co2_atoms(), &d).unwrap(), 3)
            .unwrap();
        let co2 = comps
            .add_component(Component::new("CO2", false, &co2_atoms(), &d).unwrap(), 3)
            .unwrap();
        assert_eq!(
            comps.counts,
            ComponentCounts {
                total: 2,
                framework: 1,
                adsorbate: 1
            }
        );
        comps.push_molecule(fw, &co2_atoms()).unwrap();
        comps.push_molecule(co2, &co2_atoms()).unwrap();
        assert!(comps.is_host(fw) && !comps.is_host(co2));
        assert_eq!(comps.host_type_counts, vec![2, 1]);
        assert_eq!(comps.guest_type_counts, vec![2, 1]);
        assert_eq!(comps.guest_type_counts_after(co2, 1), vec![4, 2]);
        comps.apply_molecule_change(co2, false);
        assert_eq!(comps.guest_type_counts, vec![0, 0]);
        assert_eq!(comps.num_molecules[co2], 0);
    }

    #[test]
    fn test_move_selection_cumulative() {
        let p = MoveProbabilities {
            translation: 1.0,
            rotation: 1.0,
            insertion: 0.0,
            deletion: 2.0,
        };
        assert_eq!(p.select(0.1), Some(MoveType::Translation));
        assert_eq!(p.select(0.3), Some(MoveType::Rotation));
        assert_eq!(p.select(0.6), Some(MoveType::SingleDeletion));
        assert_eq!(p.select(0.9999), Some(MoveType::SingleDeletion));
        let none = MoveProbabilities {
            translation: 0.0,
            ..p
        };
        assert_eq!(
            MoveProbabilities {
                rotation: 0.0,
                deletion: 0.0,
                ..none
            }
            .select(0.5),
            None
        );
    }

    #[test]
    fn test_counter_window() {
        let mut c = MoveCounter::default();
        c.record(true);
        c.record(false);
        assert_eq!(c.take_window(), Some(0.5));
        assert_eq!(c.take_window(), None);
        assert_eq!(c.attempted, 2);
        assert_eq!(c.acceptance(), 0.5);
    }

    #[test]
    fn test_copy_bounded_by_component_count() {
        let d = defs();
        let mut comps = Components::new(300.0, 1e5, d.len()).unwrap();
        let co2 = comps
            .add_component(Component::new("CO2", false, &co2_atoms(), &d).unwrap(), 3)
            .unwrap();
        comps.push_molecule(co2, &co2_atoms()).unwrap();
        let device: Vec<DeviceAtoms> = comps
            .host_system
            .iter()
            .map(|h| DeviceAtoms::from_host(h).unwrap())
            .collect();
        let outcomes = comps.copy_all_from_device(&device).unwrap();
        assert_eq!(outcomes, vec![SyncOutcome::InPlace]);
        assert!(comps.copy_atom_data_from_device(1, &device).is_err());
    }
}
