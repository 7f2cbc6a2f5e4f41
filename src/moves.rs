/*
Single-body Monte Carlo moves.

Every trial goes through three calls on `Variables`, strictly in order:

    single_body_prepare      Idle      -> Proposed   (draw randoms, build trial atoms)
    single_body_calculation  Proposed  -> Evaluated  (energy difference new - old)
    single_body_acceptance   Evaluated -> Idle       (commit or discard)

The committed stores are not touched before Acceptance accepts. Each box holds at
most one trial; a call that does not match the box's state is a sequencing
violation and leaves the state as it was.
 */

mod acceptance;
mod calculation;
mod prepare;

pub use acceptance::AcceptanceOutcome;

use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::atoms::AtomRecord;
use crate::energy::MoveEnergy;
use crate::pbc::Boxsize;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MoveType {
    Translation,
    Rotation,
    SingleInsertion,
    SingleDeletion,
}

impl MoveType {
    pub const ALL: [MoveType; 4] = [
        MoveType::Translation,
        MoveType::Rotation,
        MoveType::SingleInsertion,
        MoveType::SingleDeletion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MoveType::Translation => "Translation",
            MoveType::Rotation => "Rotation",
            MoveType::SingleInsertion => "SingleInsertion",
            MoveType::SingleDeletion => "SingleDeletion",
        }
    }

    /// Moves that change the number of molecules.
    pub fn is_swap(self) -> bool {
        matches!(self, MoveType::SingleInsertion | MoveType::SingleDeletion)
    }
}

impl fmt::Display for MoveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A proposed configuration, not yet evaluated.
#[derive(Clone, Debug)]
pub(crate) struct Trial {
    pub component: usize,
    pub molecule: usize,
    pub move_type: MoveType,
    /// committed atoms of the molecule; empty for an insertion
    pub old: Vec<AtomRecord>,
    /// trial configurations: one for translation and rotation, the Rosenbluth
    /// candidates for an insertion, the extra reference trials for a deletion
    pub candidates: Vec<Vec<AtomRecord>>,
}

impl Trial {
    pub fn matches(&self, component: usize, molecule: usize, move_type: MoveType) -> bool {
        self.component == component && self.molecule == molecule && self.move_type == move_type
    }

    pub fn describe(&self) -> String {
        format!(
            "{} of molecule {} in component {}",
            self.move_type, self.molecule, self.component
        )
    }
}

/// Result of Calculation, consumed by Acceptance.
#[derive(Clone, Debug)]
pub(crate) struct Evaluation {
    pub energy: MoveEnergy,
    pub overlap: bool,
    /// configuration to commit; empty for a deletion
    pub selected: Vec<AtomRecord>,
    /// W / k for an insertion, k / W for a deletion, 1 otherwise
    pub rosenbluth: f64,
    /// bias energy of the selected (insertion) or current (deletion) configuration
    pub bias: f64,
}

#[derive(Clone, Debug, Default)]
pub(crate) enum TrialState {
    #[default]
    Idle,
    Proposed(Trial),
    Evaluated(Trial, Evaluation),
}

impl TrialState {
    pub fn describe(&self) -> String {
        match self {
            TrialState::Idle => "no trial in flight".to_string(),
            TrialState::Proposed(t) => format!("proposed {}", t.describe()),
            TrialState::Evaluated(t, _) => format!("evaluated {}", t.describe()),
        }
    }
}

/// Uniform random orientation from three uniforms (Shoemake).
pub fn random_orientation(u: [f64; 3]) -> UnitQuaternion<f64> {
    let a = (1.0 - u[0]).sqrt();
    let b = u[0].sqrt();
    let (t1, t2) = (2.0 * PI * u[1], 2.0 * PI * u[2]);
    UnitQuaternion::from_quaternion(Quaternion::new(
        b * t2.cos(),
        a * t1.sin(),
        a * t1.cos(),
        b * t2.sin(),
    ))
}

/// Template molecule placed at a fractional position with an orientation, six uniforms.
pub fn random_configuration(template: &[AtomRecord], boxsize: &Boxsize, r: &[f64], mol_id: usize) -> Vec<AtomRecord> {
    let center = boxsize.fractional_to_cartesian(Vector3::new(r[0], r[1], r[2]));
    let q = random_orientation([r[3], r[4], r[5]]);
    template
        .iter()
        .map(|a| AtomRecord {
            pos: center + q * a.pos,
            mol_id,
            ..*a
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_orientation_is_unit() {
        for u in [[0.0, 0.0, 0.0], [0.3, 0.7, 0.1], [0.999, 0.5, 0.25]] {
            let q = random_orientation(u);
            assert_relative_eq!(q.into_inner().norm(), 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_configuration_keeps_bond_lengths() {
        let template = vec![
            AtomRecord::new(Vector3::new(-0.6, 0.0, 0.0), 0.0, 0, 0),
            AtomRecord::new(Vector3::new(0.6, 0.0, 0.0), 0.0, 0, 0),
        ];
        let b = Boxsize::cuboid(10.0, 10.0, 10.0).unwrap();
        let placed = random_configuration(&template, &b, &[0.5, 0.25, 0.75, 0.2, 0.4, 0.9], 7);
        assert_relative_eq!((placed[0].pos - placed[1].pos).norm(), 1.2, epsilon = 1e-12);
        let center = (placed[0].pos + placed[1].pos) / 2.0;
        assert_relative_eq!(center, Vector3::new(5.0, 2.5, 7.5), epsilon = 1e-12);
        assert!(placed.iter().all(|a| a.mol_id == 7));
    }

    #[test]
    fn test_swap_classification() {
        assert!(MoveType::SingleInsertion.is_swap());
        assert!(!MoveType::Rotation.is_swap());
        assert_eq!(MoveType::Translation.to_string(), "Translation");
    }
}
