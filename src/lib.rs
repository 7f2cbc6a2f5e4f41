/*

=========================================================
 Monte Carlo Adsorption Engine (Rust)
=========================================================

Box model
---------
- A box holds components. Frameworks come first and form the host, adsorbates
  are the guests.
- Every component has a host-side Atoms store and a device-side mirror. The
  device copy is authoritative during moves; host copies are refreshed on demand.

Energy
------
- Lennard-Jones with per-pair shift and analytic tail corrections.
- Electrostatics by Ewald summation: erfc-screened real space plus a
  reciprocal-space sum over half-space k vectors.
- Every total is split into host-host / host-guest / guest-guest parts.

Moves
-----
- Translation, rotation, single insertion and single deletion.
- Each trial runs Prepare -> Calculation -> Acceptance, in that order.
- All randomness comes from one pre-generated pool so runs are reproducible.

Modes
-----
- CREATE_MOLECULE, INITIALIZATION, EQUILIBRATION, PRODUCTION.

=========================================================
*/

pub mod accessors;
pub mod atoms;
pub mod components;
pub mod config;
pub mod constants;
pub mod device;
pub mod driver;
pub mod energy;
pub mod error;
pub mod ewald;
pub mod force_field;
pub mod interactions;
pub mod lj_parameters;
pub mod moves;
pub mod pbc;
pub mod pseudo_atoms;
pub mod random_number;
pub mod simulation;
pub mod variables;

pub use accessors::{ArrayField, IntArrayField};
pub use atoms::{AtomRecord, Atoms, AtomsSnapshot, SyncOutcome};
pub use components::{Component, Components, MoveProbabilities};
pub use config::SimulationInput;
pub use driver::{run, run_simulation_for_one_box, single_move, RunSummary};
pub use energy::{EnergyCategory, MoveEnergy};
pub use error::{Error, Result};
pub use force_field::{ForceField, InputContainer};
pub use moves::{AcceptanceOutcome, MoveType};
pub use pbc::Boxsize;
pub use pseudo_atoms::PseudoAtomDefinitions;
pub use random_number::RandomNumber;
pub use variables::{CycleCounts, EnergyCheck, EnergyCorrection, SimulationMode, Variables};
