/*
Physical constants and engine defaults.

Energies are carried in Kelvin (E / k_B), lengths in Angstrom, charges in
units of the elementary charge.
 */

/// e^2 / (4 pi eps0 * 1 Angstrom * k_B), in K * Angstrom / e^2
pub const COULOMB_CONVERSION: f64 = 167_101.002_360_149_6;
pub const BOLTZMANN_K: f64 = 1.380_649e-23; // J/K
pub const ANGSTROM3_TO_M3: f64 = 1.0e-30;

pub const DEFAULT_RANDOM_SIZE: usize = 1_000_000;
pub const DEFAULT_NBLOCKS: usize = 8;
pub const DEFAULT_OVERLAP_CRITERIA: f64 = 1.0e5; // K
pub const DEFAULT_CUTOFF: f64 = 12.0; // Angstrom
pub const DEFAULT_EWALD_PRECISION: f64 = 1.0e-6;

pub const MIN_STEPS_PER_CYCLE: usize = 20;
pub const TARGET_ACCEPTANCE: f64 = 0.5;
pub const MAX_TRANSLATION_CAP: f64 = 5.0; // Angstrom
pub const MAX_ROTATION_CAP: f64 = std::f64::consts::PI;
