/*
Lennard-Jones pair kernels used by the force-field evaluation.

All energies are in Kelvin. `r2` is the squared minimum-image distance; callers
apply the cutoff before calling in.
 */

use std::f64::consts::PI;

// -- lennard jones potential
pub fn lennard_jones_potential(r: f64, sigma: f64, eps: f64) -> f64 {
    if r < 1e-9 {
        return 0.0;
    } // Avoid singularity
    let sr6 = (sigma / r).powi(6);
    4.0 * eps * (sr6 * sr6 - sr6)
}

/// 12-6 pair energy with the cut-and-shift offset and the fractional-molecule
/// scaling used by CFCMC style moves.
///
/// `scaling` = 1 is the plain potential. Below 1 the soft-core form
/// 4 eps l [1/(a + (r/s)^6)^2 - 1/(a + (r/s)^6)], a = (1-l)^2 / 2, is used so
/// that a partially inserted molecule never sees the r^-12 wall.
pub fn vdw_pair_energy(r2: f64, epsilon: f64, sigma: f64, shift: f64, scaling: f64) -> f64 {
    if epsilon == 0.0 || scaling <= 0.0 {
        return 0.0;
    }
    if scaling >= 1.0 {
        let s2 = sigma * sigma / r2;
        let s6 = s2 * s2 * s2;
        4.0 * epsilon * (s6 * s6 - s6) - shift
    } else {
        if sigma == 0.0 {
            return 0.0;
        }
        let rs2 = r2 / (sigma * sigma);
        let arg = 0.5 * (1.0 - scaling).powi(2) + rs2 * rs2 * rs2;
        4.0 * epsilon * scaling * (1.0 / (arg * arg) - 1.0 / arg) - scaling * shift
    }
}

/// Long-range correction integral 4 pi int_rc^inf r^2 u(r) dr for one type pair.
///
/// The box tail energy is 1/2 sum_ij N_i N_j / V times this value.
pub fn lennard_jones_tail(epsilon: f64, sigma: f64, cutoff: f64) -> f64 {
    if epsilon == 0.0 || sigma == 0.0 {
        return 0.0;
    }
    let sr3 = (sigma / cutoff).powi(3);
    (16.0 / 3.0) * PI * epsilon * sigma.powi(3) * (sr3 * sr3 * sr3 / 3.0 - sr3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_minimum_at_two_to_the_sixth() {
        let rmin = 2f64.powf(1.0 / 6.0);
        assert_relative_eq!(lennard_jones_potential(rmin, 1.0, 1.0), -1.0, epsilon = 1e-12);
        assert_eq!(lennard_jones_potential(0.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn test_full_scaling_matches_plain_lj() {
        let r: f64 = 1.3;
        let plain = lennard_jones_potential(r, 1.1, 0.7);
        assert_relative_eq!(vdw_pair_energy(r * r, 0.7, 1.1, 0.0, 1.0), plain, epsilon = 1e-12);
    }

    #[test]
    fn test_shift_subtracted() {
        let rc: f64 = 2.5;
        let shift = lennard_jones_potential(rc, 1.0, 1.0);
        assert_relative_eq!(vdw_pair_energy(rc * rc, 1.0, 1.0, shift, 1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_soft_core_is_finite_at_contact() {
        let e = vdw_pair_energy(1e-8, 1.0, 1.0, 0.0, 0.5);
        assert!(e.is_finite());
        assert_eq!(vdw_pair_energy(1.0, 1.0, 1.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_zero_epsilon_is_zero() {
        assert_eq!(vdw_pair_energy(0.25, 0.0, 3.0, 0.0, 1.0), 0.0);
    }

    #[test]
    fn test_tail_is_attractive_beyond_cutoff() {
        assert!(lennard_jones_tail(100.0, 3.4, 12.0) < 0.0);
        assert_eq!(lennard_jones_tail(0.0, 3.4, 12.0), 0.0);
    }
}
