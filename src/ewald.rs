/*
Ewald summation for the Coulomb interaction.

    E_coul = E_real + E_recip + E_self + E_excl

E_real is a pair sum and lives with the VDW kernel (`real_coulomb_pair`). The
reciprocal part is carried here as two structure factors per k-vector, one for
the host (framework) charges and one for the guest charges:

    S_h(k) = sum_host  q_i exp(i k.r_i)
    S_g(k) = sum_guest q_i exp(i k.r_i)

so that with w(k) = (4 pi C / V) exp(-k^2 / 4 alpha^2) / k^2 over the half space

    HH = sum w |S_h|^2
    HG = sum 2 w Re(S_h conj(S_g))
    GG = sum w |S_g|^2

A trial move only touches S_g. The trial factors are kept until the move is
accepted (swapped in) or rejected (dropped).

Self term:      -C alpha / sqrt(pi) sum q_i^2
Exclusion term: -C sum_{i<j in a molecule} q_i q_j erf(alpha r_ij) / r_ij
 */

use itertools::iproduct;
use log::debug;
use nalgebra::Vector3;
use num_complex::Complex64;
use std::f64::consts::PI;

use crate::constants::COULOMB_CONVERSION;
use crate::device::{DeviceFault, LaunchConfig};
use crate::pbc::Boxsize;

/// Complementary error function (Numerical Recipes `erfcc`, fractional error < 1.2e-7).
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * (-z * z + poly).exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

pub fn erf(x: f64) -> f64 {
    1.0 - erfc(x)
}

/// Damped real-space Coulomb energy of one pair, in K. `qi`, `qj` already carry
/// their fractional scaling. Zero at and beyond the Coulomb cutoff.
#[inline]
pub fn real_coulomb_pair(r2: f64, qi: f64, qj: f64, alpha: f64, cutoff_coul: f64) -> f64 {
    if r2 >= cutoff_coul * cutoff_coul || qi == 0.0 || qj == 0.0 {
        return 0.0;
    }
    let r = r2.sqrt();
    COULOMB_CONVERSION * qi * qj * erfc(alpha * r) / r
}

/// Point charge as seen by the reciprocal sum.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ChargeSite {
    pub pos: Vector3<f64>,
    pub charge: f64,
}

#[derive(Clone, Copy, Debug)]
pub struct KVector {
    pub k: Vector3<f64>,
    pub weight: f64,
}

pub fn self_energy(charges: impl IntoIterator<Item = f64>, alpha: f64) -> f64 {
    let q2: f64 = charges.into_iter().map(|q| q * q).sum();
    -COULOMB_CONVERSION * alpha / PI.sqrt() * q2
}

/// Intramolecular pairs that the reciprocal sum includes but a rigid molecule
/// must not see. Positions are taken as given (molecules are never split by PBC).
pub fn exclusion_energy(sites: &[ChargeSite], alpha: f64) -> f64 {
    let mut e = 0.0;
    for i in 0..sites.len() {
        for j in (i + 1)..sites.len() {
            let r = (sites[i].pos - sites[j].pos).norm();
            if r > 0.0 {
                e -= COULOMB_CONVERSION * sites[i].charge * sites[j].charge * erf(alpha * r) / r;
            }
        }
    }
    e
}

/// Energy split of the reciprocal sum.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ReciprocalEnergy {
    pub host_host: f64,
    pub host_guest: f64,
    pub guest_guest: f64,
}

#[derive(Clone, Debug, Default)]
pub struct Ewald {
    pub alpha: f64,
    pub kvectors: Vec<KVector>,
    host_eik: Vec<Complex64>,
    guest_eik: Vec<Complex64>,
    trial_eik: Option<Vec<Complex64>>,
}

impl Ewald {
    /// Reciprocal sum switched off (no charges in the system).
    pub fn disabled() -> Self {
        Ewald::default()
    }

    /// k-vectors of the half space n_x > 0, or n_x = 0 and n_y > 0, or
    /// n_x = n_y = 0 and n_z > 0, within the box's `kmax`.
    pub fn new(boxsize: &Boxsize) -> Self {
        let [kx, ky, kz] = boxsize.kmax.map(|k| k as i32);
        let alpha = boxsize.alpha;
        let prefactor = 4.0 * PI * COULOMB_CONVERSION / boxsize.volume;
        let kvectors: Vec<KVector> = iproduct!(0..=kx, -ky..=ky, -kz..=kz)
            .filter(|&(nx, ny, nz)| nx > 0 || (nx == 0 && (ny > 0 || (ny == 0 && nz > 0))))
            .map(|(nx, ny, nz)| {
                let k = boxsize.reciprocal([nx, ny, nz]);
                let k2 = k.norm_squared();
                KVector {
                    k,
                    weight: prefactor * (-k2 / (4.0 * alpha * alpha)).exp() / k2,
                }
            })
            .collect();
        debug!("ewald: alpha {:.5}, kmax {:?}, {} k-vectors", alpha, boxsize.kmax, kvectors.len());
        let n = kvectors.len();
        Ewald {
            alpha,
            kvectors,
            host_eik: vec![Complex64::new(0.0, 0.0); n],
            guest_eik: vec![Complex64::new(0.0, 0.0); n],
            trial_eik: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.kvectors.is_empty()
    }

    /// sum_i q_i exp(i k.r_i) for every k-vector, one thread per k.
    pub fn structure_factor(&self, sites: &[ChargeSite], launch: &LaunchConfig) -> Result<Vec<Complex64>, DeviceFault> {
        launch.launch_map(self.kvectors.len(), |ik| {
            let k = self.kvectors[ik].k;
            sites
                .iter()
                .filter(|s| s.charge != 0.0)
                .map(|s| Complex64::from_polar(s.charge, k.dot(&s.pos)))
                .sum()
        })
    }

    /// Rebuild both structure factors from scratch.
    pub fn recompute(&mut self, host: &[ChargeSite], guest: &[ChargeSite], launch: &LaunchConfig) -> Result<(), DeviceFault> {
        self.host_eik = self.structure_factor(host, launch)?;
        self.guest_eik = self.structure_factor(guest, launch)?;
        self.trial_eik = None;
        Ok(())
    }

    pub fn energy(&self) -> ReciprocalEnergy {
        let mut e = ReciprocalEnergy::default();
        for ((kv, sh), sg) in self.kvectors.iter().zip(&self.host_eik).zip(&self.guest_eik) {
            e.host_host += kv.weight * sh.norm_sqr();
            e.host_guest += 2.0 * kv.weight * (sh * sg.conj()).re;
            e.guest_guest += kv.weight * sg.norm_sqr();
        }
        e
    }

    /// Change of the reciprocal energy when the guest sites `old` are replaced
    /// by `new`. The trial structure factor is kept until `accept`/`reject`.
    /// The host-host part of the result is always zero.
    pub fn trial(&mut self, old: &[ChargeSite], new: &[ChargeSite], launch: &LaunchConfig) -> Result<ReciprocalEnergy, DeviceFault> {
        if !self.is_enabled() {
            return Ok(ReciprocalEnergy::default());
        }
        let removed = self.structure_factor(old, launch)?;
        let added = self.structure_factor(new, launch)?;
        let mut delta = ReciprocalEnergy::default();
        let mut trial = Vec::with_capacity(self.kvectors.len());
        for (ik, kv) in self.kvectors.iter().enumerate() {
            let sh = self.host_eik[ik];
            let sg = self.guest_eik[ik];
            let sg_new = sg - removed[ik] + added[ik];
            delta.host_guest += 2.0 * kv.weight * (sh * (sg_new - sg).conj()).re;
            delta.guest_guest += kv.weight * (sg_new.norm_sqr() - sg.norm_sqr());
            trial.push(sg_new);
        }
        self.trial_eik = Some(trial);
        Ok(delta)
    }

    pub fn has_trial(&self) -> bool {
        self.trial_eik.is_some()
    }

    pub fn accept(&mut self) {
        if let Some(trial) = self.trial_eik.take() {
            self.guest_eik = trial;
        }
    }

    pub fn reject(&mut self) {
        self.trial_eik = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ewald_box() -> (Boxsize, Ewald) {
        let mut b = Boxsize::cuboid(20.0, 20.0, 20.0).unwrap();
        b.set_ewald_parameters(1e-6, 9.0);
        let e = Ewald::new(&b);
        (b, e)
    }

    fn site(x: f64, y: f64, z: f64, charge: f64) -> ChargeSite {
        ChargeSite {
            pos: Vector3::new(x, y, z),
            charge,
        }
    }

    #[test]
    fn test_erfc_reference_values() {
        assert_relative_eq!(erfc(0.0), 1.0, epsilon = 1e-7);
        assert_relative_eq!(erfc(0.5), 0.479_500_122_186_953_5, epsilon = 1e-7);
        assert_relative_eq!(erfc(1.0), 0.157_299_207_050_285_1, epsilon = 1e-7);
        assert_relative_eq!(erfc(-1.0), 2.0 - 0.157_299_207_050_285_1, epsilon = 1e-7);
        // deep tail, where the absolute bound says nothing
        assert_relative_eq!(erfc(2.0), 0.004_677_734_981_047_266, max_relative = 2e-7);
        assert_relative_eq!(erf(2.0), 0.995_322_265_018_952_7, epsilon = 1e-7);
    }

    #[test]
    fn test_real_pair_cutoff() {
        assert_eq!(real_coulomb_pair(144.0, 1.0, -1.0, 0.3, 12.0), 0.0);
        assert!(real_coulomb_pair(4.0, 1.0, -1.0, 0.3, 12.0) < 0.0);
        // undamped limit is the bare Coulomb energy
        assert_relative_eq!(
            real_coulomb_pair(4.0, 1.0, 1.0, 0.0, 12.0),
            COULOMB_CONVERSION / 2.0,
            max_relative = 1e-6
        );
    }

    #[test]
    fn test_half_space_has_no_mirror_pairs() {
        let (_, e) = ewald_box();
        assert!(e.is_enabled());
        for (a, kv) in e.kvectors.iter().enumerate() {
            for kw in &e.kvectors[a + 1..] {
                assert!((kv.k + kw.k).norm() > 1e-9);
            }
        }
        assert!(e.kvectors.iter().all(|kv| kv.weight > 0.0));
    }

    #[test]
    fn test_trial_matches_recompute() {
        let (_, mut e) = ewald_box();
        let launch = LaunchConfig::new(4);
        let host = vec![site(1.0, 1.0, 1.0, 0.5), site(5.0, 5.0, 5.0, -0.5)];
        let old = vec![site(10.0, 10.0, 10.0, 0.4), site(11.0, 10.0, 10.0, -0.4)];
        let new = vec![site(12.0, 3.0, 7.0, 0.4), site(13.0, 3.0, 7.0, -0.4)];

        e.recompute(&host, &old, &launch).unwrap();
        let before = e.energy();
        let delta = e.trial(&old, &new, &launch).unwrap();
        e.accept();
        let after = e.energy();

        let mut fresh = e.clone();
        fresh.recompute(&host, &new, &launch).unwrap();
        let expected = fresh.energy();

        assert_relative_eq!(after.host_guest, expected.host_guest, epsilon = 1e-8);
        assert_relative_eq!(after.guest_guest, expected.guest_guest, epsilon = 1e-8);
        assert_relative_eq!(before.host_guest + delta.host_guest, expected.host_guest, epsilon = 1e-8);
        assert_relative_eq!(before.guest_guest + delta.guest_guest, expected.guest_guest, epsilon = 1e-8);
        assert_eq!(after.host_host, before.host_host);
    }

    #[test]
    fn test_reject_drops_trial() {
        let (_, mut e) = ewald_box();
        let launch = LaunchConfig::new(2);
        let guest = vec![site(3.0, 3.0, 3.0, 1.0)];
        e.recompute(&[], &guest, &launch).unwrap();
        let before = e.energy();
        e.trial(&guest, &[site(8.0, 2.0, 1.0, 1.0)], &launch).unwrap();
        assert!(e.has_trial());
        e.reject();
        assert!(!e.has_trial());
        assert_eq!(e.energy(), before);
    }

    #[test]
    fn test_self_and_exclusion_signs() {
        assert!(self_energy([1.0, -1.0], 0.3) < 0.0);
        let pair = [site(0.0, 0.0, 0.0, 0.4), site(1.0, 0.0, 0.0, -0.4)];
        // opposite charges: the excluded pair energy is attractive, so the correction is positive
        assert!(exclusion_energy(&pair, 0.3) > 0.0);
    }

    #[test]
    fn test_disabled_trial_is_zero() {
        let mut e = Ewald::disabled();
        let d = e
            .trial(&[], &[site(0.0, 0.0, 0.0, 1.0)], &LaunchConfig::new(1))
            .unwrap();
        assert_eq!(d, ReciprocalEnergy::default());
        assert!(!e.has_trial());
    }
}
