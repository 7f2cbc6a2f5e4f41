/*
Energy kernels.

`molecule_energy` is the device kernel behind every trial: the atoms of one
molecule against every atom stored in the box, block-partitioned over each
store and folded in block order. `system_energy` is the host-side reference
used to initialize the running total and to check it for drift.

Pairs are split by side: host-host pairs (framework against framework) are never
evaluated in real space, the framework being rigid.
 */

use log::trace;
use nalgebra::Vector3;

use crate::atoms::AtomRecord;
use crate::components::{molecule_ewald_correction, Components};
use crate::device::{DeviceAtoms, DeviceFault, LaunchConfig};
use crate::energy::{MoveEnergy, Pairing};
use crate::error::Result;
use crate::ewald::{real_coulomb_pair, ChargeSite, Ewald};
use crate::force_field::ForceField;
use crate::lj_parameters::vdw_pair_energy;
use crate::pbc::Boxsize;

/// Read-only inputs shared by every kernel of one box.
#[derive(Clone, Copy)]
pub struct InteractionContext<'a> {
    pub ff: &'a ForceField,
    pub boxsize: &'a Boxsize,
    pub launch: &'a LaunchConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PairSum {
    pub vdw: f64,
    pub real: f64,
    pub overlap: bool,
}

impl PairSum {
    fn fold(mut self, other: PairSum) -> PairSum {
        self.vdw += other.vdw;
        self.real += other.real;
        self.overlap |= other.overlap;
        self
    }
}

/// Interaction of one molecule with the rest of the box, split by the side of the partner.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoleculeEnergy {
    pub host: PairSum,
    pub guest: PairSum,
}

impl MoleculeEnergy {
    pub fn overlap(&self) -> bool {
        self.host.overlap || self.guest.overlap
    }

    /// Side on which the overlap was found (host side first).
    pub fn overlap_pairing(&self) -> Pairing {
        if self.host.overlap {
            Pairing::HostGuest
        } else {
            Pairing::GuestGuest
        }
    }

    /// Energy used for Rosenbluth weights: VDW, plus real-space Coulomb if the
    /// force field asks for it.
    pub fn bias(&self, vdw_real_bias: bool) -> f64 {
        let vdw = self.host.vdw + self.guest.vdw;
        if vdw_real_bias {
            vdw + self.host.real + self.guest.real
        } else {
            vdw
        }
    }

    /// Categories for a guest molecule.
    pub fn to_move_energy(self) -> MoveEnergy {
        MoveEnergy {
            hg_vdw: self.host.vdw,
            hg_real: self.host.real,
            gg_vdw: self.guest.vdw,
            gg_real: self.guest.real,
            ..MoveEnergy::default()
        }
    }
}

impl InteractionContext<'_> {
    /// VDW and real-space Coulomb of one pair. `dr` is the raw separation.
    #[inline]
    fn pair(&self, a: &AtomRecord, dr: Vector3<f64>, type_j: usize, scale_j: f64, q_j: f64) -> PairSum {
        let r2 = self.boxsize.minimum_image(dr).norm_squared();
        let mut out = PairSum::default();
        let rc2 = self.ff.cutoff_vdw * self.ff.cutoff_vdw;
        if r2 < rc2 {
            let p = self.ff.lookup(a.atom_type, type_j);
            let e = vdw_pair_energy(r2, p.epsilon, p.sigma, p.shift, a.scale * scale_j);
            if e > self.ff.overlap_criteria {
                out.overlap = true;
            }
            out.vdw = e;
        }
        if !self.ff.no_charges {
            out.real = real_coulomb_pair(
                r2,
                a.effective_charge(),
                q_j,
                self.boxsize.alpha,
                self.ff.cutoff_coul,
            );
        }
        out
    }

    /// `atoms` against every atom of one store, skipping molecule `exclude`.
    pub fn against_store(&self, store: &DeviceAtoms, exclude: Option<usize>, atoms: &[AtomRecord]) -> std::result::Result<PairSum, DeviceFault> {
        let pos = store.positions();
        let types = store.types();
        let scales = store.scales();
        let charges = store.charges();
        let scales_coul = store.scales_coul();
        let mol_ids = store.mol_ids();
        let partials = self.launch.launch_blocks(store.size(), |range| {
            let mut acc = PairSum::default();
            for j in range {
                if exclude == Some(mol_ids[j]) {
                    continue;
                }
                let q_j = charges[j] * scales_coul[j];
                for a in atoms {
                    acc = acc.fold(self.pair(a, a.pos - pos[j], types[j], scales[j], q_j));
                }
            }
            acc
        })?;
        Ok(partials.into_iter().fold(PairSum::default(), PairSum::fold))
    }

    /// Interaction of a guest molecule of `component` with the whole box.
    pub fn molecule_energy(
        &self,
        stores: &[DeviceAtoms],
        framework: usize,
        component: usize,
        exclude: Option<usize>,
        atoms: &[AtomRecord],
    ) -> std::result::Result<MoleculeEnergy, DeviceFault> {
        let mut out = MoleculeEnergy::default();
        for (c, store) in stores.iter().enumerate() {
            let skip = if c == component { exclude } else { None };
            let sum = self.against_store(store, skip, atoms)?;
            if c < framework {
                out.host = out.host.fold(sum);
            } else {
                out.guest = out.guest.fold(sum);
            }
        }
        trace!("molecule energy (component {component}): {out:?}");
        Ok(out)
    }
}

/// Box tail correction, 1/2 sum_ij N_i N_j / V * tail_ij over pairs involving a guest.
pub fn tail_energy(ff: &ForceField, volume: f64, host_counts: &[usize], guest_counts: &[usize]) -> f64 {
    if !ff.uses_tail() {
        return 0.0;
    }
    let n = ff.size;
    let mut e = 0.0;
    for i in 0..n {
        for j in 0..n {
            let tail = ff.tail[ff.index(i, j)];
            if !tail.use_tail {
                continue;
            }
            let (hi, hj) = (host_counts[i] as f64, host_counts[j] as f64);
            let (gi, gj) = (guest_counts[i] as f64, guest_counts[j] as f64);
            let pairs = (hi + gi) * (hj + gj) - hi * hj;
            e += 0.5 * pairs * tail.energy / volume;
        }
    }
    e
}

pub fn charge_sites(atoms: &[AtomRecord]) -> Vec<ChargeSite> {
    atoms
        .iter()
        .map(|a| ChargeSite {
            pos: a.pos,
            charge: a.effective_charge(),
        })
        .collect()
}

/// Host-side reference evaluation of the whole box from the synchronized host
/// stores. `ewald` supplies the k-vectors; its structure factors are rebuilt on a
/// copy. Returns the energy and whether any pair exceeded the overlap criterion.
/// The external correction term is left at zero.
pub fn system_energy(
    ctx: &InteractionContext<'_>,
    ewald: &Ewald,
    comps: &Components,
    box_index: usize,
) -> Result<(MoveEnergy, bool)> {
    let mut energy = MoveEnergy::default();
    let mut overlap = false;
    let n_comp = comps.counts.total;

    for c1 in 0..n_comp {
        let s1 = &comps.host_system[c1];
        for c2 in c1..n_comp {
            if comps.is_host(c1) && comps.is_host(c2) {
                continue;
            }
            let s2 = &comps.host_system[c2];
            let pairing = Pairing::of(comps.is_host(c1), comps.is_host(c2));
            for (i, a) in s1.records().enumerate() {
                for (j, b) in s2.records().enumerate() {
                    if c1 == c2 && (j <= i || a.mol_id == b.mol_id) {
                        continue;
                    }
                    let sum = ctx.pair(&a, a.pos - b.pos, b.atom_type, b.scale, b.effective_charge());
                    *energy.vdw_mut(pairing) += sum.vdw;
                    *energy.real_mut(pairing) += sum.real;
                    overlap |= sum.overlap;
                }
            }
        }
    }

    if ewald.is_enabled() && !ctx.ff.no_charges {
        let mut host_sites = Vec::new();
        let mut guest_sites = Vec::new();
        for c in 0..n_comp {
            let sites = comps.host_system[c].records().map(|a| ChargeSite {
                pos: a.pos,
                charge: a.effective_charge(),
            });
            if comps.is_host(c) {
                host_sites.extend(sites);
            } else {
                guest_sites.extend(sites);
            }
        }
        let mut fresh = ewald.clone();
        fresh
            .recompute(&host_sites, &guest_sites, ctx.launch)
            .map_err(|f| f.into_error("ewald_recompute", box_index, "energy check", 0))?;
        let recip = fresh.energy();
        energy.hh_ewald_e = recip.host_host;
        energy.hg_ewald_e = recip.host_guest;
        energy.gg_ewald_e = recip.guest_guest;
        // self and exclusion terms from the stored charges, molecule by molecule
        for c in 0..n_comp {
            let store = &comps.host_system[c];
            let is_host = comps.is_host(c);
            let mut correction = 0.0;
            for m in 0..store.num_molecules() {
                correction += molecule_ewald_correction(&store.molecule(m)?, ctx.boxsize.alpha, is_host);
            }
            if is_host {
                energy.hh_ewald_e += correction;
            } else {
                energy.gg_ewald_e += correction;
            }
        }
    }

    energy.tail_e = tail_energy(
        ctx.ff,
        ctx.boxsize.volume,
        &comps.host_type_counts,
        &comps.guest_type_counts,
    );
    Ok((energy, overlap))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atoms::Atoms;
    use approx::assert_relative_eq;

    fn lj_field(cutoff: f64) -> ForceField {
        let mut ff = ForceField::new(2);
        ff.cutoff_vdw = cutoff;
        ff.cutoff_coul = cutoff;
        ff.no_charges = true;
        ff.set_pair(0, 0, 1.0, 1.0, false).unwrap();
        ff
    }

    fn store(points: &[(f64, usize)]) -> DeviceAtoms {
        let mut host = Atoms::with_capacity(points.len().max(1), 1).unwrap();
        for (x, mol) in points {
            host.push(AtomRecord::new(Vector3::new(*x, 0.0, 0.0), 0.0, 0, *mol))
                .unwrap();
        }
        DeviceAtoms::from_host(&host).unwrap()
    }

    #[test]
    fn test_pair_at_cutoff_is_zero() {
        let ff = lj_field(4.0);
        let b = Boxsize::cuboid(20.0, 20.0, 20.0).unwrap();
        let launch = LaunchConfig::new(2);
        let ctx = InteractionContext {
            ff: &ff,
            boxsize: &b,
            launch: &launch,
        };
        let atom = AtomRecord::new(Vector3::new(4.0, 0.0, 0.0), 0.0, 0, 1);
        let s = store(&[(0.0, 0)]);
        let at_cut = ctx.against_store(&s, None, &[atom]).unwrap();
        assert_eq!(at_cut.vdw, 0.0);

        let half = AtomRecord::new(Vector3::new(2.0, 0.0, 0.0), 0.0, 0, 1);
        let e1 = ctx.against_store(&s, None, &[half]).unwrap();
        let e2 = ctx.against_store(&s, None, &[half]).unwrap();
        assert!(e1.vdw != 0.0);
        assert_eq!(e1, e2);
        let s6 = (1.0f64 / 2.0).powi(6);
        assert_relative_eq!(e1.vdw, 4.0 * (s6 * s6 - s6), epsilon = 1e-14);
    }

    #[test]
    fn test_block_count_does_not_change_result() {
        let ff = lj_field(6.0);
        let b = Boxsize::cuboid(30.0, 30.0, 30.0).unwrap();
        let points: Vec<(f64, usize)> = (0..17).map(|i| (1.1 * i as f64, i)).collect();
        let s = store(&points);
        let atom = AtomRecord::new(Vector3::new(0.0, 1.2, 0.0), 0.0, 0, 99);
        let sums: Vec<f64> = [1, 3, 8]
            .iter()
            .map(|&nb| {
                let launch = LaunchConfig::new(nb);
                let ctx = InteractionContext {
                    ff: &ff,
                    boxsize: &b,
                    launch: &launch,
                };
                ctx.against_store(&s, None, &[atom]).unwrap().vdw
            })
            .collect();
        assert_relative_eq!(sums[0], sums[1], epsilon = 1e-12);
        assert_relative_eq!(sums[0], sums[2], epsilon = 1e-12);
    }

    #[test]
    fn test_overlap_flag_and_exclusion() {
        let ff = lj_field(5.0);
        let b = Boxsize::cuboid(20.0, 20.0, 20.0).unwrap();
        let launch = LaunchConfig::new(4);
        let ctx = InteractionContext {
            ff: &ff,
            boxsize: &b,
            launch: &launch,
        };
        let s = store(&[(0.0, 0), (10.0, 1)]);
        let close = AtomRecord::new(Vector3::new(0.1, 0.0, 0.0), 0.0, 0, 1);
        assert!(ctx.against_store(&s, None, &[close]).unwrap().overlap);
        assert!(!ctx.against_store(&s, Some(0), &[close]).unwrap().overlap);
    }

    #[test]
    fn test_minimum_image_applies() {
        let ff = lj_field(4.0);
        let b = Boxsize::cuboid(10.0, 10.0, 10.0).unwrap();
        let launch = LaunchConfig::new(1);
        let ctx = InteractionContext {
            ff: &ff,
            boxsize: &b,
            launch: &launch,
        };
        let s = store(&[(0.5, 0)]);
        // 8.5 apart in the raw frame, 1.5 through the boundary
        let atom = AtomRecord::new(Vector3::new(9.0, 0.0, 0.0), 0.0, 0, 1);
        assert!(ctx.against_store(&s, None, &[atom]).unwrap().vdw != 0.0);
    }

    #[test]
    fn test_tail_skips_host_host() {
        let mut ff = lj_field(10.0);
        ff.set_tail(0, 0, true).unwrap();
        let only_host = tail_energy(&ff, 1000.0, &[10, 0], &[0, 0]);
        assert_eq!(only_host, 0.0);
        let one_guest = tail_energy(&ff, 1000.0, &[10, 0], &[1, 0]);
        let expected = 0.5 * (11.0 * 11.0 - 100.0) * ff.tail[0].energy / 1000.0;
        assert_relative_eq!(one_guest, expected, epsilon = 1e-12);
    }
}
