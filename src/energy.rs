/*
Energy bookkeeping for trial moves.

A MoveEnergy carries the nine pair categories
    {Host-Host, Host-Guest, Guest-Guest} x {VDW, Real-space Coulomb, Ewald reciprocal}
plus the tail correction and the external (DNN) correction. Deltas are added
component-wise into the running box total; removal moves use `take_negative`.
 */

use log::info;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EnergyCategory {
    HHVDW,
    HHReal,
    HHEwaldE,
    HGVDW,
    HGReal,
    HGEwaldE,
    GGVDW,
    GGReal,
    GGEwaldE,
    TailE,
    DnnE,
}

impl EnergyCategory {
    pub const ALL: [EnergyCategory; 11] = [
        EnergyCategory::HHVDW,
        EnergyCategory::HHReal,
        EnergyCategory::HHEwaldE,
        EnergyCategory::HGVDW,
        EnergyCategory::HGReal,
        EnergyCategory::HGEwaldE,
        EnergyCategory::GGVDW,
        EnergyCategory::GGReal,
        EnergyCategory::GGEwaldE,
        EnergyCategory::TailE,
        EnergyCategory::DnnE,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EnergyCategory::HHVDW => "HHVDW",
            EnergyCategory::HHReal => "HHReal",
            EnergyCategory::HHEwaldE => "HHEwaldE",
            EnergyCategory::HGVDW => "HGVDW",
            EnergyCategory::HGReal => "HGReal",
            EnergyCategory::HGEwaldE => "HGEwaldE",
            EnergyCategory::GGVDW => "GGVDW",
            EnergyCategory::GGReal => "GGReal",
            EnergyCategory::GGEwaldE => "GGEwaldE",
            EnergyCategory::TailE => "TailE",
            EnergyCategory::DnnE => "DNN_E",
        }
    }
}

/// Which side of the host/guest split a pair falls on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pairing {
    HostHost,
    HostGuest,
    GuestGuest,
}

impl Pairing {
    pub fn of(i_is_host: bool, j_is_host: bool) -> Self {
        match (i_is_host, j_is_host) {
            (true, true) => Pairing::HostHost,
            (false, false) => Pairing::GuestGuest,
            _ => Pairing::HostGuest,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveEnergy {
    pub hh_vdw: f64,
    pub hh_real: f64,
    pub hh_ewald_e: f64,
    pub hg_vdw: f64,
    pub hg_real: f64,
    pub hg_ewald_e: f64,
    pub gg_vdw: f64,
    pub gg_real: f64,
    pub gg_ewald_e: f64,
    pub tail_e: f64,
    pub dnn_e: f64,
}

impl MoveEnergy {
    pub fn get(&self, category: EnergyCategory) -> f64 {
        match category {
            EnergyCategory::HHVDW => self.hh_vdw,
            EnergyCategory::HHReal => self.hh_real,
            EnergyCategory::HHEwaldE => self.hh_ewald_e,
            EnergyCategory::HGVDW => self.hg_vdw,
            EnergyCategory::HGReal => self.hg_real,
            EnergyCategory::HGEwaldE => self.hg_ewald_e,
            EnergyCategory::GGVDW => self.gg_vdw,
            EnergyCategory::GGReal => self.gg_real,
            EnergyCategory::GGEwaldE => self.gg_ewald_e,
            EnergyCategory::TailE => self.tail_e,
            EnergyCategory::DnnE => self.dnn_e,
        }
    }

    pub fn get_mut(&mut self, category: EnergyCategory) -> &mut f64 {
        match category {
            EnergyCategory::HHVDW => &mut self.hh_vdw,
            EnergyCategory::HHReal => &mut self.hh_real,
            EnergyCategory::HHEwaldE => &mut self.hh_ewald_e,
            EnergyCategory::HGVDW => &mut self.hg_vdw,
            EnergyCategory::HGReal => &mut self.hg_real,
            EnergyCategory::HGEwaldE => &mut self.hg_ewald_e,
            EnergyCategory::GGVDW => &mut self.gg_vdw,
            EnergyCategory::GGReal => &mut self.gg_real,
            EnergyCategory::GGEwaldE => &mut self.gg_ewald_e,
            EnergyCategory::TailE => &mut self.tail_e,
            EnergyCategory::DnnE => &mut self.dnn_e,
        }
    }

    /// (category, value) for every component, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (EnergyCategory, f64)> + '_ {
        EnergyCategory::ALL.into_iter().map(move |c| (c, self.get(c)))
    }

    pub fn vdw_mut(&mut self, pairing: Pairing) -> &mut f64 {
        match pairing {
            Pairing::HostHost => &mut self.hh_vdw,
            Pairing::HostGuest => &mut self.hg_vdw,
            Pairing::GuestGuest => &mut self.gg_vdw,
        }
    }

    pub fn real_mut(&mut self, pairing: Pairing) -> &mut f64 {
        match pairing {
            Pairing::HostHost => &mut self.hh_real,
            Pairing::HostGuest => &mut self.hg_real,
            Pairing::GuestGuest => &mut self.gg_real,
        }
    }

    pub fn total(&self) -> f64 {
        self.iter().map(|(_, v)| v).sum()
    }

    pub fn take_negative(&mut self) {
        for c in EnergyCategory::ALL {
            let v = self.get_mut(c);
            *v = -*v;
        }
    }

    pub fn zero(&mut self) {
        *self = MoveEnergy::default();
    }

    /// Sentinel for a trial that hit the overlap criterion.
    pub fn infeasible(pairing: Pairing) -> Self {
        let mut e = MoveEnergy::default();
        *e.vdw_mut(pairing) = f64::INFINITY;
        e
    }

    pub fn is_infeasible(&self) -> bool {
        self.total() == f64::INFINITY
    }

    pub fn print(&self) {
        info!("{self}");
    }
}

impl Add for MoveEnergy {
    type Output = MoveEnergy;

    fn add(mut self, rhs: MoveEnergy) -> MoveEnergy {
        self += rhs;
        self
    }
}

impl AddAssign for MoveEnergy {
    fn add_assign(&mut self, rhs: MoveEnergy) {
        for c in EnergyCategory::ALL {
            *self.get_mut(c) += rhs.get(c);
        }
    }
}

impl fmt::Display for MoveEnergy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (c, v) in self.iter() {
            writeln!(f, "{:>9}: {:.5} [K]", c.name(), v)?;
        }
        write!(f, "    Total: {:.5} [K]", self.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MoveEnergy {
        MoveEnergy {
            hh_vdw: 1.0,
            hh_real: -2.0,
            hh_ewald_e: 3.5,
            hg_vdw: -40.25,
            hg_real: 0.5,
            hg_ewald_e: 0.125,
            gg_vdw: -7.0,
            gg_real: 2.0,
            gg_ewald_e: -0.75,
            tail_e: -1.5,
            dnn_e: 0.25,
        }
    }

    #[test]
    fn test_take_negative_is_involution() {
        let original = sample();
        let mut e = original;
        e.take_negative();
        assert_eq!(e.hg_vdw, 40.25);
        e.take_negative();
        assert_eq!(e, original);
    }

    #[test]
    fn test_zero_then_total() {
        let mut e = sample();
        e.zero();
        assert_eq!(e.total(), 0.0);
    }

    #[test]
    fn test_total_sums_every_component() {
        let e = sample();
        let manual = 1.0 - 2.0 + 3.5 - 40.25 + 0.5 + 0.125 - 7.0 + 2.0 - 0.75 - 1.5 + 0.25;
        assert!((e.total() - manual).abs() < 1e-12);
    }

    #[test]
    fn test_componentwise_add() {
        let a = sample();
        let mut neg = a;
        neg.take_negative();
        let sum = a + neg;
        assert!(sum.iter().all(|(_, v)| v == 0.0));
    }

    #[test]
    fn test_infeasible_sentinel() {
        let e = MoveEnergy::infeasible(Pairing::HostGuest);
        assert!(e.is_infeasible());
        assert!(!sample().is_infeasible());
    }

    #[test]
    fn test_pairing_classification() {
        assert_eq!(Pairing::of(true, true), Pairing::HostHost);
        assert_eq!(Pairing::of(true, false), Pairing::HostGuest);
        assert_eq!(Pairing::of(false, true), Pairing::HostGuest);
        assert_eq!(Pairing::of(false, false), Pairing::GuestGuest);
    }
}
