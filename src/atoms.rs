/*
Host-side Atoms store, one per component per box.

Six parallel arrays (pos, scale, charge, scaleCoul, Type, MolID) of physical
length `allocate_size`; indices [0, size) hold atoms, the rest is scratch. A
molecule is a contiguous run of `molsize` atoms sharing one MolID.

During a run the device copy is authoritative and the host only changes through
`resync_from_device`: header first (capacity), reallocate if the capacity moved,
then copy the payload.
 */

use log::debug;
use nalgebra::Vector3;
use serde::Serialize;

use crate::device::{AtomsHeader, DeviceAtoms};
use crate::error::{Error, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AtomRecord {
    pub pos: Vector3<f64>,
    pub scale: f64,
    pub charge: f64,
    pub scale_coul: f64,
    pub atom_type: usize,
    pub mol_id: usize,
}

impl AtomRecord {
    pub fn new(pos: Vector3<f64>, charge: f64, atom_type: usize, mol_id: usize) -> Self {
        AtomRecord {
            pos,
            scale: 1.0,
            charge,
            scale_coul: 1.0,
            atom_type,
            mol_id,
        }
    }

    /// Charge as seen by the electrostatics, after fractional scaling.
    #[inline]
    pub fn effective_charge(&self) -> f64 {
        self.charge * self.scale_coul
    }
}

/// What a host resynchronization had to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncOutcome {
    InPlace,
    Reallocated { from: usize, to: usize },
}

/// Read-only view of one store: positions, charges, types and MolIDs of the
/// occupied range. Valid until the next resync or reallocation of the store.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct AtomsSnapshot<'a> {
    #[serde(serialize_with = "serialize_positions")]
    pub pos: &'a [Vector3<f64>],
    pub charge: &'a [f64],
    #[serde(rename = "Type")]
    pub atom_type: &'a [usize],
    #[serde(rename = "MolID")]
    pub mol_id: &'a [usize],
}

fn serialize_positions<S>(pos: &&[Vector3<f64>], s: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    s.collect_seq(pos.iter().map(|p| [p.x, p.y, p.z]))
}

impl AtomsSnapshot<'_> {
    pub fn len(&self) -> usize {
        self.pos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_empty()
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Atoms {
    pos: Vec<Vector3<f64>>,
    scale: Vec<f64>,
    charge: Vec<f64>,
    scale_coul: Vec<f64>,
    atom_type: Vec<usize>,
    mol_id: Vec<usize>,
    size: usize,
    allocate_size: usize,
    molsize: usize,
}

fn allocate<T: Clone>(len: usize, fill: T, what: &'static str) -> Result<Vec<T>> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len).map_err(|_| Error::Allocation {
        what,
        requested: len,
    })?;
    v.resize(len, fill);
    Ok(v)
}

impl Atoms {
    pub fn with_capacity(capacity: usize, molsize: usize) -> Result<Self> {
        if molsize == 0 {
            return Err(Error::InvalidParameter(
                "molecules need at least one atom".to_string(),
            ));
        }
        let mut atoms = Atoms {
            molsize,
            ..Atoms::default()
        };
        atoms.reallocate(capacity)?;
        Ok(atoms)
    }

    /// Replace all six arrays with fresh ones of length `capacity`.
    /// Contents are not preserved; the payload copy that follows fills them.
    fn reallocate(&mut self, capacity: usize) -> Result<()> {
        self.pos = allocate(capacity, Vector3::zeros(), "host pos")?;
        self.scale = allocate(capacity, 0.0, "host scale")?;
        self.charge = allocate(capacity, 0.0, "host charge")?;
        self.scale_coul = allocate(capacity, 0.0, "host scaleCoul")?;
        self.atom_type = allocate(capacity, 0, "host Type")?;
        self.mol_id = allocate(capacity, 0, "host MolID")?;
        self.allocate_size = capacity;
        Ok(())
    }

    /// Append one atom during setup, growing the host arrays if needed.
    pub fn push(&mut self, rec: AtomRecord) -> Result<()> {
        if self.size == self.allocate_size {
            let new_cap = (2 * self.allocate_size).max(self.molsize);
            let old = self.clone();
            self.reallocate(new_cap)?;
            let n = old.size;
            self.pos[..n].copy_from_slice(&old.pos[..n]);
            self.scale[..n].copy_from_slice(&old.scale[..n]);
            self.charge[..n].copy_from_slice(&old.charge[..n]);
            self.scale_coul[..n].copy_from_slice(&old.scale_coul[..n]);
            self.atom_type[..n].copy_from_slice(&old.atom_type[..n]);
            self.mol_id[..n].copy_from_slice(&old.mol_id[..n]);
        }
        let i = self.size;
        self.pos[i] = rec.pos;
        self.scale[i] = rec.scale;
        self.charge[i] = rec.charge;
        self.scale_coul[i] = rec.scale_coul;
        self.atom_type[i] = rec.atom_type;
        self.mol_id[i] = rec.mol_id;
        self.size += 1;
        Ok(())
    }

    /// Two-phase download: compare capacities from the header, reallocate on a
    /// mismatch, then copy every array over the full capacity.
    pub fn resync_from_device(&mut self, header: AtomsHeader, device: &DeviceAtoms) -> Result<SyncOutcome> {
        let outcome = if header.allocate_size != self.allocate_size {
            let from = self.allocate_size;
            self.reallocate(header.allocate_size)?;
            debug!("host store reallocated {} -> {}", from, header.allocate_size);
            SyncOutcome::Reallocated {
                from,
                to: header.allocate_size,
            }
        } else {
            SyncOutcome::InPlace
        };
        self.pos.copy_from_slice(&device.pos);
        self.scale.copy_from_slice(&device.scale);
        self.charge.copy_from_slice(&device.charge);
        self.scale_coul.copy_from_slice(&device.scale_coul);
        self.atom_type.copy_from_slice(&device.atom_type);
        self.mol_id.copy_from_slice(&device.mol_id);
        self.size = header.size;
        self.molsize = device.molsize();
        Ok(outcome)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn allocate_size(&self) -> usize {
        self.allocate_size
    }

    pub fn molsize(&self) -> usize {
        self.molsize
    }

    pub fn num_molecules(&self) -> usize {
        self.size / self.molsize
    }

    pub fn record(&self, i: usize) -> Option<AtomRecord> {
        (i < self.size).then(|| AtomRecord {
            pos: self.pos[i],
            scale: self.scale[i],
            charge: self.charge[i],
            scale_coul: self.scale_coul[i],
            atom_type: self.atom_type[i],
            mol_id: self.mol_id[i],
        })
    }

    pub fn records(&self) -> impl Iterator<Item = AtomRecord> + '_ {
        (0..self.size).filter_map(move |i| self.record(i))
    }

    pub fn molecule(&self, molecule: usize) -> Result<Vec<AtomRecord>> {
        if molecule >= self.num_molecules() {
            return Err(Error::invalid_index("molecule", molecule, self.num_molecules()));
        }
        let start = molecule * self.molsize;
        Ok((start..start + self.molsize)
            .filter_map(|i| self.record(i))
            .collect())
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.pos[..self.size]
    }

    pub fn charges(&self) -> &[f64] {
        &self.charge[..self.size]
    }

    pub fn types(&self) -> &[usize] {
        &self.atom_type[..self.size]
    }

    pub fn mol_ids(&self) -> &[usize] {
        &self.mol_id[..self.size]
    }

    /// Scaling arrays are not part of the snapshot; the engine reads them here.
    pub fn scales(&self) -> &[f64] {
        &self.scale[..self.size]
    }

    pub fn scales_coul(&self) -> &[f64] {
        &self.scale_coul[..self.size]
    }

    /// Mutable charge view for the symbolic accessor.
    pub(crate) fn charges_mut(&mut self) -> &mut [f64] {
        &mut self.charge[..self.size]
    }

    pub fn snapshot(&self) -> AtomsSnapshot<'_> {
        AtomsSnapshot {
            pos: self.positions(),
            charge: self.charges(),
            atom_type: self.types(),
            mol_id: self.mol_ids(),
        }
    }

    // full-capacity views for the upload path
    pub(crate) fn raw_pos(&self) -> &[Vector3<f64>] {
        &self.pos
    }
    pub(crate) fn raw_scale(&self) -> &[f64] {
        &self.scale
    }
    pub(crate) fn raw_charge(&self) -> &[f64] {
        &self.charge
    }
    pub(crate) fn raw_scale_coul(&self) -> &[f64] {
        &self.scale_coul
    }
    pub(crate) fn raw_atom_type(&self) -> &[usize] {
        &self.atom_type
    }
    pub(crate) fn raw_mol_id(&self) -> &[usize] {
        &self.mol_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn water_like(n_mol: usize) -> Atoms {
        let mut a = Atoms::with_capacity(3 * n_mol, 3).unwrap();
        for m in 0..n_mol {
            for (k, q) in [-0.8, 0.4, 0.4].iter().enumerate() {
                let pos = Vector3::new(m as f64 * 3.0 + k as f64, 0.0, 0.0);
                a.push(AtomRecord::new(pos, *q, k.min(1), m)).unwrap();
            }
        }
        a
    }

    #[test]
    fn test_push_and_molecule_view() {
        let a = water_like(2);
        assert_eq!(a.size(), 6);
        assert_eq!(a.num_molecules(), 2);
        let m1 = a.molecule(1).unwrap();
        assert_eq!(m1.len(), 3);
        assert!(m1.iter().all(|r| r.mol_id == 1));
        assert!(a.molecule(2).is_err());
    }

    #[test]
    fn test_push_grows_host() {
        let mut a = Atoms::with_capacity(1, 1).unwrap();
        for i in 0..5 {
            a.push(AtomRecord::new(Vector3::new(i as f64, 0.0, 0.0), 0.0, 0, i))
                .unwrap();
        }
        assert_eq!(a.size(), 5);
        assert!(a.allocate_size() >= 5);
        assert_eq!(a.positions()[4].x, 4.0);
    }

    #[test]
    fn test_snapshot_covers_occupied_range() {
        let a = water_like(2);
        let snap = a.snapshot();
        assert_eq!(snap.len(), 6);
        assert_eq!(snap.charge[0], -0.8);
        assert_eq!(snap.mol_id[5], 1);
    }

    #[test]
    fn test_resync_is_idempotent() {
        let host = water_like(2);
        let device = DeviceAtoms::from_host(&host).unwrap();
        let mut copy = Atoms::with_capacity(1, 3).unwrap();

        let first = copy.resync_from_device(device.header(), &device).unwrap();
        assert!(matches!(first, SyncOutcome::Reallocated { from: 1, to: 6 }));
        let after_first = copy.clone();

        let second = copy.resync_from_device(device.header(), &device).unwrap();
        assert_eq!(second, SyncOutcome::InPlace);
        assert_eq!(copy, after_first);
        assert_eq!(copy, host);
    }

    #[test]
    fn test_capacity_growth_keeps_occupancy() {
        let mut host = water_like(2);
        let mut device = DeviceAtoms::from_host(&host).unwrap();
        device.grow(12).unwrap();
        host.resync_from_device(device.header(), &device).unwrap();
        assert_eq!(host.allocate_size(), 12);
        assert_eq!(host.size(), 6);
        assert_eq!(host.molecule(1).unwrap()[0].charge, -0.8);
    }
}
