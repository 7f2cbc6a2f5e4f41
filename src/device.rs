/*
Device side of the engine.

The device owns its own copy of every Atoms store and runs the heavy loops as
block-partitioned kernels: `nblocks` contiguous blocks are processed in parallel
(rayon) and their partial results come back in block order, so the controller can
fold them deterministically regardless of thread scheduling.

Nothing here aliases host memory. Data crosses the boundary only through
`DeviceAtoms::from_host` (upload) and `Atoms::resync_from_device` (download).
 */

use log::trace;
use nalgebra::Vector3;
use rayon::prelude::*;
use std::fmt;
use std::ops::Range;

use crate::atoms::{AtomRecord, Atoms};
use crate::error::Error;

/// Failure raised inside a kernel; the pipeline attaches box, move and cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum DeviceFault {
    Launch(String),
    OutOfBounds { index: usize, size: usize },
    Allocation { requested: usize },
}

impl fmt::Display for DeviceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceFault::Launch(msg) => write!(f, "launch failure: {msg}"),
            DeviceFault::OutOfBounds { index, size } => {
                write!(f, "out-of-bounds access at {index} (size {size})")
            }
            DeviceFault::Allocation { requested } => {
                write!(f, "device allocation of {requested} atoms failed")
            }
        }
    }
}

impl DeviceFault {
    pub fn into_error(self, kernel: &'static str, box_index: usize, move_type: &str, cycle: usize) -> Error {
        match self {
            DeviceFault::Allocation { requested } => Error::Allocation {
                what: "device atoms",
                requested,
            },
            other => Error::Device {
                kernel,
                box_index,
                move_type: move_type.to_string(),
                cycle,
                detail: other.to_string(),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LaunchConfig {
    pub nblocks: usize,
}

impl LaunchConfig {
    pub fn new(nblocks: usize) -> Self {
        LaunchConfig { nblocks }
    }

    fn check(&self) -> Result<(), DeviceFault> {
        if self.nblocks == 0 {
            return Err(DeviceFault::Launch("kernel launched with zero blocks".to_string()));
        }
        Ok(())
    }

    /// Split 0..n into at most `nblocks` contiguous, non-empty ranges.
    pub fn block_ranges(&self, n: usize) -> Vec<Range<usize>> {
        if n == 0 || self.nblocks == 0 {
            return Vec::new();
        }
        let per_block = n.div_ceil(self.nblocks);
        (0..n)
            .step_by(per_block)
            .map(|start| start..(start + per_block).min(n))
            .collect()
    }

    /// Run `kernel` once per block; partials are returned in block order.
    pub fn launch_blocks<T, F>(&self, n: usize, kernel: F) -> Result<Vec<T>, DeviceFault>
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Sync + Send,
    {
        self.check()?;
        trace!("launch: {n} items over {} blocks", self.nblocks);
        Ok(self.block_ranges(n).into_par_iter().map(kernel).collect())
    }

    /// One thread per item; outputs keep item order.
    pub fn launch_map<T, F>(&self, n: usize, kernel: F) -> Result<Vec<T>, DeviceFault>
    where
        T: Send,
        F: Fn(usize) -> T + Sync + Send,
    {
        self.check()?;
        Ok((0..n).into_par_iter().map(kernel).collect())
    }
}

/// Capacity header of a device store, read before any payload copy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtomsHeader {
    pub size: usize,
    pub allocate_size: usize,
}

/// Device copy of one component's atoms. Arrays are `allocate_size` long;
/// entries past `size` are scratch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceAtoms {
    pub(crate) pos: Vec<Vector3<f64>>,
    pub(crate) scale: Vec<f64>,
    pub(crate) charge: Vec<f64>,
    pub(crate) scale_coul: Vec<f64>,
    pub(crate) atom_type: Vec<usize>,
    pub(crate) mol_id: Vec<usize>,
    size: usize,
    allocate_size: usize,
    molsize: usize,
}

fn reserve<T: Clone>(len: usize, fill: T) -> Result<Vec<T>, DeviceFault> {
    let mut v: Vec<T> = Vec::new();
    v.try_reserve_exact(len)
        .map_err(|_| DeviceFault::Allocation { requested: len })?;
    v.resize(len, fill);
    Ok(v)
}

impl DeviceAtoms {
    /// Upload a host store, keeping its capacity.
    pub fn from_host(host: &Atoms) -> Result<Self, DeviceFault> {
        let cap = host.allocate_size();
        let mut d = DeviceAtoms {
            pos: reserve(cap, Vector3::zeros())?,
            scale: reserve(cap, 0.0)?,
            charge: reserve(cap, 0.0)?,
            scale_coul: reserve(cap, 0.0)?,
            atom_type: reserve(cap, 0)?,
            mol_id: reserve(cap, 0)?,
            size: host.size(),
            allocate_size: cap,
            molsize: host.molsize(),
        };
        d.pos.copy_from_slice(host.raw_pos());
        d.scale.copy_from_slice(host.raw_scale());
        d.charge.copy_from_slice(host.raw_charge());
        d.scale_coul.copy_from_slice(host.raw_scale_coul());
        d.atom_type.copy_from_slice(host.raw_atom_type());
        d.mol_id.copy_from_slice(host.raw_mol_id());
        Ok(d)
    }

    pub fn header(&self) -> AtomsHeader {
        AtomsHeader {
            size: self.size,
            allocate_size: self.allocate_size,
        }
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

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.pos[..self.size]
    }

    pub fn charges(&self) -> &[f64] {
        &self.charge[..self.size]
    }

    pub fn scales(&self) -> &[f64] {
        &self.scale[..self.size]
    }

    pub fn scales_coul(&self) -> &[f64] {
        &self.scale_coul[..self.size]
    }

    pub fn types(&self) -> &[usize] {
        &self.atom_type[..self.size]
    }

    pub fn mol_ids(&self) -> &[usize] {
        &self.mol_id[..self.size]
    }

    pub fn num_molecules(&self) -> usize {
        if self.molsize == 0 {
            0
        } else {
            self.size / self.molsize
        }
    }

    /// Reallocate to `new_capacity` and copy the occupied range across.
    pub fn grow(&mut self, new_capacity: usize) -> Result<(), DeviceFault> {
        if new_capacity <= self.allocate_size {
            return Ok(());
        }
        let n = self.size;
        let mut pos = reserve(new_capacity, Vector3::zeros())?;
        let mut scale = reserve(new_capacity, 0.0)?;
        let mut charge = reserve(new_capacity, 0.0)?;
        let mut scale_coul = reserve(new_capacity, 0.0)?;
        let mut atom_type = reserve(new_capacity, 0usize)?;
        let mut mol_id = reserve(new_capacity, 0usize)?;
        pos[..n].copy_from_slice(&self.pos[..n]);
        scale[..n].copy_from_slice(&self.scale[..n]);
        charge[..n].copy_from_slice(&self.charge[..n]);
        scale_coul[..n].copy_from_slice(&self.scale_coul[..n]);
        atom_type[..n].copy_from_slice(&self.atom_type[..n]);
        mol_id[..n].copy_from_slice(&self.mol_id[..n]);
        self.pos = pos;
        self.scale = scale;
        self.charge = charge;
        self.scale_coul = scale_coul;
        self.atom_type = atom_type;
        self.mol_id = mol_id;
        trace!("device store grown {} -> {}", self.allocate_size, new_capacity);
        self.allocate_size = new_capacity;
        Ok(())
    }

    pub fn record(&self, i: usize) -> Result<AtomRecord, DeviceFault> {
        if i >= self.size {
            return Err(DeviceFault::OutOfBounds {
                index: i,
                size: self.size,
            });
        }
        Ok(AtomRecord {
            pos: self.pos[i],
            scale: self.scale[i],
            charge: self.charge[i],
            scale_coul: self.scale_coul[i],
            atom_type: self.atom_type[i],
            mol_id: self.mol_id[i],
        })
    }

    pub fn molecule(&self, molecule: usize) -> Result<Vec<AtomRecord>, DeviceFault> {
        let start = molecule * self.molsize;
        (start..start + self.molsize).map(|i| self.record(i)).collect()
    }

    fn write(&mut self, i: usize, rec: &AtomRecord) {
        self.pos[i] = rec.pos;
        self.scale[i] = rec.scale;
        self.charge[i] = rec.charge;
        self.scale_coul[i] = rec.scale_coul;
        self.atom_type[i] = rec.atom_type;
        self.mol_id[i] = rec.mol_id;
    }

    /// Overwrite molecule `molecule` in place (translation / rotation commit).
    pub fn write_molecule(&mut self, molecule: usize, records: &[AtomRecord]) -> Result<(), DeviceFault> {
        if records.len() != self.molsize {
            return Err(DeviceFault::Launch(format!(
                "molecule write of {} atoms into a store of {}-atom molecules",
                records.len(),
                self.molsize
            )));
        }
        let start = molecule * self.molsize;
        if start + self.molsize > self.size {
            return Err(DeviceFault::OutOfBounds {
                index: start + self.molsize - 1,
                size: self.size,
            });
        }
        for (k, rec) in records.iter().enumerate() {
            self.write(start + k, rec);
        }
        Ok(())
    }

    /// Append one molecule, doubling the capacity when it does not fit.
    pub fn append_molecule(&mut self, records: &[AtomRecord]) -> Result<usize, DeviceFault> {
        if records.len() != self.molsize {
            return Err(DeviceFault::Launch(format!(
                "molecule append of {} atoms into a store of {}-atom molecules",
                records.len(),
                self.molsize
            )));
        }
        let needed = self.size + self.molsize;
        if needed > self.allocate_size {
            self.grow(needed.max(2 * self.allocate_size))?;
        }
        let molecule = self.num_molecules();
        let start = self.size;
        for (k, rec) in records.iter().enumerate() {
            let mut rec = *rec;
            rec.mol_id = molecule;
            self.write(start + k, &rec);
        }
        self.size = needed;
        Ok(molecule)
    }

    /// Remove a molecule; the last molecule moves into the gap and takes its MolID.
    pub fn remove_molecule(&mut self, molecule: usize) -> Result<(), DeviceFault> {
        let n_mol = self.num_molecules();
        if molecule >= n_mol {
            return Err(DeviceFault::OutOfBounds {
                index: molecule * self.molsize,
                size: self.size,
            });
        }
        let last = n_mol - 1;
        if molecule != last {
            let moved = self.molecule(last)?;
            for (k, rec) in moved.iter().enumerate() {
                let mut rec = *rec;
                rec.mol_id = molecule;
                self.write(molecule * self.molsize + k, &rec);
            }
        }
        self.size -= self.molsize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(x: f64, mol_id: usize) -> AtomRecord {
        AtomRecord {
            pos: Vector3::new(x, 0.0, 0.0),
            scale: 1.0,
            charge: 0.0,
            scale_coul: 1.0,
            atom_type: 0,
            mol_id,
        }
    }

    fn device_with(n_mol: usize) -> DeviceAtoms {
        let mut host = Atoms::with_capacity(n_mol.max(1), 1).unwrap();
        for m in 0..n_mol {
            host.push(rec(m as f64, m)).unwrap();
        }
        DeviceAtoms::from_host(&host).unwrap()
    }

    #[test]
    fn test_block_ranges_cover_everything() {
        let lc = LaunchConfig::new(4);
        let ranges = lc.block_ranges(10);
        assert_eq!(ranges.len(), 4);
        assert_eq!(ranges.iter().map(|r| r.len()).sum::<usize>(), 10);
        assert_eq!(ranges[0].start, 0);
        assert_eq!(ranges.last().unwrap().end, 10);
        assert!(lc.block_ranges(0).is_empty());
    }

    #[test]
    fn test_zero_blocks_is_a_launch_failure() {
        let lc = LaunchConfig::new(0);
        assert!(lc.launch_blocks(5, |r| r.len()).is_err());
    }

    #[test]
    fn test_block_partials_in_order() {
        let lc = LaunchConfig::new(3);
        let partials = lc.launch_blocks(9, |r| r.start).unwrap();
        assert_eq!(partials, vec![0, 3, 6]);
    }

    #[test]
    fn test_append_grows_capacity() {
        let mut d = device_with(2);
        assert_eq!(d.allocate_size(), 2);
        let m = d.append_molecule(&[rec(9.0, 0)]).unwrap();
        assert_eq!(m, 2);
        assert_eq!(d.allocate_size(), 4);
        assert_eq!(d.size(), 3);
        assert_eq!(d.record(2).unwrap().mol_id, 2);
    }

    #[test]
    fn test_remove_moves_last_into_gap() {
        let mut d = device_with(3);
        d.remove_molecule(0).unwrap();
        assert_eq!(d.size(), 2);
        let moved = d.record(0).unwrap();
        assert_eq!(moved.pos.x, 2.0);
        assert_eq!(moved.mol_id, 0);
        assert!(d.remove_molecule(5).is_err());
    }

    #[test]
    fn test_write_out_of_bounds() {
        let mut d = device_with(1);
        assert!(matches!(
            d.write_molecule(3, &[rec(0.0, 3)]),
            Err(DeviceFault::OutOfBounds { .. })
        ));
    }
}
