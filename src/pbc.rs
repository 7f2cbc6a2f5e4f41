/*
How do we handle periodic boundaries and minimum image convention in a simulation program?

The simulation box is stored as a cell matrix whose columns are the cell vectors
a, b and c. Rectangular cells (the `cubic` flag) take the per-axis fast path for
the minimum image; general triclinic cells go through fractional coordinates.

The box also owns the Ewald damping parameter `alpha` and the k-vector extent,
because both are a function of the cell shape and the Coulomb cutoff.
 */

use nalgebra::{Matrix3, Vector3};
use std::f64::consts::PI;

use crate::constants::DEFAULT_EWALD_PRECISION;
use crate::error::{Error, Result};

#[derive(Clone, Debug)]
pub struct Boxsize {
    pub cell: Matrix3<f64>,
    pub inverse_cell: Matrix3<f64>,
    pub volume: f64,
    pub cubic: bool,
    pub alpha: f64,
    pub kmax: [usize; 3],
    pub ewald_precision: f64,
}

impl Boxsize {
    /// Rectangular box with edge lengths a, b, c.
    pub fn cuboid(a: f64, b: f64, c: f64) -> Result<Self> {
        Self::from_cell(Matrix3::from_diagonal(&Vector3::new(a, b, c)))
    }

    pub fn from_cell(cell: Matrix3<f64>) -> Result<Self> {
        let inverse_cell = cell.try_inverse().ok_or_else(|| {
            Error::InvalidParameter("simulation cell matrix is singular".to_string())
        })?;
        let volume = cell.determinant().abs();
        let cubic = (0..3)
            .flat_map(|i| (0..3).map(move |j| (i, j)))
            .filter(|(i, j)| i != j)
            .all(|(i, j)| cell[(i, j)] == 0.0);

        Ok(Boxsize {
            cell,
            inverse_cell,
            volume,
            cubic,
            alpha: 0.0,
            kmax: [0, 0, 0],
            ewald_precision: DEFAULT_EWALD_PRECISION,
        })
    }

    /// Cell from edge lengths and angles (degrees), a along x, b in the xy plane.
    pub fn from_lengths_and_angles(
        a: f64,
        b: f64,
        c: f64,
        alpha_deg: f64,
        beta_deg: f64,
        gamma_deg: f64,
    ) -> Result<Self> {
        let (al, be, ga) = (
            alpha_deg.to_radians(),
            beta_deg.to_radians(),
            gamma_deg.to_radians(),
        );
        let tmp = (al.cos() - ga.cos() * be.cos()) / ga.sin();
        let cz_sq = 1.0 - be.cos().powi(2) - tmp * tmp;
        if cz_sq <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "cell angles ({alpha_deg}, {beta_deg}, {gamma_deg}) do not span a volume"
            )));
        }
        let ax = Vector3::new(a, 0.0, 0.0);
        let bx = Vector3::new(b * ga.cos(), b * ga.sin(), 0.0);
        let cx = Vector3::new(c * be.cos(), c * tmp, c * cz_sq.sqrt());
        let mut cell = Matrix3::from_columns(&[ax, bx, cx]);
        // snap round-off so 90 degree cells keep the fast path
        cell.iter_mut().for_each(|v| {
            if v.abs() < 1e-12 {
                *v = 0.0
            }
        });
        Self::from_cell(cell)
    }

    pub fn minimum_image(&self, dr: Vector3<f64>) -> Vector3<f64> {
        if self.cubic {
            let mut d = dr;
            for k in 0..3 {
                let box_l = self.cell[(k, k)];
                d[k] -= box_l * (d[k] / box_l).round();
            }
            d
        } else {
            let mut s = self.inverse_cell * dr;
            s.iter_mut().for_each(|x| *x -= x.round());
            self.cell * s
        }
    }

    pub fn fractional_to_cartesian(&self, s: Vector3<f64>) -> Vector3<f64> {
        self.cell * s
    }

    pub fn wrap(&self, pos: Vector3<f64>) -> Vector3<f64> {
        let mut s = self.inverse_cell * pos;
        s.iter_mut().for_each(|x| *x -= x.floor());
        self.cell * s
    }

    /// Distances between opposite faces of the cell.
    pub fn perpendicular_widths(&self) -> Vector3<f64> {
        let a = self.cell.column(0).into_owned();
        let b = self.cell.column(1).into_owned();
        let c = self.cell.column(2).into_owned();
        Vector3::new(
            self.volume / b.cross(&c).norm(),
            self.volume / c.cross(&a).norm(),
            self.volume / a.cross(&b).norm(),
        )
    }

    /// The minimum image convention only holds for cutoffs below half the narrowest width.
    pub fn check_cutoff(&self, cutoff: f64) -> Result<()> {
        let half_width = 0.5 * self.perpendicular_widths().min();
        if cutoff > half_width {
            return Err(Error::InvalidParameter(format!(
                "cutoff {cutoff} exceeds half the narrowest cell width ({half_width:.4})"
            )));
        }
        Ok(())
    }

    /// Reciprocal lattice vector 2 pi (h^-1)^T n for integer triple n.
    pub fn reciprocal(&self, n: [i32; 3]) -> Vector3<f64> {
        let n = Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64);
        2.0 * PI * self.inverse_cell.transpose() * n
    }

    /// Damping parameter and k-vector extent from the requested relative precision.
    pub fn set_ewald_parameters(&mut self, precision: f64, cutoff_coul: f64) {
        self.ewald_precision = precision;
        let tol = (precision * cutoff_coul).ln().abs().sqrt();
        self.alpha = (precision * cutoff_coul * tol).ln().abs().sqrt() / cutoff_coul;
        let tol1 = (-(precision * cutoff_coul * (2.0 * tol * self.alpha).powi(2)).ln()).sqrt();
        let widths = self.perpendicular_widths();
        for k in 0..3 {
            self.kmax[k] = (0.25 + widths[k] * self.alpha * tol1 / PI).round() as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cuboid_volume_and_flag() {
        let b = Boxsize::cuboid(10.0, 20.0, 30.0).unwrap();
        assert!(b.cubic);
        assert_relative_eq!(b.volume, 6000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_minimum_image_cubic() {
        let b = Boxsize::cuboid(10.0, 10.0, 10.0).unwrap();
        let d = b.minimum_image(Vector3::new(9.0, -6.0, 4.0));
        assert_relative_eq!(d, Vector3::new(-1.0, 4.0, 4.0), epsilon = 1e-12);
    }

    #[test]
    fn test_triclinic_path_matches_rectangular() {
        let rect = Boxsize::cuboid(12.0, 15.0, 18.0).unwrap();
        let mut general = rect.clone();
        general.cubic = false;
        let dr = Vector3::new(11.0, -9.5, 20.0);
        assert_relative_eq!(rect.minimum_image(dr), general.minimum_image(dr), epsilon = 1e-12);
    }

    #[test]
    fn test_right_angles_keep_fast_path() {
        let b = Boxsize::from_lengths_and_angles(25.0, 25.0, 25.0, 90.0, 90.0, 90.0).unwrap();
        assert!(b.cubic);
        let t = Boxsize::from_lengths_and_angles(25.0, 25.0, 25.0, 90.0, 90.0, 120.0).unwrap();
        assert!(!t.cubic);
        assert!(t.volume < b.volume);
    }

    #[test]
    fn test_singular_cell_rejected() {
        assert!(Boxsize::from_cell(Matrix3::zeros()).is_err());
    }

    #[test]
    fn test_cutoff_check() {
        let b = Boxsize::cuboid(20.0, 20.0, 20.0).unwrap();
        assert!(b.check_cutoff(10.0).is_ok());
        assert!(b.check_cutoff(12.0).is_err());
    }

    #[test]
    fn test_ewald_parameters() {
        let mut b = Boxsize::cuboid(30.0, 30.0, 30.0).unwrap();
        b.set_ewald_parameters(1e-6, 12.0);
        assert!(b.alpha > 0.2 && b.alpha < 0.35);
        assert!(b.kmax.iter().all(|&k| k == b.kmax[0] && k >= 1));
    }

    #[test]
    fn test_wrap_into_cell() {
        let b = Boxsize::cuboid(10.0, 10.0, 10.0).unwrap();
        let w = b.wrap(Vector3::new(-1.0, 12.0, 5.0));
        assert_relative_eq!(w, Vector3::new(9.0, 2.0, 5.0), epsilon = 1e-12);
    }
}
