use nalgebra::Matrix2;

use crate::consts::BEAM_COMPARE_RTOL;
use crate::error::{BeamconError, Result};

use super::{normalize_pa, Beam};

/// FWHM² shape matrix of a beam in sky-pixel orientation (x east-negative, y north).
///
/// The major axis points along `(-sin pa, cos pa)`. Convolution of Gaussians
/// adds these matrices; deconvolution subtracts them.
pub fn shape_matrix(beam: &Beam) -> Matrix2<f64> {
    let (sin, cos) = beam.pa.to_radians().sin_cos();
    let a2 = beam.major * beam.major;
    let b2 = beam.minor * beam.minor;
    let xx = a2 * sin * sin + b2 * cos * cos;
    let yy = a2 * cos * cos + b2 * sin * sin;
    let xy = (b2 - a2) * sin * cos;
    Matrix2::new(xx, xy, xy, yy)
}

/// Eigenvalues (descending) of a symmetric 2×2 matrix.
fn eigenvalues(m: &Matrix2<f64>) -> (f64, f64) {
    let values = m.symmetric_eigenvalues();
    (values[0].max(values[1]), values[0].min(values[1]))
}

/// `b` fits inside `a` (their difference is positive semi-definite).
pub(crate) fn shape_encloses(a: &Matrix2<f64>, b: &Matrix2<f64>) -> bool {
    let (_, smallest) = eigenvalues(&(a - b));
    smallest >= -tolerance(a, b)
}

/// Tolerance on eigenvalues relative to the larger of two shape matrices.
fn tolerance(a: &Matrix2<f64>, b: &Matrix2<f64>) -> f64 {
    BEAM_COMPARE_RTOL * a.trace().abs().max(b.trace().abs()).max(f64::MIN_POSITIVE)
}

/// Recover a beam from a positive semi-definite shape matrix.
///
/// Eigenvalues within `tol` of zero are clamped to exactly zero.
pub(super) fn beam_from_shape(m: &Matrix2<f64>, tol: f64) -> Beam {
    let (l1, l2) = eigenvalues(m);
    let clamp = |l: f64| if l <= tol { 0.0 } else { l.sqrt() };
    let major = clamp(l1);
    let minor = clamp(l2);
    if major == 0.0 {
        return Beam::null();
    }
    let xx = m[(0, 0)];
    let yy = m[(1, 1)];
    let xy = m[(0, 1)];
    let pa = if (l1 - l2).abs() <= tol {
        0.0
    } else {
        // Major eigenvector angle from +x, then rotate so 0 points north.
        let phi = 0.5 * (2.0 * xy).atan2(xx - yy);
        phi.to_degrees() - 90.0
    };
    Beam {
        major,
        minor,
        pa: normalize_pa(pa),
    }
}

impl Beam {
    /// Beam whose shape matrix is `m`, which must be positive semi-definite.
    pub fn from_shape_matrix(m: &Matrix2<f64>) -> Beam {
        beam_from_shape(m, 0.0)
    }

    /// The beam obtained by convolving `self` with `other`.
    pub fn convolve(&self, other: &Beam) -> Beam {
        if self.is_undefined() || other.is_undefined() {
            return Beam::undefined();
        }
        let a = shape_matrix(self);
        let b = shape_matrix(other);
        beam_from_shape(&(a + b), 0.0)
    }

    /// The beam that, convolved with `other`, yields `self`.
    ///
    /// Fails when `other` is wider than `self` along any direction. A
    /// point-like (all-zero) result means the two beams are equal.
    pub fn deconvolve(&self, other: &Beam) -> Result<Beam> {
        if self.is_undefined() || other.is_undefined() {
            return Ok(Beam::undefined());
        }
        let a = shape_matrix(self);
        let b = shape_matrix(other);
        let tol = tolerance(&a, &b);
        let diff = a - b;
        let (_, smallest) = eigenvalues(&diff);
        if smallest < -tol {
            return Err(BeamconError::Deconvolution {
                target: *self,
                beam: *other,
            });
        }
        Ok(beam_from_shape(&diff, tol))
    }

    /// `other` can be deconvolved from `self`.
    pub fn encloses(&self, other: &Beam) -> bool {
        if self.is_undefined() || other.is_undefined() {
            return false;
        }
        shape_encloses(&shape_matrix(self), &shape_matrix(other))
    }
}
