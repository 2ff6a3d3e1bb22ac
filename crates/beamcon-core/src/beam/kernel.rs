use ndarray::Array2;

use crate::consts::KERNEL_HALF_WIDTH_SIGMA;

use super::{shape_matrix, Beam, GridSpacing};

/// FWHM of a Gaussian in units of its standard deviation, `2 sqrt(2 ln 2)`.
pub const FWHM_PER_SIGMA: f64 = 2.354_820_045_030_949_3;

/// Rasterise `beam` on the pixel grid as an elliptical Gaussian with peak 1.
///
/// The kernel has odd dimensions with the peak on the central pixel, so it
/// can be used directly for "same"-size convolution. Rows run along y
/// (north), columns along x.
pub fn beam_kernel(beam: &Beam, grid: &GridSpacing) -> Array2<f64> {
    let sigma_major = beam.major / FWHM_PER_SIGMA;
    let rx = ((KERNEL_HALF_WIDTH_SIGMA * sigma_major / grid.dx).ceil() as usize).max(1);
    let ry = ((KERNEL_HALF_WIDTH_SIGMA * sigma_major / grid.dy).ceil() as usize).max(1);

    // A zero-width minor axis would make the shape matrix singular; keep it
    // just under a pixel so the kernel degenerates to a line.
    let floor = 1e-3 * grid.dx.min(grid.dy);
    let sampled = Beam {
        minor: beam.minor.max(floor),
        major: beam.major.max(floor),
        ..*beam
    };
    let m = shape_matrix(&sampled);
    let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    let inv_xx = m[(1, 1)] / det;
    let inv_yy = m[(0, 0)] / det;
    let inv_xy = -m[(0, 1)] / det;
    let scale = 4.0 * std::f64::consts::LN_2;

    let mut kernel = Array2::from_shape_fn((2 * ry + 1, 2 * rx + 1), |(row, col)| {
        let x = (col as f64 - rx as f64) * grid.dx;
        let y = (row as f64 - ry as f64) * grid.dy;
        let q = inv_xx * x * x + 2.0 * inv_xy * x * y + inv_yy * y * y;
        (-scale * q).exp()
    });

    let peak = kernel.iter().copied().fold(0.0f64, f64::max);
    if peak > 0.0 {
        kernel.mapv_inplace(|v| v / peak);
    }
    kernel
}
