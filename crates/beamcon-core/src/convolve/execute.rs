use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::beam::kernel::beam_kernel;
use crate::beam::GridSpacing;
use crate::consts::{FFT_KERNEL_THRESHOLD, PARALLEL_PIXEL_THRESHOLD};

use super::fft::convolve_same_fft;
use super::plan::UnitPlan;

/// Apply a unit plan to one plane, returning a plane of the same shape.
pub fn execute_unit(plane: &Array2<f32>, grid: &GridSpacing, plan: &UnitPlan) -> Array2<f32> {
    let (beam, factor) = match *plan {
        UnitPlan::Blank => return Array2::from_elem(plane.dim(), f32::NAN),
        UnitPlan::Convolve { beam, factor } => (beam, factor),
    };
    if plane.iter().all(|v| v.is_nan()) {
        return plane.clone();
    }
    if beam.is_pointlike() {
        return plane.mapv(|v| (v as f64 * factor) as f32);
    }

    let kernel = beam_kernel(&beam, grid);
    let data = plane.mapv(|v| if v.is_nan() { 0.0 } else { v as f64 });
    let convolved = if kernel.len() > FFT_KERNEL_THRESHOLD {
        debug!(kernel = ?kernel.dim(), "FFT convolution");
        convolve_same_fft(&data, &kernel)
    } else {
        convolve_same_direct(&data, &kernel)
    };

    let mut out = convolved.mapv(|v| (v * factor) as f32);
    out.zip_mut_with(plane, |o, &src| {
        if src.is_nan() {
            *o = f32::NAN;
        }
    });
    out
}

/// "Same"-size spatial convolution with zeros outside the plane.
pub fn convolve_same_direct(data: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (h, w) = data.dim();
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let rows: Vec<Vec<f64>> = (0..h)
            .into_par_iter()
            .map(|row| convolve_row(data, kernel, row))
            .collect();
        let mut result = Array2::<f64>::zeros((h, w));
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }
        result
    } else {
        let mut result = Array2::<f64>::zeros((h, w));
        for row in 0..h {
            for (col, val) in convolve_row(data, kernel, row).into_iter().enumerate() {
                result[[row, col]] = val;
            }
        }
        result
    }
}

fn convolve_row(data: &Array2<f64>, kernel: &Array2<f64>, row: usize) -> Vec<f64> {
    let (h, w) = data.dim();
    let (kh, kw) = kernel.dim();
    let (ch, cw) = ((kh / 2) as isize, (kw / 2) as isize);
    (0..w)
        .map(|col| {
            let mut sum = 0.0;
            for ki in 0..kh {
                let src_row = row as isize + ki as isize - ch;
                if src_row < 0 || src_row >= h as isize {
                    continue;
                }
                for kj in 0..kw {
                    let src_col = col as isize + kj as isize - cw;
                    if src_col < 0 || src_col >= w as isize {
                        continue;
                    }
                    // Flipped kernel index: true convolution, not correlation.
                    sum += data[[src_row as usize, src_col as usize]]
                        * kernel[[kh - 1 - ki, kw - 1 - kj]];
                }
            }
            sum
        })
        .collect()
}
