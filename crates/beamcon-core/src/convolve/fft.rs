use std::sync::Arc;

use ndarray::Array2;
use num_complex::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// "Same"-size linear convolution through zero-padded FFTs.
///
/// `kernel` must have odd dimensions; its centre maps onto each output pixel.
pub fn convolve_same_fft(data: &Array2<f64>, kernel: &Array2<f64>) -> Array2<f64> {
    let (h, w) = data.dim();
    let (kh, kw) = kernel.dim();
    let (ph, pw) = (h + kh - 1, w + kw - 1);

    let mut planner = FftPlanner::new();
    let row_fwd = planner.plan_fft_forward(pw);
    let col_fwd = planner.plan_fft_forward(ph);
    let row_inv = planner.plan_fft_inverse(pw);
    let col_inv = planner.plan_fft_inverse(ph);

    let mut image = padded(data, ph, pw);
    let mut psf = padded(kernel, ph, pw);
    transform(&mut image, &row_fwd, &col_fwd);
    transform(&mut psf, &row_fwd, &col_fwd);
    image.zip_mut_with(&psf, |a, b| *a *= *b);
    transform(&mut image, &row_inv, &col_inv);

    let scale = 1.0 / (ph * pw) as f64;
    let (ch, cw) = (kh / 2, kw / 2);
    Array2::from_shape_fn((h, w), |(r, c)| image[[r + ch, c + cw]].re * scale)
}

fn padded(data: &Array2<f64>, ph: usize, pw: usize) -> Array2<Complex<f64>> {
    let mut out = Array2::<Complex<f64>>::zeros((ph, pw));
    for ((r, c), &v) in data.indexed_iter() {
        out[[r, c]] = Complex::new(v, 0.0);
    }
    out
}

/// Row then column 1-D transforms, in place.
fn transform(work: &mut Array2<Complex<f64>>, row_fft: &Arc<dyn Fft<f64>>, col_fft: &Arc<dyn Fft<f64>>) {
    let (h, w) = work.dim();
    if h * w >= PARALLEL_PIXEL_THRESHOLD {
        let rows: Vec<Vec<Complex<f64>>> = (0..h)
            .into_par_iter()
            .map(|row| {
                let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| work[[row, c]]).collect();
                row_fft.process(&mut row_data);
                row_data
            })
            .collect();
        for (row, row_data) in rows.into_iter().enumerate() {
            for (col, val) in row_data.into_iter().enumerate() {
                work[[row, col]] = val;
            }
        }

        let cols: Vec<Vec<Complex<f64>>> = (0..w)
            .into_par_iter()
            .map(|col| {
                let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| work[[r, col]]).collect();
                col_fft.process(&mut col_data);
                col_data
            })
            .collect();
        for (col, col_data) in cols.into_iter().enumerate() {
            for (row, val) in col_data.into_iter().enumerate() {
                work[[row, col]] = val;
            }
        }
    } else {
        for row in 0..h {
            let mut row_data: Vec<Complex<f64>> = (0..w).map(|c| work[[row, c]]).collect();
            row_fft.process(&mut row_data);
            for (col, val) in row_data.into_iter().enumerate() {
                work[[row, col]] = val;
            }
        }
        for col in 0..w {
            let mut col_data: Vec<Complex<f64>> = (0..h).map(|r| work[[r, col]]).collect();
            col_fft.process(&mut col_data);
            for (row, val) in col_data.into_iter().enumerate() {
                work[[row, col]] = val;
            }
        }
    }
}
