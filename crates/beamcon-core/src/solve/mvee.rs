//! Minimum-volume enclosing ellipse of a centred point cloud.

use nalgebra::{Matrix2, Vector2};
use tracing::debug;

use crate::beam::Beam;

/// Points on the FWHM ellipse of `beam`, in symmetric pairs `±p`.
///
/// `count` is rounded up to an even number of at least four.
pub fn sample_boundary(beam: &Beam, count: usize) -> Vec<Vector2<f64>> {
    let half = (count.div_ceil(2)).max(2);
    let (sin, cos) = beam.pa.to_radians().sin_cos();
    let major_dir = Vector2::new(-sin, cos);
    let minor_dir = Vector2::new(cos, sin);
    let mut points = Vec::with_capacity(2 * half);
    for k in 0..half {
        let t = std::f64::consts::PI * k as f64 / half as f64;
        let p = major_dir * (beam.major * t.cos()) + minor_dir * (beam.minor * t.sin());
        points.push(p);
        points.push(-p);
    }
    points
}

/// Result of one enclosing-ellipse fit.
#[derive(Clone, Copy, Debug)]
pub struct Mvee {
    /// Shape matrix of the ellipse, `{x : xᵀ shape⁻¹ x ≤ 1}`.
    pub shape: Matrix2<f64>,
    pub iterations: usize,
    pub converged: bool,
}

/// Khachiyan's algorithm for the ellipse centred on the origin.
///
/// Iterates until the largest step changes the weights by less than
/// `tolerance` (Euclidean norm) or `max_iterations` is hit.
pub fn khachiyan(points: &[Vector2<f64>], tolerance: f64, max_iterations: usize) -> Option<Mvee> {
    if points.is_empty() {
        return None;
    }
    let n = points.len();
    let d = 2.0;
    let mut weights = vec![1.0 / n as f64; n];
    let mut converged = false;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;
        let scatter = scatter(points, &weights);
        let inv = scatter.try_inverse()?;

        let (j, m_max) = points
            .iter()
            .map(|p| p.dot(&(inv * p)))
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, m)| {
                if m > best.1 {
                    (i, m)
                } else {
                    best
                }
            });
        if m_max <= d {
            converged = true;
            break;
        }

        let step = (m_max - d) / (d * (m_max - 1.0));
        // ‖u_new - u‖ = step · ‖e_j - u‖.
        let dist_sq: f64 = weights
            .iter()
            .enumerate()
            .map(|(i, &w)| {
                let e = if i == j { 1.0 } else { 0.0 };
                (e - w) * (e - w)
            })
            .sum();
        for w in weights.iter_mut() {
            *w *= 1.0 - step;
        }
        weights[j] += step;

        if step * dist_sq.sqrt() < tolerance {
            converged = true;
            break;
        }
    }

    debug!(iterations, converged, points = n, "Enclosing ellipse fit");
    Some(Mvee {
        shape: scatter(points, &weights) * d,
        iterations,
        converged,
    })
}

fn scatter(points: &[Vector2<f64>], weights: &[f64]) -> Matrix2<f64> {
    points
        .iter()
        .zip(weights)
        .fold(Matrix2::zeros(), |acc, (p, &w)| acc + p * p.transpose() * w)
}
