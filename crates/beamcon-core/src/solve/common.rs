use nalgebra::Matrix2;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::beam::{ceil_to, shape_encloses, shape_matrix, Beam, BeamSet};
use crate::consts::{
    AXIS_PRECISION, DEFAULT_EPSILON, DEFAULT_MAX_SAMPLES, DEFAULT_TOLERANCE, EPSILON_GROWTH,
    MAX_EPSILON, MVEE_MAX_ITERATIONS, SOLVER_RETRY_TOLERANCE_DIVISOR,
};
use crate::error::{BeamconError, Result};

use super::mvee::{khachiyan, sample_boundary};

const MAX_ROUNDING_STEPS: usize = 10;

/// Knobs of the common-beam search.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverParams {
    /// Convergence tolerance of the first attempt.
    pub tolerance: f64,
    /// Initial fractional inflation of the fitted ellipse.
    pub epsilon: f64,
    /// Boundary samples per beam.
    pub max_samples: usize,
    /// Iteration cap of each enclosing-ellipse fit.
    pub max_iterations: usize,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            epsilon: DEFAULT_EPSILON,
            max_samples: DEFAULT_MAX_SAMPLES,
            max_iterations: MVEE_MAX_ITERATIONS,
        }
    }
}

impl SolverParams {
    /// Tolerances tried in order before giving up.
    pub fn attempt_tolerances(&self) -> [f64; 2] {
        [
            self.tolerance,
            self.tolerance / SOLVER_RETRY_TOLERANCE_DIVISOR,
        ]
    }
}

/// Smallest beam every unmasked beam of `beams` can be deconvolved from,
/// rounded up to 0.1 arcsec and 0.01 deg.
pub fn solve_common_beam(
    beams: &BeamSet,
    cutoff: Option<f64>,
    params: &SolverParams,
) -> Result<Beam> {
    let mut candidates: Vec<Beam> = beams.unmasked(cutoff).into_iter().map(|(_, b)| b).collect();
    if candidates.is_empty() {
        return Err(BeamconError::NoUnmaskedBeams);
    }

    // Largest first, then drop every beam that an earlier one already covers.
    candidates.sort_by(|a, b| b.area().total_cmp(&a.area()));
    let mut hull: Vec<Beam> = Vec::with_capacity(candidates.len());
    for beam in candidates {
        if !hull.iter().any(|kept| kept.encloses(&beam)) {
            hull.push(beam);
        }
    }
    debug!(
        unmasked = beams.unmasked(cutoff).len(),
        boundary = hull.len(),
        "Pruned enclosed beams"
    );

    if let [only] = hull.as_slice() {
        let common = round_enclosing(only, &hull);
        info!(%common, "Largest beam encloses all others");
        return Ok(common);
    }

    let attempts = params.attempt_tolerances();
    for (attempt, &tolerance) in attempts.iter().enumerate() {
        match fit_enclosing(&hull, tolerance, params) {
            Some(beam) => {
                let common = round_enclosing(&beam, &hull);
                info!(%common, attempt = attempt + 1, tolerance, "Common beam found");
                return Ok(common);
            }
            None => warn!(
                attempt = attempt + 1,
                tolerance, "Common beam search did not converge"
            ),
        }
    }

    Err(BeamconError::SolverNonConvergence {
        attempts: attempts.len(),
        tolerance: attempts[attempts.len() - 1],
    })
}

/// Round up to the output precision, then keep stepping the axes by one
/// precision unit while the rounded position angle leaves a beam outside.
fn round_enclosing(beam: &Beam, hull: &[Beam]) -> Beam {
    let step = 10f64.powi(-AXIS_PRECISION);
    let mut rounded = beam.ceil_to_precision();
    for _ in 0..MAX_ROUNDING_STEPS {
        if hull.iter().all(|b| rounded.encloses(b)) {
            break;
        }
        rounded = Beam {
            major: ceil_to(rounded.major + step, AXIS_PRECISION),
            minor: ceil_to(rounded.minor + step, AXIS_PRECISION),
            ..rounded
        };
    }
    rounded
}

/// One attempt: fit, then inflate until every beam is enclosed.
fn fit_enclosing(hull: &[Beam], tolerance: f64, params: &SolverParams) -> Option<Beam> {
    let points: Vec<_> = hull
        .iter()
        .flat_map(|b| sample_boundary(b, params.max_samples))
        .collect();
    let fit = khachiyan(&points, tolerance, params.max_iterations)?;
    if !fit.converged {
        return None;
    }
    let base = Beam::from_shape_matrix(&fit.shape);
    let shapes: Vec<Matrix2<f64>> = hull.iter().map(shape_matrix).collect();

    let mut epsilon = params.epsilon.max(0.0);
    loop {
        let inflated = Beam {
            major: base.major * (1.0 + epsilon),
            minor: base.minor * (1.0 + epsilon),
            pa: base.pa,
        };
        let outer = shape_matrix(&inflated);
        if shapes.iter().all(|s| shape_encloses(&outer, s)) {
            debug!(epsilon, "Enclosing ellipse accepted");
            return Some(inflated);
        }
        if epsilon >= MAX_EPSILON {
            return None;
        }
        epsilon = if epsilon == 0.0 {
            params.epsilon.max(DEFAULT_EPSILON)
        } else {
            (epsilon * EPSILON_GROWTH).min(MAX_EPSILON)
        };
    }
}
