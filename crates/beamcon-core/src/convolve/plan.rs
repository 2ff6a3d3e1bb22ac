use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::beam::factor::gauss_factor;
use crate::beam::{is_masked, Beam, GridSpacing};
use crate::error::{BeamconError, Result};

/// One schedulable piece of work: a 2-D image or one channel of a cube.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    /// Human-readable name used in failure reports, e.g. `cube.fits:chan 3`.
    pub label: String,
    /// Resolution of the source plane.
    pub beam: Beam,
    pub grid: GridSpacing,
    /// Resolution the plane is convolved to.
    pub target: Beam,
    /// Blanked regardless of its beam (channel mask list).
    pub masked: bool,
}

/// What the executor does with one unit.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum UnitPlan {
    /// Output plane is all NaN.
    Blank,
    /// Convolve with `beam` and multiply by `factor`.
    Convolve { beam: Beam, factor: f64 },
}

impl UnitPlan {
    pub fn is_blank(&self) -> bool {
        matches!(self, Self::Blank)
    }

    /// Convolving beam and factor, `None` for blanked units.
    pub fn convolution(&self) -> Option<(Beam, f64)> {
        match *self {
            Self::Blank => None,
            Self::Convolve { beam, factor } => Some((beam, factor)),
        }
    }
}

/// Convolving beam and flux factor taking `beam` to `target`.
pub fn plan_unit(
    beam: &Beam,
    grid: &GridSpacing,
    target: &Beam,
    cutoff: Option<f64>,
) -> Result<UnitPlan> {
    if is_masked(beam, cutoff) || target.is_undefined() {
        return Ok(UnitPlan::Blank);
    }
    let conv = target.deconvolve(beam)?;
    let factor = gauss_factor(&conv, beam, grid).factor;
    Ok(UnitPlan::Convolve { beam: conv, factor })
}

/// Check that `target` can be reached from every unmasked beam.
///
/// All failing labels are collected before returning.
pub fn validate_target<'a, I>(target: &Beam, beams: I, cutoff: Option<f64>) -> Result<()>
where
    I: IntoIterator<Item = (&'a str, &'a Beam)>,
{
    let failed: Vec<String> = beams
        .into_iter()
        .filter(|(_, beam)| !is_masked(beam, cutoff))
        .filter(|(_, beam)| !target.encloses(beam))
        .map(|(label, _)| label.to_string())
        .collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(BeamconError::Infeasible { failed })
    }
}

/// Plan every unit, failing with the complete list of infeasible units.
pub fn plan_batch(units: &[Unit], cutoff: Option<f64>) -> Result<Vec<UnitPlan>> {
    let mut plans = Vec::with_capacity(units.len());
    let mut failed = Vec::new();
    for unit in units {
        if unit.masked {
            plans.push(UnitPlan::Blank);
            continue;
        }
        match plan_unit(&unit.beam, &unit.grid, &unit.target, cutoff) {
            Ok(plan) => {
                debug!(unit = %unit.label, ?plan, "Planned unit");
                plans.push(plan);
            }
            Err(BeamconError::Deconvolution { .. }) => failed.push(unit.label.clone()),
            Err(e) => return Err(e),
        }
    }
    if failed.is_empty() {
        Ok(plans)
    } else {
        Err(BeamconError::Infeasible { failed })
    }
}
