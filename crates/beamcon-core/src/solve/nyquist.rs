use std::fmt;

use tracing::{debug, warn};

use crate::beam::{ceil_to, Beam, BeamSet, GridSpacing};
use crate::consts::NYQUIST_MIN_SAMPLES;
use crate::error::{BeamconError, Result};

/// Non-fatal outcome of the sampling check.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SamplingWarning {
    /// The common beam was raised so the worst kernel spans two pixels.
    CommonRaisedToNyquist { common: Beam, nyquist: Beam },
}

impl fmt::Display for SamplingWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommonRaisedToNyquist { common, nyquist } => write!(
                f,
                "common beam {common} will be undersampled, raised to Nyquist beam {nyquist}"
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NyquistOutcome {
    /// Beam to convolve to.
    pub beam: Beam,
    pub warning: Option<SamplingWarning>,
}

/// Make sure no convolving kernel is narrower than two pixels along its
/// minor axis.
///
/// Only the single worst-sampled beam is corrected. When `target` is the
/// user-pinned beam, a correction that would have to grow it is an error.
pub fn enforce_nyquist(
    common: &Beam,
    beams: &BeamSet,
    cutoff: Option<f64>,
    grid: &GridSpacing,
    target: Option<&Beam>,
) -> Result<NyquistOutcome> {
    let unchanged = NyquistOutcome {
        beam: *common,
        warning: None,
    };

    let mut worst: Option<(f64, Beam, Beam)> = None;
    for (_, beam) in beams.unmasked(cutoff) {
        // Infeasible pairs are reported by the planner.
        let Ok(conv) = common.deconvolve(&beam) else {
            continue;
        };
        if conv.is_pointlike() {
            continue;
        }
        let samples = conv.minor / grid.dy;
        if worst.is_none_or(|(s, _, _)| samples < s) {
            worst = Some((samples, beam, conv));
        }
    }

    let Some((samples, original, conv)) = worst else {
        return Ok(unchanged);
    };
    debug!(samples, beam = %original, "Worst sampled convolving beam");
    if samples >= NYQUIST_MIN_SAMPLES {
        return Ok(unchanged);
    }

    let corrected_minor = if samples > 0.0 {
        conv.minor * ceil_to(NYQUIST_MIN_SAMPLES / samples, 1)
    } else {
        NYQUIST_MIN_SAMPLES * grid.dy
    };
    let corrected = if corrected_minor > conv.major {
        Beam::new(corrected_minor, conv.major, 0.0)
    } else {
        Beam::new(conv.major, corrected_minor, conv.pa)
    };
    let nyquist = original.convolve(&corrected).ceil_to_precision();

    if let Some(target) = target {
        if nyquist.exceeds(target) {
            warn!(%target, %nyquist, "Target beam will be undersampled");
            return Err(BeamconError::TargetUndersampled {
                target: *target,
                nyquist,
            });
        }
        return Ok(unchanged);
    }

    if nyquist.exceeds(common) {
        let warning = SamplingWarning::CommonRaisedToNyquist {
            common: *common,
            nyquist,
        };
        warn!("{warning}");
        return Ok(NyquistOutcome {
            beam: nyquist,
            warning: Some(warning),
        });
    }
    Ok(unchanged)
}
