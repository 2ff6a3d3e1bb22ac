use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::beam::Beam;
use crate::consts::DEFAULT_SUFFIX;
use crate::error::{BeamconError, Result};
use crate::solve::SolverParams;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    pub inputs: Vec<PathBuf>,
    /// Beams with a major axis above this (arcsec) are blanked.
    pub cutoff: Option<f64>,
    pub mode: Mode,
    /// Channels blanked in every cube.
    pub mask_channels: Vec<usize>,
    /// Compute and report beams without touching pixels.
    pub dry_run: bool,
    pub output: OutputConfig,
    pub target: TargetBeamConfig,
    pub solver: SolverParams,
    pub scheduler: Scheduler,
}

impl JobConfig {
    /// Checks shared by both job kinds.
    pub fn validate(&self) -> Result<()> {
        if self.inputs.is_empty() {
            return Err(BeamconError::Config("no input files given".into()));
        }
        if self.cutoff.is_some_and(|c| !(c > 0.0)) {
            return Err(BeamconError::Config("cutoff must be positive".into()));
        }
        let solver = &self.solver;
        if !(solver.tolerance > 0.0)
            || solver.epsilon < 0.0
            || solver.max_samples < 2
            || solver.max_iterations == 0
        {
            return Err(BeamconError::Config(format!(
                "invalid solver settings: tolerance {}, epsilon {}, samples {}, iterations {}",
                solver.tolerance, solver.epsilon, solver.max_samples, solver.max_iterations
            )));
        }
        if self.scheduler.count() == 0 {
            return Err(BeamconError::Config(
                "scheduler needs at least one worker or rank".into(),
            ));
        }
        self.target.resolve()?;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Defaults to the directory of each input.
    pub dir: Option<PathBuf>,
    pub prefix: Option<String>,
    /// Inserted before `.fits` in 2-D output names.
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            prefix: None,
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

/// User-pinned resolution, arcsec and degrees. All three or none.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetBeamConfig {
    pub bmaj: Option<f64>,
    pub bmin: Option<f64>,
    pub bpa: Option<f64>,
}

impl TargetBeamConfig {
    pub fn new(bmaj: f64, bmin: f64, bpa: f64) -> Self {
        Self {
            bmaj: Some(bmaj),
            bmin: Some(bmin),
            bpa: Some(bpa),
        }
    }

    pub fn resolve(&self) -> Result<Option<Beam>> {
        match (self.bmaj, self.bmin, self.bpa) {
            (None, None, None) => Ok(None),
            (Some(bmaj), Some(bmin), Some(bpa)) => {
                if !(bmaj > 0.0 && bmin > 0.0) || bmin > bmaj {
                    return Err(BeamconError::Config(format!(
                        "target beam needs 0 < BMIN <= BMAJ, got {bmaj} x {bmin}"
                    )));
                }
                Ok(Some(Beam::new(bmaj, bmin, bpa)))
            }
            _ => Err(BeamconError::Config(
                "please specify all target beam parameters (BMAJ, BMIN, BPA) or none".into(),
            )),
        }
    }
}

/// How cube channels are matched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One common beam per channel index, shared by all cubes.
    #[default]
    Natural,
    /// One common beam for every channel of every cube.
    Total,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Natural => "natural",
            Self::Total => "total",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheduler {
    /// Independent tasks on a thread pool.
    Workers(usize),
    /// Contiguous slices over a fixed rank group.
    Ranks(usize),
}

impl Scheduler {
    pub fn count(self) -> usize {
        match self {
            Self::Workers(n) | Self::Ranks(n) => n,
        }
    }

    /// Build from the two mutually exclusive CLI options.
    pub fn from_options(workers: Option<usize>, ranks: Option<usize>) -> Result<Self> {
        match (workers, ranks) {
            (Some(_), Some(_)) => Err(BeamconError::Config(
                "workers and ranks are mutually exclusive".into(),
            )),
            (_, Some(n)) => Ok(Self::Ranks(n)),
            (Some(n), None) => Ok(Self::Workers(n)),
            (None, None) => Ok(Self::default()),
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::Workers(1)
    }
}

impl fmt::Display for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Workers(n) => write!(f, "{n} worker(s)"),
            Self::Ranks(n) => write!(f, "{n} rank(s)"),
        }
    }
}
