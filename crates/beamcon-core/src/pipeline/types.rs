use std::path::PathBuf;

use crate::beam::Beam;
use crate::convolve::UnitPlan;
use crate::solve::SamplingWarning;

use super::config::Mode;

/// Pipeline processing stage, used for progress reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineStage {
    CollectingBeams,
    SolvingCommonBeam,
    CheckingSampling,
    Planning,
    InitialisingOutputs,
    Convolving,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CollectingBeams => write!(f, "Collecting beams"),
            Self::SolvingCommonBeam => write!(f, "Finding common beam"),
            Self::CheckingSampling => write!(f, "Checking sampling"),
            Self::Planning => write!(f, "Planning convolutions"),
            Self::InitialisingOutputs => write!(f, "Initialising outputs"),
            Self::Convolving => write!(f, "Convolving"),
        }
    }
}

/// Thread-safe progress reporting for the pipeline.
///
/// Implementors can use this to drive progress bars, logging, or any other
/// UI feedback. All methods have default no-op implementations.
pub trait ProgressReporter: Send + Sync {
    /// A new pipeline stage has started. `total_items` is the number of
    /// work items in this stage (e.g., unit count), if known.
    fn begin_stage(&self, _stage: PipelineStage, _total_items: Option<usize>) {}

    /// One work item within the current stage has completed.
    fn advance(&self, _items_done: usize) {}

    /// The current stage is finished.
    fn finish_stage(&self) {}
}

/// No-op progress reporter, used when the unreported entry points delegate.
pub(super) struct NoOpReporter;
impl ProgressReporter for NoOpReporter {}

/// What happened to one 2-D image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub original: Beam,
    pub plan: UnitPlan,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImagesReport {
    /// Solved common beam, `None` when a target was pinned.
    pub common: Option<Beam>,
    /// Resolution every output was convolved to.
    pub final_beam: Beam,
    pub warning: Option<SamplingWarning>,
    pub images: Vec<ImageReport>,
    pub dry_run: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CubeReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub convolution_log: PathBuf,
    pub channels: usize,
    pub blanked: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CubesReport {
    pub mode: Mode,
    /// Target beam of every channel index.
    pub commons: Vec<Beam>,
    pub warnings: Vec<SamplingWarning>,
    pub cubes: Vec<CubeReport>,
    pub dry_run: bool,
}
