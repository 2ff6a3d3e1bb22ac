use std::sync::Arc;

use anyhow::{Context, Result};
use beamcon_core::pipeline::{run_cubes_reported, Mode};
use clap::{Args, ValueEnum};
use tracing::debug;

use super::job::JobArgs;
use crate::progress::BarReporter;
use crate::summary;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ModeArg {
    /// One common beam per channel, shared by all cubes
    Natural,
    /// One common beam for every channel of every cube
    Total,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Natural => Mode::Natural,
            ModeArg::Total => Mode::Total,
        }
    }
}

#[derive(Args)]
pub struct CubesArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// How channels are matched
    #[arg(short, long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Comma-separated channels to blank in every cube
    #[arg(long, value_delimiter = ',')]
    pub mask: Vec<usize>,
}

pub fn run(args: &CubesArgs) -> Result<()> {
    let mut config = args.job.load()?;
    if let Some(mode) = args.mode {
        config.mode = mode.into();
    }
    if !args.mask.is_empty() {
        config.mask_channels = args.mask.clone();
    }

    debug!(?config, "Resolved job config");
    summary::print_job_summary("3-D cubes", &config, true);

    let reporter = Arc::new(BarReporter::new()?);
    let report = run_cubes_reported(&config, reporter).context("Failed to convolve cubes")?;

    summary::print_cubes_report(&report);
    Ok(())
}
