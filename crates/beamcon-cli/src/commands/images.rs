use std::sync::Arc;

use anyhow::{Context, Result};
use beamcon_core::pipeline::run_images_reported;
use clap::Args;
use tracing::debug;

use super::job::JobArgs;
use crate::progress::BarReporter;
use crate::summary;

#[derive(Args)]
pub struct ImagesArgs {
    #[command(flatten)]
    pub job: JobArgs,

    /// Suffix inserted before `.fits` in output names
    #[arg(short, long)]
    pub suffix: Option<String>,
}

pub fn run(args: &ImagesArgs) -> Result<()> {
    let mut config = args.job.load()?;
    if let Some(ref suffix) = args.suffix {
        config.output.suffix = suffix.clone();
    }

    debug!(?config, "Resolved job config");
    summary::print_job_summary("2-D images", &config, false);

    let reporter = Arc::new(BarReporter::new()?);
    let report =
        run_images_reported(&config, reporter).context("Failed to convolve images")?;

    summary::print_images_report(&report);
    Ok(())
}
