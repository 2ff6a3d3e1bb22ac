use std::path::PathBuf;

use anyhow::{Context, Result};
use beamcon_core::pipeline::{JobConfig, Scheduler, TargetBeamConfig};
use clap::Args;

/// Options shared by the 2-D and 3-D commands.
#[derive(Args, Debug)]
pub struct JobArgs {
    /// Input FITS files
    pub files: Vec<PathBuf>,

    /// Job config file (TOML); command-line options override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Prefix added to output file names
    #[arg(short, long)]
    pub prefix: Option<String>,

    /// Output directory (defaults to the directory of each input)
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Compute the common beam and plans without writing images
    #[arg(short, long)]
    pub dry_run: bool,

    /// Target beam major axis FWHM in arcsec
    #[arg(long)]
    pub bmaj: Option<f64>,

    /// Target beam minor axis FWHM in arcsec
    #[arg(long)]
    pub bmin: Option<f64>,

    /// Target beam position angle in degrees
    #[arg(long)]
    pub bpa: Option<f64>,

    /// Blank inputs whose beam major axis exceeds this (arcsec)
    #[arg(short, long)]
    pub cutoff: Option<f64>,

    /// Convergence tolerance of the common beam search
    #[arg(short, long)]
    pub tolerance: Option<f64>,

    /// Initial inflation of the enclosing ellipse
    #[arg(short, long)]
    pub epsilon: Option<f64>,

    /// Boundary samples taken per beam
    #[arg(short = 'n', long)]
    pub nsamps: Option<usize>,

    /// Iteration cap of each enclosing-ellipse fit
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Number of worker threads for independent tasks
    #[arg(long, conflicts_with = "ranks")]
    pub workers: Option<usize>,

    /// Number of ranks splitting the work into contiguous slices
    #[arg(long)]
    pub ranks: Option<usize>,
}

impl JobArgs {
    /// Config file (or defaults) with command-line options applied on top.
    pub fn load(&self) -> Result<JobConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Invalid job config {}", path.display()))?
            }
            None => JobConfig::default(),
        };

        if !self.files.is_empty() {
            config.inputs = self.files.clone();
        }
        if self.prefix.is_some() {
            config.output.prefix = self.prefix.clone();
        }
        if self.outdir.is_some() {
            config.output.dir = self.outdir.clone();
        }
        config.dry_run |= self.dry_run;
        if self.bmaj.is_some() || self.bmin.is_some() || self.bpa.is_some() {
            config.target = TargetBeamConfig {
                bmaj: self.bmaj,
                bmin: self.bmin,
                bpa: self.bpa,
            };
        }
        if self.cutoff.is_some() {
            config.cutoff = self.cutoff;
        }
        if let Some(tolerance) = self.tolerance {
            config.solver.tolerance = tolerance;
        }
        if let Some(epsilon) = self.epsilon {
            config.solver.epsilon = epsilon;
        }
        if let Some(samples) = self.nsamps {
            config.solver.max_samples = samples;
        }
        if let Some(iterations) = self.max_iter {
            config.solver.max_iterations = iterations;
        }
        if self.workers.is_some() || self.ranks.is_some() {
            config.scheduler = Scheduler::from_options(self.workers, self.ranks)?;
        }
        Ok(config)
    }
}
