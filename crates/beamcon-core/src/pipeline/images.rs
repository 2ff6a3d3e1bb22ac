//! Matching a set of 2-D images to one resolution.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::beam::{Beam, BeamSet, GridSpacing};
use crate::convolve::{execute_unit, plan_batch, validate_target, Unit, UnitPlan};
use crate::error::{BeamconError, Result};
use crate::io::fits::FitsImage;
use crate::io::fits_writer::{output_header, write_image};
use crate::io::naming::{image_output_name, output_dir};
use crate::parallel::{rank_range, run_pool, run_ranked, Communicator};
use crate::solve::{enforce_nyquist, solve_common_beam};

use super::config::{JobConfig, Scheduler};
use super::types::{ImageReport, ImagesReport, NoOpReporter, PipelineStage, ProgressReporter};
use super::nyquist_grid;

/// Beam and pixel grid of one input image.
#[derive(Clone, Debug, PartialEq)]
pub struct ImageInput {
    pub path: PathBuf,
    pub beam: Beam,
    pub grid: GridSpacing,
}

/// Read the beam and grid of every image.
pub fn collect_images(paths: &[PathBuf], reporter: &Arc<dyn ProgressReporter>) -> Result<Vec<ImageInput>> {
    reporter.begin_stage(PipelineStage::CollectingBeams, Some(paths.len()));
    let mut inputs = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        let image = FitsImage::open(path)?;
        if image.plane_count() != 1 {
            return Err(BeamconError::InvalidFits(format!(
                "{} has {} planes; use cube mode for spectral cubes",
                path.display(),
                image.plane_count()
            )));
        }
        let input = ImageInput {
            path: path.clone(),
            beam: image.beam()?,
            grid: image.grid()?,
        };
        info!(path = %path.display(), beam = %input.beam, "Collected beam");
        inputs.push(input);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();
    Ok(inputs)
}

/// Everything needed to convolve one image.
#[derive(Clone, Debug)]
struct ImageJob {
    unit: Unit,
    input: PathBuf,
    output: PathBuf,
    plan: UnitPlan,
}

struct ImagesPlan {
    report: ImagesReport,
    jobs: Vec<ImageJob>,
}

/// Run a 2-D job without progress reporting.
pub fn run_images(config: &JobConfig) -> Result<ImagesReport> {
    run_images_reported(config, Arc::new(NoOpReporter))
}

/// Run a 2-D job: find the common beam, then convolve every image to it.
///
/// Nothing is written until every image is known to be feasible.
pub fn run_images_reported(
    config: &JobConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<ImagesReport> {
    config.validate()?;

    let (plan, results) = match config.scheduler {
        Scheduler::Workers(workers) => {
            let plan = prepare(config, &reporter)?;
            let done = AtomicUsize::new(0);
            let results = if config.dry_run {
                Vec::new()
            } else {
                reporter.begin_stage(PipelineStage::Convolving, Some(plan.jobs.len()));
                let results = run_pool(workers, plan.jobs.iter().collect(), |_ctx, job| {
                    let result = convolve_image(job, &plan.report.final_beam);
                    reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                    result
                })?;
                reporter.finish_stage();
                plan.jobs
                    .iter()
                    .map(|job| job.unit.label.clone())
                    .zip(results)
                    .collect()
            };
            (Arc::new(plan), results)
        }
        Scheduler::Ranks(ranks) => {
            let done = AtomicUsize::new(0);
            let (plan, per_rank) = run_ranked(
                ranks,
                || {
                    let plan = prepare(config, &reporter)?;
                    if !config.dry_run {
                        reporter.begin_stage(PipelineStage::Convolving, Some(plan.jobs.len()));
                    }
                    Ok(plan)
                },
                |_ctx, comm, plan: &ImagesPlan| {
                    if config.dry_run {
                        return Vec::new();
                    }
                    rank_range(plan.jobs.len(), comm.size(), comm.rank())
                        .map(|i| {
                            let job = &plan.jobs[i];
                            let result = convolve_image(job, &plan.report.final_beam);
                            reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                            (job.unit.label.clone(), result)
                        })
                        .collect::<Vec<_>>()
                },
            )?;
            if !config.dry_run {
                reporter.finish_stage();
            }
            (plan, per_rank.into_iter().flatten().collect())
        }
    };

    collect_failures(results)?;
    Ok(plan.report.clone())
}

/// Turn per-unit results into one error listing every failure.
pub(super) fn collect_failures(results: Vec<(String, Result<()>)>) -> Result<()> {
    let failed: Vec<String> = results
        .into_iter()
        .filter_map(|(label, r)| r.err().map(|e| format!("{label}: {e}")))
        .collect();
    if failed.is_empty() {
        return Ok(());
    }
    for failure in &failed {
        warn!(%failure, "Unit failed");
    }
    Err(BeamconError::UnitsFailed {
        count: failed.len(),
        failed,
    })
}

fn prepare(config: &JobConfig, reporter: &Arc<dyn ProgressReporter>) -> Result<ImagesPlan> {
    let target = config.target.resolve()?;
    let inputs = collect_images(&config.inputs, reporter)?;
    let beams: BeamSet = inputs.iter().map(|i| i.beam).collect();
    let grid = nyquist_grid(inputs.iter().map(|i| &i.grid));

    let (common, final_beam, warning) = match target {
        Some(target) => {
            let labels: Vec<String> = inputs.iter().map(|i| i.path.display().to_string()).collect();
            validate_target(
                &target,
                labels.iter().map(String::as_str).zip(beams.iter()),
                config.cutoff,
            )?;
            reporter.begin_stage(PipelineStage::CheckingSampling, None);
            enforce_nyquist(&target, &beams, config.cutoff, &grid, Some(&target))?;
            reporter.finish_stage();
            info!(%target, "Using target beam");
            (None, target, None)
        }
        None => {
            reporter.begin_stage(PipelineStage::SolvingCommonBeam, None);
            let common = solve_common_beam(&beams, config.cutoff, &config.solver)?;
            reporter.finish_stage();
            reporter.begin_stage(PipelineStage::CheckingSampling, None);
            let outcome = enforce_nyquist(&common, &beams, config.cutoff, &grid, None)?;
            reporter.finish_stage();
            info!(beam = %outcome.beam, "Final beam");
            (Some(common), outcome.beam, outcome.warning)
        }
    };

    reporter.begin_stage(PipelineStage::Planning, Some(inputs.len()));
    let units: Vec<Unit> = inputs
        .iter()
        .map(|input| Unit {
            label: input.path.display().to_string(),
            beam: input.beam,
            grid: input.grid,
            target: final_beam,
            masked: false,
        })
        .collect();
    let plans = plan_batch(&units, config.cutoff)?;
    reporter.finish_stage();

    let outdir = config.output.dir.as_deref();
    let prefix = config.output.prefix.as_deref();
    let jobs: Vec<ImageJob> = inputs
        .iter()
        .zip(units)
        .zip(&plans)
        .map(|((input, unit), plan)| ImageJob {
            output: output_dir(&input.path, outdir)
                .join(image_output_name(&input.path, prefix, &config.output.suffix)),
            input: input.path.clone(),
            unit,
            plan: *plan,
        })
        .collect();

    if !config.dry_run {
        if let Some(dir) = outdir {
            std::fs::create_dir_all(dir)?;
        }
    }

    let images = jobs
        .iter()
        .map(|job| ImageReport {
            input: job.input.clone(),
            output: job.output.clone(),
            original: job.unit.beam,
            plan: job.plan,
        })
        .collect();
    Ok(ImagesPlan {
        report: ImagesReport {
            common,
            final_beam,
            warning,
            images,
            dry_run: config.dry_run,
        },
        jobs,
    })
}

fn convolve_image(job: &ImageJob, final_beam: &Beam) -> Result<()> {
    let image = FitsImage::open(&job.input)?;
    let plane = image.read_plane(0)?;
    let convolved = execute_unit(&plane, &job.unit.grid, &job.plan);
    let header = output_header(&image.header, final_beam)?;
    write_image(&job.output, &header, &convolved)?;
    info!(output = %job.output.display(), "Wrote convolved image");
    Ok(())
}
