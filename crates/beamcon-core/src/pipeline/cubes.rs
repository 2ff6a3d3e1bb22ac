//! Matching spectral cubes channel by channel.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::beam::{is_masked, Beam, BeamSet, GridSpacing};
use crate::convolve::{execute_unit, plan_batch, validate_target, Unit, UnitPlan};
use crate::error::{BeamconError, Result};
use crate::io::beamlog::{
    beamlog_path, convolve_log_path, read_beamlog, read_cube_stats, stats_path,
    write_convolution_log, ConvolutionLogRow,
};
use crate::io::fits::{FitsImage, HeaderValue};
use crate::io::fits_writer::{initialise_cube, output_header, OutputLayout};
use crate::io::naming::{cube_output_name, output_dir};
use crate::parallel::{rank_range, run_ranked, Communicator};
use crate::solve::{enforce_nyquist, solve_common_beam, SamplingWarning};

use super::config::{JobConfig, Mode};
use super::images::collect_failures;
use super::nyquist_grid;
use super::types::{CubeReport, CubesReport, NoOpReporter, PipelineStage, ProgressReporter};

/// Per-channel beams and grid of one input cube.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeInput {
    pub path: PathBuf,
    pub beamlog: PathBuf,
    pub beams: BeamSet,
    pub grid: GridSpacing,
}

impl CubeInput {
    pub fn channels(&self) -> usize {
        self.beams.len()
    }
}

/// Read the per-channel beams of one cube.
///
/// Beams come from `beamlog.<name>.txt` beside the cube; without a log the
/// header beam is used for every channel.
pub fn collect_cube(path: &Path) -> Result<CubeInput> {
    let image = FitsImage::open(path)?;
    let nchan = image.plane_count();
    let beamlog = beamlog_path(path);

    let beams = if beamlog.exists() {
        let beams = read_beamlog(&beamlog)?;
        if beams.len() != nchan {
            return Err(BeamconError::InvalidBeamLog {
                path: beamlog,
                reason: format!("{} rows for a cube of {} channels", beams.len(), nchan),
            });
        }
        if let Some(stats) = read_cube_stats(&stats_path(&beamlog))? {
            if stats.len() != nchan {
                return Err(BeamconError::InvalidBeamLog {
                    path: stats_path(&beamlog),
                    reason: format!("{} rows for a cube of {} channels", stats.len(), nchan),
                });
            }
            debug!(path = %path.display(), columns = stats.columns.len(), "Read cube statistics");
        }
        beams
    } else {
        let beam = image.beam()?;
        warn!(
            path = %path.display(),
            beamlog = %beamlog.display(),
            "No beam log found, using the header beam for every channel"
        );
        vec![beam; nchan]
    };

    info!(path = %path.display(), channels = nchan, "Collected beams");
    Ok(CubeInput {
        path: path.to_path_buf(),
        beamlog,
        beams: BeamSet::new(beams),
        grid: image.grid()?,
    })
}

pub fn collect_cubes(paths: &[PathBuf], reporter: &Arc<dyn ProgressReporter>) -> Result<Vec<CubeInput>> {
    reporter.begin_stage(PipelineStage::CollectingBeams, Some(paths.len()));
    let mut cubes = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        cubes.push(collect_cube(path)?);
        reporter.advance(i + 1);
    }
    reporter.finish_stage();

    let counts: Vec<usize> = cubes.iter().map(CubeInput::channels).collect();
    if counts.windows(2).any(|w| w[0] != w[1]) {
        return Err(BeamconError::ChannelMismatch { counts });
    }
    Ok(cubes)
}

/// Per-cube blanking flags: cutoff, degenerate beams, and the channel list.
fn channel_masks(cubes: &[CubeInput], config: &JobConfig) -> Result<Vec<Vec<bool>>> {
    let nchan = cubes.first().map_or(0, CubeInput::channels);
    if let Some(&bad) = config.mask_channels.iter().find(|&&c| c >= nchan) {
        return Err(BeamconError::Config(format!(
            "masked channel {bad} is out of range (cubes have {nchan} channels)"
        )));
    }
    Ok(cubes
        .iter()
        .map(|cube| {
            cube.beams
                .iter()
                .enumerate()
                .map(|(chan, beam)| {
                    is_masked(beam, config.cutoff) || config.mask_channels.contains(&chan)
                })
                .collect()
        })
        .collect())
}

/// Beams of `cube` with masked channels replaced by the undefined beam.
fn masked_beams<'a>(cube: &'a CubeInput, mask: &'a [bool]) -> impl Iterator<Item = Beam> + 'a {
    cube.beams
        .iter()
        .zip(mask)
        .map(|(beam, &masked)| if masked { Beam::undefined() } else { *beam })
}

/// Target beam of every channel index, plus any sampling warnings.
fn channel_targets(
    cubes: &[CubeInput],
    masks: &[Vec<bool>],
    config: &JobConfig,
    target: Option<Beam>,
    reporter: &Arc<dyn ProgressReporter>,
) -> Result<(Vec<Beam>, Vec<SamplingWarning>)> {
    let nchan = cubes.first().map_or(0, CubeInput::channels);
    let grid = nyquist_grid(cubes.iter().map(|c| &c.grid));
    let mut warnings = Vec::new();

    match config.mode {
        Mode::Natural => {
            reporter.begin_stage(PipelineStage::SolvingCommonBeam, Some(nchan));
            let mut commons = Vec::with_capacity(nchan);
            for chan in 0..nchan {
                let beams: BeamSet = cubes
                    .iter()
                    .zip(masks)
                    .map(|(cube, mask)| {
                        if mask[chan] {
                            Beam::undefined()
                        } else {
                            cube.beams.as_slice()[chan]
                        }
                    })
                    .collect();
                let common = match solve_common_beam(&beams, config.cutoff, &config.solver) {
                    Ok(common) => common,
                    Err(BeamconError::NoUnmaskedBeams) => {
                        debug!(chan, "Channel fully masked");
                        commons.push(Beam::undefined());
                        reporter.advance(chan + 1);
                        continue;
                    }
                    Err(e) => return Err(e),
                };
                let outcome = enforce_nyquist(&common, &beams, config.cutoff, &grid, None)?;
                warnings.extend(outcome.warning);
                commons.push(outcome.beam);
                reporter.advance(chan + 1);
            }
            reporter.finish_stage();
            Ok((commons, warnings))
        }
        Mode::Total => {
            let beams: BeamSet = cubes
                .iter()
                .zip(masks)
                .flat_map(|(cube, mask)| masked_beams(cube, mask))
                .collect();
            let common = match target {
                Some(target) => {
                    let labels = unit_labels(cubes);
                    validate_target(
                        &target,
                        labels.iter().map(String::as_str).zip(beams.iter()),
                        config.cutoff,
                    )?;
                    reporter.begin_stage(PipelineStage::CheckingSampling, None);
                    enforce_nyquist(&target, &beams, config.cutoff, &grid, Some(&target))?;
                    reporter.finish_stage();
                    target
                }
                None => {
                    reporter.begin_stage(PipelineStage::SolvingCommonBeam, None);
                    let common = solve_common_beam(&beams, config.cutoff, &config.solver)?;
                    reporter.finish_stage();
                    reporter.begin_stage(PipelineStage::CheckingSampling, None);
                    let outcome = enforce_nyquist(&common, &beams, config.cutoff, &grid, None)?;
                    reporter.finish_stage();
                    warnings.extend(outcome.warning);
                    outcome.beam
                }
            };
            info!(beam = %common, "Common beam for all channels");
            Ok((vec![common; nchan], warnings))
        }
    }
}

fn unit_labels(cubes: &[CubeInput]) -> Vec<String> {
    cubes
        .iter()
        .flat_map(|cube| {
            (0..cube.channels()).map(move |chan| format!("{}:chan {chan}", cube.path.display()))
        })
        .collect()
}

struct CubeJob {
    input: PathBuf,
    layout: Option<OutputLayout>,
}

struct CubesPlan {
    report: CubesReport,
    cubes: Vec<CubeJob>,
    nchan: usize,
    grids: Vec<GridSpacing>,
    /// Flattened `cube * nchan + chan`.
    units: Vec<(String, UnitPlan)>,
}

/// Run a 3-D job without progress reporting.
pub fn run_cubes(config: &JobConfig) -> Result<CubesReport> {
    run_cubes_reported(config, Arc::new(NoOpReporter))
}

/// Run a 3-D job over a rank group.
///
/// Rank 0 collects beams, solves, plans, writes the convolution logs and
/// initialises the outputs, then every rank convolves its slice of the
/// flattened cube × channel list.
pub fn run_cubes_reported(
    config: &JobConfig,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<CubesReport> {
    config.validate()?;
    let done = AtomicUsize::new(0);

    let (plan, results) = run_ranked(
        config.scheduler.count(),
        || {
            let plan = prepare(config, &reporter)?;
            if !config.dry_run {
                reporter.begin_stage(PipelineStage::Convolving, Some(plan.units.len()));
            }
            Ok(plan)
        },
        |_ctx, comm, plan: &CubesPlan| {
            if config.dry_run {
                return Vec::new();
            }
            let range = rank_range(plan.units.len(), comm.size(), comm.rank());
            debug!(start = range.start, end = range.end, "Rank slice");
            let mut open: Option<(usize, FitsImage)> = None;
            range
                .map(|index| {
                    let (label, unit_plan) = &plan.units[index];
                    let result = convolve_channel(plan, index, unit_plan, &mut open);
                    reporter.advance(done.fetch_add(1, Ordering::Relaxed) + 1);
                    (label.clone(), result)
                })
                .collect::<Vec<_>>()
        },
    )?;
    if !config.dry_run {
        reporter.finish_stage();
    }

    collect_failures(results.into_iter().flatten().collect())?;
    Ok(plan.report.clone())
}

fn convolve_channel(
    plan: &CubesPlan,
    index: usize,
    unit_plan: &UnitPlan,
    open: &mut Option<(usize, FitsImage)>,
) -> Result<()> {
    let (cube, chan) = (index / plan.nchan, index % plan.nchan);
    let job = &plan.cubes[cube];
    let Some(layout) = &job.layout else {
        return Ok(());
    };
    if open.as_ref().map(|(c, _)| *c) != Some(cube) {
        *open = Some((cube, FitsImage::open(&job.input)?));
    }
    let Some((_, image)) = open.as_ref() else {
        return Ok(());
    };
    let plane = image.read_plane(chan)?;
    let convolved = execute_unit(&plane, &plan.grids[cube], unit_plan);
    layout.write_plane(chan, &convolved)
}

fn prepare(config: &JobConfig, reporter: &Arc<dyn ProgressReporter>) -> Result<CubesPlan> {
    let target = config.target.resolve()?;
    if target.is_some() && config.mode == Mode::Natural {
        return Err(BeamconError::Config(
            "a target beam can only be used in total mode".into(),
        ));
    }

    let cubes = collect_cubes(&config.inputs, reporter)?;
    let nchan = cubes.first().map_or(0, CubeInput::channels);
    let masks = channel_masks(&cubes, config)?;
    let (commons, warnings) = channel_targets(&cubes, &masks, config, target, reporter)?;

    reporter.begin_stage(PipelineStage::Planning, Some(cubes.len() * nchan));
    let channel_commons = &commons;
    let units: Vec<Unit> = cubes
        .iter()
        .zip(&masks)
        .flat_map(|(cube, mask)| {
            cube.beams.iter().enumerate().map(move |(chan, beam)| Unit {
                label: format!("{}:chan {chan}", cube.path.display()),
                beam: *beam,
                grid: cube.grid,
                target: channel_commons[chan],
                masked: mask[chan],
            })
        })
        .collect();
    let plans = plan_batch(&units, config.cutoff)?;
    reporter.finish_stage();

    let outdir = config.output.dir.as_deref();
    let prefix = config.output.prefix.as_deref();
    let mode = config.mode.as_str();
    // Convolution logs are written even on a dry run.
    if let Some(dir) = outdir {
        std::fs::create_dir_all(dir)?;
    }

    let mut reports = Vec::with_capacity(cubes.len());
    for (c, cube) in cubes.iter().enumerate() {
        let dir = output_dir(&cube.path, outdir);
        let log_name = convolve_log_path(&cube.beamlog, mode)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let log_path = dir.join(log_name);
        let rows: Vec<ConvolutionLogRow> = (0..nchan)
            .map(|chan| {
                let (convolving, factor) = plans[c * nchan + chan]
                    .convolution()
                    .unwrap_or((Beam::undefined(), f64::NAN));
                ConvolutionLogRow {
                    channel: chan,
                    target: commons[chan],
                    convolving,
                    factor,
                }
            })
            .collect();
        write_convolution_log(&log_path, &rows)?;
        debug!(path = %log_path.display(), "Wrote convolution log");

        reports.push(CubeReport {
            input: cube.path.clone(),
            output: dir.join(cube_output_name(&cube.path, prefix, mode)),
            convolution_log: log_path,
            channels: nchan,
            blanked: plans[c * nchan..(c + 1) * nchan]
                .iter()
                .filter(|p| p.is_blank())
                .count(),
        });
    }

    let layouts: Vec<Option<OutputLayout>> = if config.dry_run {
        vec![None; cubes.len()]
    } else {
        reporter.begin_stage(PipelineStage::InitialisingOutputs, Some(cubes.len()));
        let mut layouts = Vec::with_capacity(cubes.len());
        for (i, (cube, report)) in cubes.iter().zip(&reports).enumerate() {
            layouts.push(Some(initialise_output(cube, &report.output, &commons, config.mode)?));
            reporter.advance(i + 1);
        }
        reporter.finish_stage();
        layouts
    };

    let grids = cubes.iter().map(|c| c.grid).collect();
    let cube_jobs = cubes
        .iter()
        .zip(layouts)
        .map(|(cube, layout)| CubeJob {
            input: cube.path.clone(),
            layout,
        })
        .collect();
    Ok(CubesPlan {
        report: CubesReport {
            mode: config.mode,
            commons,
            warnings,
            cubes: reports,
            dry_run: config.dry_run,
        },
        cubes: cube_jobs,
        nchan,
        grids,
        units: units.into_iter().map(|u| u.label).zip(plans).collect(),
    })
}

/// Copy the input cube to `output` with the new beam metadata attached.
fn initialise_output(
    cube: &CubeInput,
    output: &Path,
    commons: &[Beam],
    mode: Mode,
) -> Result<OutputLayout> {
    let image = FitsImage::open(&cube.path)?;
    let header_beam = commons
        .iter()
        .copied()
        .find(|b| !b.is_undefined())
        .or_else(|| image.header.beam())
        .unwrap_or(Beam::null());
    let mut header = output_header(&image.header, &header_beam)?;
    let table = match mode {
        Mode::Natural => {
            header.set("CASAMBM", HeaderValue::Logical(true))?;
            header.push_comment("The PSF in each image plane varies.");
            header.push_comment("Full beam information is stored in the second FITS extension.");
            Some(commons)
        }
        Mode::Total => None,
    };
    let layout = initialise_cube(output, &header, &image, table)?;
    info!(output = %output.display(), "Initialised output cube");
    Ok(layout)
}
