mod common;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use approx::assert_abs_diff_eq;
use beamcon_core::beam::{Beam, GridSpacing};
use beamcon_core::error::BeamconError;
use beamcon_core::io::FitsImage;
use beamcon_core::pipeline::{
    run_images, run_images_reported, JobConfig, PipelineStage, ProgressReporter, Scheduler,
    TargetBeamConfig,
};
use tempfile::TempDir;

const PIXEL: f64 = 2.0;

/// Two point sources observed at 10" and 15".
fn write_inputs(dir: &Path) -> Vec<PathBuf> {
    let grid = GridSpacing::new(PIXEL, PIXEL);
    [("a.fits", 10.0), ("b.fits", 15.0)]
        .into_iter()
        .map(|(name, fwhm)| {
            let beam = Beam::circular(fwhm);
            let path = dir.join(name);
            let plane = common::gaussian_plane(64, 64, (32.0, 32.0), &beam, &grid, 1.0);
            common::write_fits(&path, &[plane], &beam, PIXEL);
            path
        })
        .collect()
}

fn config(inputs: Vec<PathBuf>, outdir: &Path) -> JobConfig {
    let mut config = JobConfig {
        inputs,
        ..JobConfig::default()
    };
    config.output.dir = Some(outdir.to_path_buf());
    config
}

fn peak(plane: &ndarray::Array2<f32>) -> f32 {
    plane.iter().copied().fold(f32::MIN, f32::max)
}

// ---------------------------------------------------------------------------
// Solved common beam
// ---------------------------------------------------------------------------

#[test]
fn test_images_reach_largest_beam() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());

    let report = run_images(&config(inputs, &out)).unwrap();
    assert_eq!(report.common, Some(Beam::circular(15.0)));
    assert_eq!(report.final_beam, Beam::circular(15.0));
    assert!(report.warning.is_none());
    assert_eq!(report.images.len(), 2);

    let (conv, _) = report.images[0].plan.convolution().unwrap();
    assert_abs_diff_eq!(conv.major, 125f64.sqrt(), epsilon = 1e-6);
    let (conv_b, factor_b) = report.images[1].plan.convolution().unwrap();
    assert!(conv_b.is_pointlike());
    assert_abs_diff_eq!(factor_b, 1.0, epsilon = 1e-9);

    let grid = GridSpacing::new(PIXEL, PIXEL);
    for image in &report.images {
        assert_eq!(image.output.parent(), Some(out.as_path()));
        let written = FitsImage::open(&image.output).unwrap();
        let beam = written.beam().unwrap();
        assert_abs_diff_eq!(beam.major, 15.0, epsilon = 1e-9);
        assert_abs_diff_eq!(written.header.get_f64("BMAJ").unwrap(), 15.0 / 3600.0, epsilon = 1e-12);

        let plane = written.read_plane(0).unwrap();
        assert_abs_diff_eq!(peak(&plane), 1.0, epsilon = 5e-3);
        let (fx, fy) = common::moment_fwhm(&plane, &grid);
        assert_abs_diff_eq!(fx, 15.0, epsilon = 0.1);
        assert_abs_diff_eq!(fy, 15.0, epsilon = 0.1);
    }
    assert!(out.join("a.sm.fits").exists());
    assert!(out.join("b.sm.fits").exists());
}

#[test]
fn test_cutoff_blanks_wide_images() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());
    let mut config = config(inputs, &out);
    config.cutoff = Some(12.0);

    let report = run_images(&config).unwrap();
    assert_eq!(report.final_beam, Beam::circular(10.0));
    assert!(report.images[1].plan.is_blank());

    let blanked = FitsImage::open(&out.join("b.sm.fits")).unwrap().read_plane(0).unwrap();
    assert!(blanked.iter().all(|v| v.is_nan()));

    let original = FitsImage::open(&tmp.path().join("a.fits")).unwrap().read_plane(0).unwrap();
    let kept = FitsImage::open(&out.join("a.sm.fits")).unwrap().read_plane(0).unwrap();
    for (a, b) in original.iter().zip(kept.iter()) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-6);
    }
}

// ---------------------------------------------------------------------------
// Pinned target
// ---------------------------------------------------------------------------

#[test]
fn test_pinned_target_used_as_is() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());
    let mut config = config(inputs, &out);
    config.target = TargetBeamConfig::new(20.0, 18.0, 30.0);

    let report = run_images(&config).unwrap();
    assert_eq!(report.common, None);
    assert_eq!(report.final_beam, Beam::new(20.0, 18.0, 30.0));
    let beam = FitsImage::open(&report.images[0].output).unwrap().beam().unwrap();
    assert_abs_diff_eq!(beam.minor, 18.0, epsilon = 1e-9);
    assert_abs_diff_eq!(beam.pa, 30.0, epsilon = 1e-9);
}

#[test]
fn test_small_target_is_infeasible_and_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());
    let wide = inputs[1].display().to_string();
    let mut config = config(inputs, &out);
    config.target = TargetBeamConfig::new(12.0, 12.0, 0.0);

    match run_images(&config).unwrap_err() {
        BeamconError::Infeasible { failed } => assert_eq!(failed, vec![wide]),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!out.exists());
}

#[test]
fn test_undersampled_target_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());
    let mut config = config(inputs[..1].to_vec(), &out);
    config.target = TargetBeamConfig::new(10.5, 10.5, 0.0);

    assert!(matches!(
        run_images(&config),
        Err(BeamconError::TargetUndersampled { .. })
    ));
    assert!(!out.exists());
}

// ---------------------------------------------------------------------------
// Scheduling and reporting
// ---------------------------------------------------------------------------

#[test]
fn test_dry_run_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());
    for scheduler in [Scheduler::Workers(2), Scheduler::Ranks(2)] {
        let mut config = config(inputs.clone(), &out);
        config.dry_run = true;
        config.scheduler = scheduler;
        let report = run_images(&config).unwrap();
        assert!(report.dry_run);
        assert_eq!(report.final_beam, Beam::circular(15.0));
        assert_eq!(report.images.len(), 2);
        assert!(!out.exists());
    }
}

#[test]
fn test_ranks_and_workers_agree() {
    let tmp = TempDir::new().unwrap();
    let inputs = write_inputs(tmp.path());

    let mut outputs = Vec::new();
    for (name, scheduler) in [("w", Scheduler::Workers(2)), ("r", Scheduler::Ranks(3))] {
        let out = tmp.path().join(name);
        let mut config = config(inputs.clone(), &out);
        config.scheduler = scheduler;
        let report = run_images(&config).unwrap();
        outputs.push(
            report
                .images
                .iter()
                .map(|i| FitsImage::open(&i.output).unwrap().read_plane(0).unwrap())
                .collect::<Vec<_>>(),
        );
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_missing_input_fails_before_writing() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let mut inputs = write_inputs(tmp.path());
    inputs.push(tmp.path().join("missing.fits"));
    assert!(matches!(
        run_images(&config(inputs, &out)),
        Err(BeamconError::Io(_))
    ));
    assert!(!out.exists());
}

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<(PipelineStage, Option<usize>)>>,
    advanced: Mutex<usize>,
}

impl ProgressReporter for Recorder {
    fn begin_stage(&self, stage: PipelineStage, total_items: Option<usize>) {
        self.events.lock().unwrap().push((stage, total_items));
    }

    fn advance(&self, _items_done: usize) {
        *self.advanced.lock().unwrap() += 1;
    }
}

#[test]
fn test_progress_stages_in_order() {
    let tmp = TempDir::new().unwrap();
    let out = tmp.path().join("out");
    let inputs = write_inputs(tmp.path());
    let recorder = Arc::new(Recorder::default());

    run_images_reported(&config(inputs, &out), recorder.clone()).unwrap();
    let stages: Vec<PipelineStage> = recorder.events.lock().unwrap().iter().map(|e| e.0).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::CollectingBeams,
            PipelineStage::SolvingCommonBeam,
            PipelineStage::CheckingSampling,
            PipelineStage::Planning,
            PipelineStage::Convolving,
        ]
    );
    // Two collected, two convolved.
    assert_eq!(*recorder.advanced.lock().unwrap(), 4);
}
