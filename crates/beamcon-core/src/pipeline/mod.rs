pub mod config;
pub mod cubes;
pub mod images;
mod types;

use crate::beam::GridSpacing;

pub use config::{JobConfig, Mode, OutputConfig, Scheduler, TargetBeamConfig};
pub use cubes::{run_cubes, run_cubes_reported};
pub use images::{run_images, run_images_reported};
pub use types::{
    CubeReport, CubesReport, ImageReport, ImagesReport, PipelineStage, ProgressReporter,
};

/// Grid used for the sampling check: the coarsest spacing among inputs.
pub(crate) fn nyquist_grid<'a>(grids: impl IntoIterator<Item = &'a GridSpacing>) -> GridSpacing {
    grids.into_iter().fold(GridSpacing::new(0.0, 0.0), |acc, g| {
        GridSpacing::new(acc.dx.max(g.dx), acc.dy.max(g.dy))
    })
}
