use std::path::PathBuf;

use thiserror::Error;

use crate::beam::Beam;

#[derive(Error, Debug)]
pub enum BeamconError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("FITS I/O error: {0}")]
    Fits(#[from] fitsio::compat::errors::Error),

    #[error("FITS format error: {0}")]
    FitsFormat(#[from] fitsio::Error),

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Missing header keyword {keyword} in {path}")]
    MissingKeyword { keyword: String, path: PathBuf },

    #[error("Invalid beam log {path}: {reason}")]
    InvalidBeamLog { path: PathBuf, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unequal number of spectral channels: {counts:?}")]
    ChannelMismatch { counts: Vec<usize> },

    #[error("No unmasked beams left to solve for a common beam")]
    NoUnmaskedBeams,

    #[error("Could not find a common beam after {attempts} attempt(s) (last tolerance {tolerance:e})")]
    SolverNonConvergence { attempts: usize, tolerance: f64 },

    #[error("Beam {target} could not be deconvolved by {beam}")]
    Deconvolution { target: Beam, beam: Beam },

    #[error("The following inputs could not reach the target resolution: {}", .failed.join(", "))]
    Infeasible { failed: Vec<String> },

    #[error("Target beam will be undersampled: {target} is smaller than the Nyquist beam {nyquist}")]
    TargetUndersampled { target: Beam, nyquist: Beam },

    #[error("Plane index {index} out of range (total: {total})")]
    PlaneIndexOutOfRange { index: usize, total: usize },

    #[error("{count} unit(s) failed: {}", .failed.join("; "))]
    UnitsFailed { count: usize, failed: Vec<String> },

    #[error("Worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, BeamconError>;
