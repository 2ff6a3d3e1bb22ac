//! Common-beam search and the sampling guard applied to its result.

pub mod common;
pub mod mvee;
pub mod nyquist;

pub use common::{solve_common_beam, SolverParams};
pub use nyquist::{enforce_nyquist, NyquistOutcome, SamplingWarning};
