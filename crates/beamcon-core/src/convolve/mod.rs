//! Per-unit planning and execution of beam-matching convolutions.

pub mod execute;
pub mod fft;
pub mod plan;

pub use execute::execute_unit;
pub use plan::{plan_batch, plan_unit, validate_target, Unit, UnitPlan};
