pub mod beam;
pub mod consts;
pub mod convolve;
pub mod error;
pub mod io;
pub mod parallel;
pub mod pipeline;
pub mod solve;
