/// Minimum pixel count (h*w) to use row-level Rayon parallelism.
pub const PARALLEL_PIXEL_THRESHOLD: usize = 65_536;

/// Kernel support (in pixels) above which convolution switches to the FFT path.
pub const FFT_KERNEL_THRESHOLD: usize = 1_225;

/// Default convergence tolerance of the enclosing-ellipse search.
pub const DEFAULT_TOLERANCE: f64 = 1e-4;

/// Default fractional inflation applied to the enclosing ellipse.
pub const DEFAULT_EPSILON: f64 = 5e-4;

/// Default number of boundary samples taken per beam.
pub const DEFAULT_MAX_SAMPLES: usize = 200;

/// Tolerance is divided by this factor for the second solver attempt.
pub const SOLVER_RETRY_TOLERANCE_DIVISOR: f64 = 10.0;

/// Epsilon may grow up to this value before a solver attempt is abandoned.
pub const MAX_EPSILON: f64 = 1e-2;

/// Growth factor applied to epsilon between containment checks.
pub const EPSILON_GROWTH: f64 = 1.5;

/// Default bound on Khachiyan iterations for one enclosing-ellipse fit.
pub const MVEE_MAX_ITERATIONS: usize = 100_000;

/// Minimum number of pixels across the minor axis of a convolving kernel.
pub const NYQUIST_MIN_SAMPLES: f64 = 2.0;

/// Decimal places kept (rounding up) on beam axes, in arcsec.
pub const AXIS_PRECISION: i32 = 1;

/// Decimal places kept (rounding up) on beam position angles, in degrees.
pub const PA_PRECISION: i32 = 2;

/// Relative tolerance used when comparing beam covariances.
pub const BEAM_COMPARE_RTOL: f64 = 1e-7;

/// Convolving beams with both axes below this size (arcsec) act as identity.
pub const POINTLIKE_AXIS_ARCSEC: f64 = 1e-6;

/// Kernel half-width, in standard deviations along the major axis.
pub const KERNEL_HALF_WIDTH_SIGMA: f64 = 4.0;

/// Arcseconds per degree.
pub const ARCSEC_PER_DEG: f64 = 3600.0;

/// Default suffix inserted into 2-D output file names.
pub const DEFAULT_SUFFIX: &str = "sm";
