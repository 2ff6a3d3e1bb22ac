use super::{Beam, GridSpacing};

/// Flux correction for convolving with a peak-normalised kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GaussFactor {
    /// Multiplier applied to the convolved plane.
    pub factor: f64,
    /// Resolution of the convolved plane (`original ⊛ convolving`).
    pub output: Beam,
}

/// Factor that keeps surface brightness in Jy/beam after convolving a plane
/// at resolution `original` with the peak-normalised kernel of `convolving`.
///
/// A peak-normalised kernel sums to `Ω_conv / (dx dy)`, while the beam area
/// changes from `Ω_orig` to `Ω_out`, so
/// `factor = dx dy Ω_out / (Ω_orig Ω_conv)`.
pub fn gauss_factor(convolving: &Beam, original: &Beam, grid: &GridSpacing) -> GaussFactor {
    let output = original.convolve(convolving);
    if convolving.is_pointlike() {
        return GaussFactor {
            factor: output.area() / original.area(),
            output,
        };
    }
    let factor = grid.dx * grid.dy * output.area() / (original.area() * convolving.area());
    GaussFactor { factor, output }
}
