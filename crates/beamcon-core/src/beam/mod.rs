//! Elliptical Gaussian beams and the primitives the pipeline is built on.
//!
//! Axes are FWHM in arcseconds, position angles in degrees measured from
//! north through east and normalised to `(-90, 90]`.

mod algebra;
pub mod factor;
pub mod kernel;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::consts::{ARCSEC_PER_DEG, AXIS_PRECISION, PA_PRECISION, POINTLIKE_AXIS_ARCSEC};
use crate::error::{BeamconError, Result};

pub use algebra::shape_matrix;
pub(crate) use algebra::shape_encloses;

/// An elliptical Gaussian point-spread function.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    /// Major axis FWHM, arcsec.
    pub major: f64,
    /// Minor axis FWHM, arcsec.
    pub minor: f64,
    /// Position angle, degrees.
    pub pa: f64,
}

impl Beam {
    pub fn new(major: f64, minor: f64, pa: f64) -> Self {
        Self {
            major,
            minor,
            pa: normalize_pa(pa),
        }
    }

    pub fn circular(fwhm: f64) -> Self {
        Self::new(fwhm, fwhm, 0.0)
    }

    /// Build a beam from FITS `BMAJ`/`BMIN`/`BPA` values (all in degrees).
    pub fn from_degrees(bmaj: f64, bmin: f64, bpa: f64) -> Self {
        Self::new(bmaj * ARCSEC_PER_DEG, bmin * ARCSEC_PER_DEG, bpa)
    }

    /// The all-zero beam pipelines use to flag a flagged channel.
    pub fn null() -> Self {
        Self {
            major: 0.0,
            minor: 0.0,
            pa: 0.0,
        }
    }

    /// Placeholder for masked units.
    pub fn undefined() -> Self {
        Self {
            major: f64::NAN,
            minor: f64::NAN,
            pa: f64::NAN,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.major.is_nan() || self.minor.is_nan() || self.pa.is_nan()
    }

    pub fn is_null(&self) -> bool {
        self.major == 0.0 && self.minor == 0.0 && self.pa == 0.0
    }

    /// True when convolving by this beam is an identity operation.
    pub fn is_pointlike(&self) -> bool {
        self.major.abs() < POINTLIKE_AXIS_ARCSEC && self.minor.abs() < POINTLIKE_AXIS_ARCSEC
    }

    /// Gaussian solid angle, arcsec².
    pub fn area(&self) -> f64 {
        std::f64::consts::PI / (4.0 * std::f64::consts::LN_2) * self.major * self.minor
    }

    /// Strictly larger solid angle than `other`.
    pub fn exceeds(&self, other: &Beam) -> bool {
        self.area() > other.area()
    }

    /// Round axes up to 0.1 arcsec and the position angle up to 0.01 deg.
    ///
    /// The result never lies below the input (up to decimal representation).
    pub fn ceil_to_precision(&self) -> Beam {
        Beam {
            major: ceil_to(self.major, AXIS_PRECISION),
            minor: ceil_to(self.minor, AXIS_PRECISION),
            pa: ceil_to(self.pa, PA_PRECISION),
        }
    }

    /// `(BMAJ, BMIN, BPA)` in the units FITS headers carry.
    pub fn to_degrees(&self) -> (f64, f64, f64) {
        (
            self.major / ARCSEC_PER_DEG,
            self.minor / ARCSEC_PER_DEG,
            self.pa,
        )
    }
}

impl fmt::Display for Beam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.3}\" x {:.3}\" @ {:.2} deg",
            self.major, self.minor, self.pa
        )
    }
}

/// Wrap a position angle into `(-90, 90]` degrees.
pub fn normalize_pa(pa: f64) -> f64 {
    if !pa.is_finite() {
        return pa;
    }
    let wrapped = pa.rem_euclid(180.0);
    if wrapped > 90.0 {
        wrapped - 180.0
    } else {
        wrapped
    }
}

/// Ceiling to `decimals` places.
///
/// Values already sitting on the decimal grid (within floating-point noise)
/// are kept instead of being bumped up one step.
pub fn ceil_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    let nearest = scaled.round();
    if (scaled - nearest).abs() <= 1e-9 * nearest.abs().max(1.0) {
        nearest / scale
    } else {
        scaled.ceil() / scale
    }
}

/// Pixel scales of one image, arcsec.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GridSpacing {
    pub dx: f64,
    pub dy: f64,
}

impl GridSpacing {
    pub fn new(dx: f64, dy: f64) -> Self {
        Self {
            dx: dx.abs(),
            dy: dy.abs(),
        }
    }

    /// From `CDELT1`/`CDELT2`, which are in degrees and signed.
    pub fn from_cdelt(cdelt1: f64, cdelt2: f64) -> Self {
        Self::new(cdelt1 * ARCSEC_PER_DEG, cdelt2 * ARCSEC_PER_DEG)
    }
}

/// A unit is masked when its beam is undefined, null, or wider than the cutoff.
pub fn is_masked(beam: &Beam, cutoff: Option<f64>) -> bool {
    beam.is_undefined() || beam.is_null() || cutoff.is_some_and(|c| beam.major > c)
}

/// Ordered beams of one job, one per schedulable unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BeamSet {
    beams: Vec<Beam>,
}

impl BeamSet {
    pub fn new(beams: Vec<Beam>) -> Self {
        Self { beams }
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Beam> {
        self.beams.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Beam> {
        self.beams.iter()
    }

    pub fn as_slice(&self) -> &[Beam] {
        &self.beams
    }

    /// Per-beam mask, `true` where the unit is blanked.
    pub fn mask(&self, cutoff: Option<f64>) -> Vec<bool> {
        self.beams.iter().map(|b| is_masked(b, cutoff)).collect()
    }

    /// `(index, beam)` pairs that take part in solving.
    pub fn unmasked(&self, cutoff: Option<f64>) -> Vec<(usize, Beam)> {
        self.beams
            .iter()
            .enumerate()
            .filter(|(_, b)| !is_masked(b, cutoff))
            .map(|(i, b)| (i, *b))
            .collect()
    }

    /// The unmasked beam with the largest solid angle.
    pub fn largest(&self, cutoff: Option<f64>) -> Option<(usize, Beam)> {
        self.unmasked(cutoff)
            .into_iter()
            .max_by(|a, b| a.1.area().total_cmp(&b.1.area()))
    }
}

impl FromIterator<Beam> for BeamSet {
    fn from_iter<I: IntoIterator<Item = Beam>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a BeamSet {
    type Item = &'a Beam;
    type IntoIter = std::slice::Iter<'a, Beam>;

    fn into_iter(self) -> Self::IntoIter {
        self.beams.iter()
    }
}

/// Angular units found in beam-log column headers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AngleUnit {
    Arcsec,
    Arcmin,
    Deg,
    Rad,
    /// No bracketed unit.
    None,
}

impl AngleUnit {
    pub fn to_arcsec(self, value: f64) -> f64 {
        match self {
            Self::Arcsec | Self::None => value,
            Self::Arcmin => value * 60.0,
            Self::Deg => value * ARCSEC_PER_DEG,
            Self::Rad => value.to_degrees() * ARCSEC_PER_DEG,
        }
    }

    pub fn to_deg(self, value: f64) -> f64 {
        match self {
            Self::Deg | Self::None => value,
            Self::Arcsec => value / ARCSEC_PER_DEG,
            Self::Arcmin => value / 60.0,
            Self::Rad => value.to_degrees(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Arcsec => "arcsec",
            Self::Arcmin => "arcmin",
            Self::Deg => "deg",
            Self::Rad => "rad",
            Self::None => "",
        }
    }
}

impl FromStr for AngleUnit {
    type Err = BeamconError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "" => Ok(Self::None),
            "arcsec" | "asec" | "\"" => Ok(Self::Arcsec),
            "arcmin" | "amin" | "'" => Ok(Self::Arcmin),
            "deg" | "degree" | "degrees" => Ok(Self::Deg),
            "rad" | "radian" | "radians" => Ok(Self::Rad),
            other => Err(BeamconError::Config(format!("unknown angular unit '{other}'"))),
        }
    }
}

impl fmt::Display for AngleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
