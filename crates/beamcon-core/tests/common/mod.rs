#![allow(dead_code)]

use std::path::{Path, PathBuf};

use beamcon_core::beam::{shape_matrix, Beam, GridSpacing};
use beamcon_core::io::fits::{FitsHeader, HeaderValue};
use beamcon_core::io::fits_writer::FitsWriter;
use ndarray::Array2;

/// Primary header for a float image with the given beam and pixel size.
///
/// `planes` > 1 adds a third (spectral) axis.
pub fn image_header(width: usize, height: usize, planes: usize, beam: &Beam, pixel_arcsec: f64) -> FitsHeader {
    let mut cards = vec![
        ("SIMPLE", HeaderValue::Logical(true)),
        ("BITPIX", HeaderValue::Integer(-32)),
        ("NAXIS", HeaderValue::Integer(if planes > 1 { 3 } else { 2 })),
        ("NAXIS1", HeaderValue::Integer(width as i64)),
        ("NAXIS2", HeaderValue::Integer(height as i64)),
    ];
    if planes > 1 {
        cards.push(("NAXIS3", HeaderValue::Integer(planes as i64)));
    }
    cards.extend([
        ("CTYPE1", HeaderValue::String("RA---SIN".into())),
        ("CTYPE2", HeaderValue::String("DEC--SIN".into())),
        ("CDELT1", HeaderValue::Float(-pixel_arcsec / 3600.0)),
        ("CDELT2", HeaderValue::Float(pixel_arcsec / 3600.0)),
        ("BUNIT", HeaderValue::String("Jy/beam".into())),
    ]);

    let mut h = FitsHeader::new();
    for (keyword, value) in cards {
        h.set(keyword, value).expect("header card");
    }
    h.set_beam(beam).expect("beam cards");
    h
}

/// Write a float FITS file holding `planes`, all of the same shape.
pub fn write_fits(path: &Path, planes: &[Array2<f32>], beam: &Beam, pixel_arcsec: f64) {
    let (height, width) = planes[0].dim();
    let header = image_header(width, height, planes.len(), beam, pixel_arcsec);
    let mut writer = FitsWriter::create(path, &header).expect("create FITS");
    for plane in planes {
        writer.write_plane(plane).expect("write plane");
    }
    writer.finish(None).expect("finish FITS");
}

/// Elliptical Gaussian with the given peak, centred on `(row, col)`.
pub fn gaussian_plane(
    height: usize,
    width: usize,
    centre: (f64, f64),
    beam: &Beam,
    grid: &GridSpacing,
    peak: f64,
) -> Array2<f32> {
    let m = shape_matrix(beam);
    let inv = m.try_inverse().expect("invertible beam");
    let scale = 4.0 * std::f64::consts::LN_2;
    Array2::from_shape_fn((height, width), |(r, c)| {
        let x = (c as f64 - centre.1) * grid.dx;
        let y = (r as f64 - centre.0) * grid.dy;
        let q = inv[(0, 0)] * x * x + 2.0 * inv[(0, 1)] * x * y + inv[(1, 1)] * y * y;
        (peak * (-scale * q).exp()) as f32
    })
}

/// Second-moment FWHM along columns (x) and rows (y), in arcsec.
pub fn moment_fwhm(plane: &Array2<f32>, grid: &GridSpacing) -> (f64, f64) {
    let (mut sum, mut sx, mut sy) = (0.0, 0.0, 0.0);
    for ((r, c), &v) in plane.indexed_iter() {
        let v = v as f64;
        sum += v;
        sx += v * c as f64;
        sy += v * r as f64;
    }
    let (cx, cy) = (sx / sum, sy / sum);
    let (mut vx, mut vy) = (0.0, 0.0);
    for ((r, c), &v) in plane.indexed_iter() {
        let v = v as f64;
        vx += v * (c as f64 - cx).powi(2);
        vy += v * (r as f64 - cy).powi(2);
    }
    let fwhm_per_sigma = 2.0 * (2.0 * std::f64::consts::LN_2).sqrt();
    (
        fwhm_per_sigma * (vx / sum).sqrt() * grid.dx,
        fwhm_per_sigma * (vy / sum).sqrt() * grid.dy,
    )
}

/// Beam log in the `#Channel BMAJarcsec[arcsec] ...` layout.
pub fn write_beamlog(path: &Path, beams: &[Beam]) {
    let mut text = String::from("#Channel BMAJarcsec[arcsec] BMINarcsec[arcsec] BPAdeg[deg]\n");
    for (i, b) in beams.iter().enumerate() {
        text.push_str(&format!("{i} {} {} {}\n", b.major, b.minor, b.pa));
    }
    std::fs::write(path, text).expect("write beam log");
}

/// A cube of `nchan` constant planes with a beam log beside it.
pub fn write_cube_with_beamlog(
    dir: &Path,
    name: &str,
    beams: &[Beam],
    size: usize,
    pixel_arcsec: f64,
) -> PathBuf {
    let path = dir.join(name);
    let grid = GridSpacing::new(pixel_arcsec, pixel_arcsec);
    let planes: Vec<Array2<f32>> = beams
        .iter()
        .map(|b| {
            let c = size as f64 / 2.0;
            gaussian_plane(size, size, (c, c), b, &grid, 1.0)
        })
        .collect();
    write_fits(&path, &planes, &beams[0], pixel_arcsec);
    let log = dir.join(format!("beamlog.{}", name.replace(".fits", ".txt")));
    write_beamlog(&log, beams);
    path
}
