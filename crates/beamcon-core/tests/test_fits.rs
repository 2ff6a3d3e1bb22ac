mod common;

use std::fs;
use std::io::Write;

use approx::assert_abs_diff_eq;
use beamcon_core::beam::{Beam, GridSpacing};
use beamcon_core::error::BeamconError;
use beamcon_core::io::{initialise_cube, output_header, write_image, FitsImage, HeaderValue};
use fitsio::bintable::{
    build_binary_table_cards, serialize_binary_table, BinaryColumnData, BinaryColumnDescriptor,
    BinaryColumnType,
};
use fitsio::header::{serialize_header, Card};
use fitsio::image_writer::ImageWriter;
use fitsio::primary::build_primary_header;
use ndarray::{array, Array2};
use tempfile::TempDir;

/// Append a `BEAMS` binary table; `naxis1` overrides the row width the
/// columns imply.
fn append_beams_table(
    path: &std::path::Path,
    columns: &[BinaryColumnDescriptor],
    data: &[BinaryColumnData],
    rows: usize,
    naxis1: Option<i64>,
) {
    let mut cards = build_binary_table_cards(columns, rows, 0).unwrap();
    if let Some(width) = naxis1 {
        let card = cards.iter_mut().find(|c| c.keyword_str() == "NAXIS1").unwrap();
        card.value = Some(HeaderValue::Integer(width));
    }
    cards.push(Card::new("EXTNAME", HeaderValue::String("BEAMS".into())).unwrap());
    let mut bytes = serialize_header(&cards).unwrap();
    bytes.extend(serialize_binary_table(columns, data, rows).unwrap());
    let mut file = fs::OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(&bytes).unwrap();
}

fn column(name: &str, col_type: BinaryColumnType, byte_width: usize) -> BinaryColumnDescriptor {
    BinaryColumnDescriptor {
        name: Some(name.into()),
        repeat: 1,
        col_type,
        byte_width,
        tdim: None,
    }
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

#[test]
fn test_scaled_integer_pixels() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("int16.fits");

    let extra = [
        Card::new("BSCALE", HeaderValue::Float(0.5)).unwrap(),
        Card::new("BZERO", HeaderValue::Float(10.0)).unwrap(),
        Card::new("BLANK", HeaderValue::Integer(-32768)).unwrap(),
    ];
    let raw: [i16; 6] = [0, 2, -4, 100, -32768, 7];
    let mut writer = ImageWriter::primary(fs::File::create(&path).unwrap(), 16, &[3, 2], &extra).unwrap();
    writer.write_samples(&raw).unwrap();
    writer.finish().unwrap();

    let image = FitsImage::open(&path).unwrap();
    assert_eq!((image.width(), image.height()), (3, 2));
    assert_eq!(image.plane_count(), 1);
    let plane = image.read_plane(0).unwrap();
    assert_eq!(plane.dim(), (2, 3));
    assert_eq!(plane[[0, 0]], 10.0);
    assert_eq!(plane[[0, 1]], 11.0);
    assert_eq!(plane[[0, 2]], 8.0);
    assert_eq!(plane[[1, 0]], 60.0);
    assert!(plane[[1, 1]].is_nan());
    assert_eq!(plane[[1, 2]], 13.5);
}

#[test]
fn test_cube_planes_and_header_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cube.fits");
    let beam = Beam::new(12.0, 9.0, -30.0);
    let planes: Vec<Array2<f32>> = (0..3).map(|i| Array2::from_elem((4, 5), i as f32)).collect();
    common::write_fits(&path, &planes, &beam, 2.5);

    let image = FitsImage::open(&path).unwrap();
    assert_eq!(image.axes(), &[5, 4, 3]);
    assert_eq!(image.plane_count(), 3);
    for i in 0..3 {
        let plane = image.read_plane(i).unwrap();
        assert!(plane.iter().all(|&v| v == i as f32));
    }

    let read = image.beam().unwrap();
    assert_abs_diff_eq!(read.major, 12.0, epsilon = 1e-9);
    assert_abs_diff_eq!(read.minor, 9.0, epsilon = 1e-9);
    assert_abs_diff_eq!(read.pa, -30.0, epsilon = 1e-9);
    let grid = image.grid().unwrap();
    assert_abs_diff_eq!(grid.dx, 2.5, epsilon = 1e-9);
    assert_abs_diff_eq!(grid.dy, 2.5, epsilon = 1e-9);
    assert_eq!(image.beam_table().unwrap(), None);
}

#[test]
fn test_plane_index_out_of_range() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("one.fits");
    common::write_fits(&path, &[Array2::zeros((2, 2))], &Beam::circular(5.0), 1.0);
    let image = FitsImage::open(&path).unwrap();
    match image.read_plane(1).unwrap_err() {
        BeamconError::PlaneIndexOutOfRange { index, total } => {
            assert_eq!((index, total), (1, 1));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_rejects_non_fits_and_truncated_files() {
    let dir = TempDir::new().unwrap();
    let junk = dir.path().join("junk.fits");
    fs::write(&junk, vec![b'x'; 4000]).unwrap();
    assert!(matches!(FitsImage::open(&junk), Err(BeamconError::InvalidFits(_))));

    let short = dir.path().join("short.fits");
    let header = serialize_header(&build_primary_header(-32, &[100, 100]).unwrap()).unwrap();
    fs::write(&short, header).unwrap();
    assert!(matches!(FitsImage::open(&short), Err(BeamconError::InvalidFits(_))));
}

#[test]
fn test_missing_beam_keywords() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nobeam.fits");
    let mut header = common::image_header(2, 2, 1, &Beam::circular(5.0), 1.0);
    header.remove("BMAJ");
    write_image(&path, &header, &Array2::zeros((2, 2))).unwrap();
    let image = FitsImage::open(&path).unwrap();
    assert!(matches!(image.beam(), Err(BeamconError::MissingKeyword { .. })));
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

#[test]
fn test_output_header_drops_integer_scaling() {
    let mut input = common::image_header(2, 2, 1, &Beam::circular(5.0), 1.0);
    input.set("BITPIX", HeaderValue::Integer(16)).unwrap();
    input.set("BSCALE", HeaderValue::Float(2.0)).unwrap();
    input.set("BZERO", HeaderValue::Float(1.0)).unwrap();
    input.set("BLANK", HeaderValue::Integer(-1)).unwrap();

    let header = output_header(&input, &Beam::circular(15.0)).unwrap();
    assert_eq!(header.get_i64("BITPIX"), Some(-32));
    assert!(!header.contains("BSCALE"));
    assert!(!header.contains("BZERO"));
    assert!(!header.contains("BLANK"));
    assert_abs_diff_eq!(header.get_f64("BMAJ").unwrap(), 15.0 / 3600.0, epsilon = 1e-15);
    assert_eq!(header.get("CTYPE1"), input.get("CTYPE1"));
}

#[test]
fn test_cube_layout_overwrites_single_planes() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src.fits");
    let planes: Vec<Array2<f32>> = (0..3).map(|i| Array2::from_elem((2, 3), i as f32)).collect();
    common::write_fits(&src, &planes, &Beam::circular(5.0), 1.0);
    let source = FitsImage::open(&src).unwrap();

    let out = dir.path().join("out.fits");
    let header = output_header(&source.header, &Beam::circular(8.0)).unwrap();
    let layout = initialise_cube(&out, &header, &source, None).unwrap();
    assert_eq!(layout.planes, 3);

    let replacement = array![[7.0f32, 8.0, 9.0], [10.0, 11.0, f32::NAN]];
    layout.write_plane(1, &replacement).unwrap();
    assert!(matches!(
        layout.write_plane(3, &replacement),
        Err(BeamconError::PlaneIndexOutOfRange { .. })
    ));
    assert!(layout.write_plane(0, &Array2::zeros((3, 3))).is_err());

    let written = FitsImage::open(&out).unwrap();
    assert!(written.read_plane(0).unwrap().iter().all(|&v| v == 0.0));
    let middle = written.read_plane(1).unwrap();
    assert_eq!(middle[[0, 0]], 7.0);
    assert_eq!(middle[[1, 1]], 11.0);
    assert!(middle[[1, 2]].is_nan());
    assert!(written.read_plane(2).unwrap().iter().all(|&v| v == 2.0));
}

#[test]
fn test_beam_table_is_read_back() {
    let dir = TempDir::new().unwrap();
    let src = dir.path().join("src.fits");
    let planes: Vec<Array2<f32>> = (0..2).map(|_| Array2::ones((4, 4))).collect();
    common::write_fits(&src, &planes, &Beam::circular(5.0), 1.0);
    let source = FitsImage::open(&src).unwrap();

    let beams = [Beam::new(11.5, 9.25, 20.0), Beam::new(12.0, 10.0, -45.5)];
    let out = dir.path().join("out.fits");
    let mut header = source.header.clone();
    header.set("CASAMBM", HeaderValue::Logical(true)).unwrap();
    header.push_comment("The PSF in each image plane varies.");
    initialise_cube(&out, &header, &source, Some(&beams)).unwrap();

    let written = FitsImage::open(&out).unwrap();
    let keys: Vec<_> = written.header.cards().iter().map(Card::keyword_str).collect();
    let naxis3 = keys.iter().position(|k| *k == "NAXIS3").unwrap();
    assert_eq!(keys[naxis3 + 1], "EXTEND");
    assert_eq!(written.header.get("CASAMBM"), Some(&HeaderValue::Logical(true)));
    assert!(keys.contains(&"COMMENT"));

    let table = written.beam_table().unwrap().unwrap();
    assert_eq!(table.len(), 2);
    for (got, want) in table.iter().zip(beams.iter()) {
        assert_abs_diff_eq!(got.major, want.major, epsilon = 1e-5);
        assert_abs_diff_eq!(got.minor, want.minor, epsilon = 1e-5);
        assert_abs_diff_eq!(got.pa, want.pa, epsilon = 1e-5);
    }
    // Pixel data is untouched by the extension.
    assert!(written.read_plane(1).unwrap().iter().all(|&v| v == 1.0));
}

#[test]
fn test_image_grid_from_negative_cdelt() {
    let header = common::image_header(2, 2, 1, &Beam::circular(5.0), 3.0);
    let grid: GridSpacing = header.grid().unwrap();
    assert_abs_diff_eq!(grid.dx, 3.0, epsilon = 1e-12);
    assert_abs_diff_eq!(grid.dy, 3.0, epsilon = 1e-12);
}

#[test]
fn test_beam_table_with_integer_bpa_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("odd.fits");
    common::write_fits(&path, &[Array2::zeros((2, 2))], &Beam::circular(5.0), 1.0);
    let columns = [
        column("BMAJ", BinaryColumnType::Float, 4),
        column("BMIN", BinaryColumnType::Float, 4),
        column("BPA", BinaryColumnType::Short, 2),
    ];
    let data = [
        BinaryColumnData::Float(vec![10.0]),
        BinaryColumnData::Float(vec![8.0]),
        BinaryColumnData::Short(vec![30]),
    ];
    append_beams_table(&path, &columns, &data, 1, None);

    let image = FitsImage::open(&path).unwrap();
    match image.beam_table() {
        Err(BeamconError::InvalidFits(msg)) => assert!(msg.contains("BPA"), "{msg}"),
        other => panic!("expected InvalidFits, got {other:?}"),
    }
}

#[test]
fn test_beam_table_wider_than_its_rows_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short_rows.fits");
    common::write_fits(&path, &[Array2::zeros((2, 2))], &Beam::circular(5.0), 1.0);
    let columns = [
        column("BMAJ", BinaryColumnType::Float, 4),
        column("BMIN", BinaryColumnType::Float, 4),
        column("BPA", BinaryColumnType::Float, 4),
    ];
    let data = [
        BinaryColumnData::Float(vec![10.0, 11.0]),
        BinaryColumnData::Float(vec![8.0, 9.0]),
        BinaryColumnData::Float(vec![30.0, 31.0]),
    ];
    append_beams_table(&path, &columns, &data, 2, Some(10));

    let result = FitsImage::open(&path).and_then(|image| image.beam_table());
    assert!(matches!(result, Err(BeamconError::InvalidFits(_))), "{result:?}");
}

#[test]
fn test_beam_table_units_are_converted() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deg.fits");
    common::write_fits(&path, &[Array2::zeros((2, 2))], &Beam::circular(5.0), 1.0);
    let columns = [
        column("BMAJ", BinaryColumnType::Double, 8),
        column("BMIN", BinaryColumnType::Double, 8),
        column("BPA", BinaryColumnType::Double, 8),
    ];
    let data = [
        BinaryColumnData::Double(vec![10.0 / 3600.0]),
        BinaryColumnData::Double(vec![8.0 / 3600.0]),
        BinaryColumnData::Double(vec![30.0]),
    ];
    let mut cards = build_binary_table_cards(&columns, 1, 0).unwrap();
    for (keyword, text) in [("TUNIT1", "deg"), ("TUNIT2", "deg"), ("TUNIT3", "deg"), ("EXTNAME", "BEAMS")] {
        cards.push(Card::new(keyword, HeaderValue::String(text.into())).unwrap());
    }
    let mut bytes = serialize_header(&cards).unwrap();
    bytes.extend(serialize_binary_table(&columns, &data, 1).unwrap());
    fs::OpenOptions::new().append(true).open(&path).unwrap().write_all(&bytes).unwrap();

    let table = FitsImage::open(&path).unwrap().beam_table().unwrap().unwrap();
    assert_eq!(table.len(), 1);
    assert_abs_diff_eq!(table[0].major, 10.0, epsilon = 1e-9);
    assert_abs_diff_eq!(table[0].minor, 8.0, epsilon = 1e-9);
    assert_abs_diff_eq!(table[0].pa, 30.0, epsilon = 1e-9);
}
