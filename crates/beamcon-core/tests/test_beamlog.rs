use std::fs;

use approx::assert_abs_diff_eq;
use beamcon_core::beam::Beam;
use beamcon_core::error::BeamconError;
use beamcon_core::io::beamlog::{
    read_beamlog, read_cube_stats, write_convolution_log, ConvolutionLogRow,
};
use tempfile::TempDir;

#[test]
fn test_reads_arcsec_columns() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beamlog.cube.txt");
    fs::write(
        &path,
        "#Channel BMAJarcsec[arcsec] BMINarcsec[arcsec] BPAdeg[deg]\n\
         0 12.5 10.0 -45.0\n\
         1 13.0 11.0 135.0\n\
         \n\
         2 0 0 0\n",
    )
    .unwrap();

    let beams = read_beamlog(&path).unwrap();
    assert_eq!(beams.len(), 3);
    assert_eq!(beams[0], Beam::new(12.5, 10.0, -45.0));
    assert_abs_diff_eq!(beams[1].pa, -45.0, epsilon = 1e-12);
    assert!(beams[2].is_null());
}

#[test]
fn test_converts_degree_axes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beamlog.cube.txt");
    fs::write(
        &path,
        "#Channel BMAJ[deg] BMIN[deg] BPA[rad]\n0 0.005 0.0025 0.5\n",
    )
    .unwrap();

    let beams = read_beamlog(&path).unwrap();
    assert_abs_diff_eq!(beams[0].major, 18.0, epsilon = 1e-9);
    assert_abs_diff_eq!(beams[0].minor, 9.0, epsilon = 1e-9);
    assert_abs_diff_eq!(beams[0].pa, 0.5f64.to_degrees(), epsilon = 1e-9);
}

#[test]
fn test_missing_column_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beamlog.cube.txt");
    fs::write(&path, "#Channel BMAJ[arcsec] BPA[deg]\n0 10 0\n").unwrap();
    assert!(matches!(
        read_beamlog(&path),
        Err(BeamconError::InvalidBeamLog { .. })
    ));
}

#[test]
fn test_ragged_rows_are_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beamlog.cube.txt");
    fs::write(
        &path,
        "#Channel BMAJ[arcsec] BMIN[arcsec] BPA[deg]\n0 10 9 0\n1 10 9\n",
    )
    .unwrap();
    match read_beamlog(&path).unwrap_err() {
        BeamconError::InvalidBeamLog { reason, .. } => assert!(reason.contains("line 3")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_stats_keep_units_row() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cubeStats-cube.txt");
    assert_eq!(read_cube_stats(&path).unwrap(), None);

    fs::write(
        &path,
        "#Channel Frequency Mean Std\n# - MHz mJy/beam mJy/beam\n0 1400.0 0.1 1.2\n1 1401.0 0.2 1.3\n",
    )
    .unwrap();
    let stats = read_cube_stats(&path).unwrap().unwrap();
    assert_eq!(stats.len(), 2);
    assert_eq!(stats.columns, vec!["Channel", "Frequency", "Mean", "Std"]);
    assert_eq!(stats.units, vec!["-", "MHz", "mJy/beam", "mJy/beam"]);
    assert_eq!(stats.rows[1][1], 1401.0);
}

#[test]
fn test_convolution_log_layout() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("beamlogConvolve-natural.cube.txt");
    let rows = [
        ConvolutionLogRow {
            channel: 0,
            target: Beam::circular(15.0),
            convolving: Beam::circular(11.5),
            factor: 1.25,
        },
        ConvolutionLogRow {
            channel: 1,
            target: Beam::undefined(),
            convolving: Beam::undefined(),
            factor: f64::NAN,
        },
    ];
    write_convolution_log(&path, &rows).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("#Channel Target_BMAJ"));
    assert_eq!(lines[1], "# arcsec arcsec deg arcsec arcsec deg");
    assert_eq!(lines[2], "0 15 15 0 11.5 11.5 0 1.25");
    assert_eq!(lines[3], "1 NaN NaN NaN NaN NaN NaN NaN");
}
