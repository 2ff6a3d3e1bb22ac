//! Plain-text per-channel beam logs that accompany spectral cubes.
//!
//! Tables are whitespace separated with a commented header row, e.g.
//!
//! ```text
//! #Channel BMAJarcsec[arcsec] BMINarcsec[arcsec] BPAdeg[deg]
//! 0 12.3 10.1 -45.0
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::beam::{AngleUnit, Beam};
use crate::error::{BeamconError, Result};

/// `<dir>/beamlog.<name>.txt` for a cube at `<dir>/<name>.fits`.
pub fn beamlog_path(cube: &Path) -> PathBuf {
    let name = cube
        .file_name()
        .map(|n| n.to_string_lossy().replace(".fits", ".txt"))
        .unwrap_or_default();
    cube.with_file_name(format!("beamlog.{name}"))
}

/// Companion statistics table, `cubeStats-<name>.txt`.
pub fn stats_path(beamlog: &Path) -> PathBuf {
    replace_in_file_name(beamlog, "beamlog.", "cubeStats-")
}

/// Where the convolution log of a cube is written.
pub fn convolve_log_path(beamlog: &Path, mode: &str) -> PathBuf {
    replace_in_file_name(beamlog, "beamlog.", &format!("beamlogConvolve-{mode}."))
}

fn replace_in_file_name(path: &Path, from: &str, to: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().replacen(from, to, 1))
        .unwrap_or_default();
    path.with_file_name(name)
}

/// A whitespace table with a commented header row.
struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

fn invalid(path: &Path, reason: impl Into<String>) -> BeamconError {
    BeamconError::InvalidBeamLog {
        path: path.to_path_buf(),
        reason: reason.into(),
    }
}

/// Parse a table. Comment lines after the header row are returned
/// separately (statistics files keep units there).
fn read_table(path: &Path) -> Result<(Table, Vec<String>)> {
    let text = fs::read_to_string(path)?;
    let mut columns: Option<Vec<String>> = None;
    let mut comments = Vec::new();
    let mut rows = Vec::new();

    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(rest) = line.strip_prefix('#') {
            if columns.is_none() {
                columns = Some(rest.split_whitespace().map(str::to_string).collect());
            } else {
                comments.push(rest.trim().to_string());
            }
            continue;
        }
        let Some(cols) = columns.as_ref() else {
            return Err(invalid(path, "data before header row"));
        };
        let row = line
            .split_whitespace()
            .map(|field| field.parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| invalid(path, format!("line {}: {e}", lineno + 1)))?;
        if row.len() != cols.len() {
            return Err(invalid(
                path,
                format!(
                    "line {}: expected {} columns, found {}",
                    lineno + 1,
                    cols.len(),
                    row.len()
                ),
            ));
        }
        rows.push(row);
    }

    let columns = columns.ok_or_else(|| invalid(path, "missing header row"))?;
    Ok((Table { columns, rows }, comments))
}

/// Split `BMAJarcsec[arcsec]` into its name and unit.
fn split_column(column: &str) -> Result<(&str, AngleUnit)> {
    match column.find('[') {
        Some(idx) => {
            let unit = column[idx + 1..].trim_end_matches(']');
            Ok((&column[..idx], unit.parse()?))
        }
        None => Ok((column, AngleUnit::None)),
    }
}

/// Read per-channel beams from a beam log.
///
/// Columns are found by their `BMAJ`, `BMIN` and `BPA` prefixes; values are
/// converted to arcsec (axes) and degrees (position angle).
pub fn read_beamlog(path: &Path) -> Result<Vec<Beam>> {
    let (table, _) = read_table(path)?;
    let mut found: [Option<(usize, AngleUnit)>; 3] = [None; 3];
    for (i, column) in table.columns.iter().enumerate() {
        let (name, unit) = split_column(column).map_err(|e| invalid(path, e.to_string()))?;
        let name = name.to_uppercase();
        for (slot, prefix) in found.iter_mut().zip(["BMAJ", "BMIN", "BPA"]) {
            if slot.is_none() && name.starts_with(prefix) {
                *slot = Some((i, unit));
            }
        }
    }
    let [Some(major), Some(minor), Some(pa)] = found else {
        return Err(invalid(path, "expected BMAJ, BMIN and BPA columns"));
    };

    Ok(table
        .rows
        .iter()
        .map(|row| {
            Beam::new(
                major.1.to_arcsec(row[major.0]),
                minor.1.to_arcsec(row[minor.0]),
                pa.1.to_deg(row[pa.0]),
            )
        })
        .collect())
}

/// Per-channel image statistics. Units come from the line after the header.
#[derive(Clone, Debug, PartialEq)]
pub struct CubeStats {
    pub columns: Vec<String>,
    pub units: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl CubeStats {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Read a statistics file, or `None` if there is none.
pub fn read_cube_stats(path: &Path) -> Result<Option<CubeStats>> {
    if !path.exists() {
        return Ok(None);
    }
    let (table, comments) = read_table(path)?;
    let units = comments
        .first()
        .map(|line| line.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default();
    Ok(Some(CubeStats {
        columns: table.columns,
        units,
        rows: table.rows,
    }))
}

/// One line of a convolution log.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConvolutionLogRow {
    pub channel: usize,
    pub target: Beam,
    /// Undefined for blanked channels.
    pub convolving: Beam,
    pub factor: f64,
}

/// Write the per-channel record of what was done to a cube.
pub fn write_convolution_log(path: &Path, rows: &[ConvolutionLogRow]) -> Result<()> {
    let mut out = Vec::new();
    writeln!(
        out,
        "#Channel Target_BMAJ Target_BMIN Target_BPA Convolving_BMAJ Convolving_BMIN Convolving_BPA Convolving_factor"
    )?;
    writeln!(out, "# arcsec arcsec deg arcsec arcsec deg")?;
    for row in rows {
        writeln!(
            out,
            "{} {} {} {} {} {} {} {}",
            row.channel,
            row.target.major,
            row.target.minor,
            row.target.pa,
            row.convolving.major,
            row.convolving.minor,
            row.convolving.pa,
            row.factor
        )?;
    }
    fs::write(path, out)?;
    Ok(())
}
