//! Header access and reading for the primary image and `BEAMS` table of a
//! FITS file. Decoding is done by `fitsio`; this module maps it onto beams,
//! pixel grids and `ndarray` planes.

use std::path::{Path, PathBuf};

use fitsio::bintable::{parse_binary_table_columns, BinaryColumnType};
use fitsio::compat::fitsfile::FitsFile;
use fitsio::compat::hdu::FitsHdu;
use fitsio::hdu::{Hdu, HduInfo};
use fitsio::header::Card;
use fitsio::image::{bytes_per_pixel, extract_blank, extract_bscale_bzero};
use ndarray::Array2;

use crate::beam::{AngleUnit, Beam, GridSpacing};
use crate::error::{BeamconError, Result};

pub use fitsio::value::Value as HeaderValue;

fn value_f64(value: &HeaderValue) -> Option<f64> {
    match *value {
        HeaderValue::Integer(v) => Some(v as f64),
        HeaderValue::Float(v) => Some(v),
        _ => None,
    }
}

fn value_i64(value: &HeaderValue) -> Option<i64> {
    match *value {
        HeaderValue::Integer(v) => Some(v),
        HeaderValue::Float(v) if v.fract() == 0.0 => Some(v as i64),
        _ => None,
    }
}

/// Ordered header cards of one HDU, without the `END` card.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FitsHeader {
    cards: Vec<Card>,
}

impl FitsHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_cards(cards: Vec<Card>) -> Self {
        let cards = cards
            .into_iter()
            .filter(|c| c.keyword_str() != "END")
            .collect();
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|c| c.keyword_str() == keyword)
            .and_then(|c| c.value.as_ref())
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        self.get(keyword).and_then(value_f64)
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        self.get(keyword).and_then(value_i64)
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword)? {
            HeaderValue::String(s) => Some(s.trim()),
            _ => None,
        }
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.cards.iter().any(|c| c.keyword_str() == keyword)
    }

    /// Replace the value of the first card with this keyword, or append a
    /// new card.
    pub fn set(&mut self, keyword: &str, value: HeaderValue) -> Result<()> {
        match self.cards.iter_mut().find(|c| c.keyword_str() == keyword) {
            Some(card) => card.value = Some(value),
            None => self.cards.push(Card::new(keyword, value)?),
        }
        Ok(())
    }

    pub fn push_comment(&mut self, text: &str) {
        self.cards.push(Card {
            keyword: *b"COMMENT ",
            value: None,
            comment: Some(text.to_string()),
        });
    }

    /// Remove every card with this keyword.
    pub fn remove(&mut self, keyword: &str) {
        self.cards.retain(|c| c.keyword_str() != keyword);
    }

    pub fn bitpix(&self) -> Result<i64> {
        self.get_i64("BITPIX")
            .ok_or_else(|| BeamconError::InvalidFits("missing BITPIX".into()))
    }

    /// `NAXISn` values, fastest-varying first.
    pub fn axes(&self) -> Result<Vec<usize>> {
        let naxis = self
            .get_i64("NAXIS")
            .ok_or_else(|| BeamconError::InvalidFits("missing NAXIS".into()))?;
        (1..=naxis)
            .map(|n| {
                let key = format!("NAXIS{n}");
                self.get_i64(&key)
                    .and_then(|v| usize::try_from(v).ok())
                    .ok_or_else(|| BeamconError::InvalidFits(format!("missing {key}")))
            })
            .collect()
    }

    /// Beam from `BMAJ`/`BMIN`/`BPA`, if all three are present.
    pub fn beam(&self) -> Option<Beam> {
        Some(Beam::from_degrees(
            self.get_f64("BMAJ")?,
            self.get_f64("BMIN")?,
            self.get_f64("BPA")?,
        ))
    }

    pub fn set_beam(&mut self, beam: &Beam) -> Result<()> {
        let (bmaj, bmin, bpa) = beam.to_degrees();
        self.set("BMAJ", HeaderValue::Float(bmaj))?;
        self.set("BMIN", HeaderValue::Float(bmin))?;
        self.set("BPA", HeaderValue::Float(bpa))
    }

    /// Pixel scales from `CDELT1`/`CDELT2`.
    pub fn grid(&self) -> Option<GridSpacing> {
        Some(GridSpacing::from_cdelt(
            self.get_f64("CDELT1")?,
            self.get_f64("CDELT2")?,
        ))
    }
}

/// A FITS file with an image in its primary HDU.
pub struct FitsImage {
    file: FitsFile,
    primary: FitsHdu,
    path: PathBuf,
    pub header: FitsHeader,
    axes: Vec<usize>,
    bitpix: i64,
}

impl FitsImage {
    /// Open a FITS file and parse its headers. Pixels are read per plane.
    pub fn open(path: &Path) -> Result<Self> {
        let file_len = std::fs::metadata(path)?.len();
        let invalid = |e: fitsio::compat::errors::Error| {
            BeamconError::InvalidFits(format!("{}: {e}", path.display()))
        };
        let file = FitsFile::open(path).map_err(invalid)?;
        let primary = file.primary_hdu().map_err(invalid)?;
        let (cards, data_start) = {
            let hdu = file.parsed().map_err(invalid)?.primary();
            (hdu.cards.clone(), hdu.data_start)
        };
        let header = FitsHeader::from_cards(cards);

        let axes = header.axes()?;
        if axes.len() < 2 {
            return Err(BeamconError::InvalidFits(format!(
                "{}: expected at least 2 axes, found {}",
                path.display(),
                axes.len()
            )));
        }
        let bitpix = header.bitpix()?;
        bytes_per_pixel(bitpix)
            .map_err(|_| BeamconError::InvalidFits(format!("unsupported BITPIX {bitpix}")))?;

        let image = Self {
            file,
            primary,
            path: path.to_path_buf(),
            header,
            axes,
            bitpix,
        };
        let expected = (data_start + image.data_len()) as u64;
        if file_len < expected {
            return Err(BeamconError::InvalidFits(format!(
                "{} truncated: expected at least {expected} bytes, got {file_len}",
                path.display()
            )));
        }
        Ok(image)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `NAXIS1`.
    pub fn width(&self) -> usize {
        self.axes[0]
    }

    /// `NAXIS2`.
    pub fn height(&self) -> usize {
        self.axes[1]
    }

    pub fn axes(&self) -> &[usize] {
        &self.axes
    }

    /// Number of 2-D planes; every axis past the second is flattened.
    pub fn plane_count(&self) -> usize {
        self.axes[2..].iter().product()
    }

    /// Unpadded length of the primary data array.
    pub fn data_len(&self) -> usize {
        let pixel_bytes = (self.bitpix.unsigned_abs() / 8) as usize;
        self.width() * self.height() * self.plane_count() * pixel_bytes
    }

    /// Beam keywords of the primary header.
    pub fn beam(&self) -> Result<Beam> {
        self.header.beam().ok_or_else(|| BeamconError::MissingKeyword {
            keyword: "BMAJ/BMIN/BPA".into(),
            path: self.path.clone(),
        })
    }

    pub fn grid(&self) -> Result<GridSpacing> {
        self.header.grid().ok_or_else(|| BeamconError::MissingKeyword {
            keyword: "CDELT1/CDELT2".into(),
            path: self.path.clone(),
        })
    }

    /// Read one plane as physical values (`BZERO + BSCALE * raw`), with
    /// `BLANK` integers mapped to NaN. Rows run along `NAXIS2`.
    pub fn read_plane(&self, index: usize) -> Result<Array2<f32>> {
        let total = self.plane_count();
        if index >= total {
            return Err(BeamconError::PlaneIndexOutOfRange { index, total });
        }
        let pixels = self.width() * self.height();
        let start = index * pixels;
        let values: Vec<f64> = self
            .primary
            .read_section(&self.file, start, start + pixels)?;

        let blank = if self.bitpix > 0 {
            let (scale, zero) = extract_bscale_bzero(self.header.cards());
            extract_blank(self.header.cards()).map(|b| zero + scale * b as f64)
        } else {
            None
        };
        let values = values
            .into_iter()
            .map(|v| if Some(v) == blank { f32::NAN } else { v as f32 })
            .collect();
        Array2::from_shape_vec((self.height(), self.width()), values)
            .map_err(|e| BeamconError::InvalidFits(e.to_string()))
    }

    /// Per-channel beams from a `BEAMS` binary-table extension, if present.
    pub fn beam_table(&self) -> Result<Option<Vec<Beam>>> {
        let parsed = self.file.parsed()?;
        let Some((number, table)) = parsed
            .hdus
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, hdu)| is_beams_table(hdu))
        else {
            return Ok(None);
        };
        let [major, minor, pa] = beam_columns(table)?;

        let hdu = self.file.hdu(number)?;
        let read = |column: &BeamColumn| -> Result<Vec<f64>> {
            hdu.read_col::<f64>(&self.file, &column.name).map_err(|e| {
                BeamconError::InvalidFits(format!("BEAMS column {}: {e}", column.name))
            })
        };
        let (majors, minors, pas) = (read(&major)?, read(&minor)?, read(&pa)?);

        Ok(Some(
            majors
                .iter()
                .zip(&minors)
                .zip(&pas)
                .map(|((&bmaj, &bmin), &bpa)| {
                    Beam::new(
                        major.unit.to_arcsec(bmaj),
                        minor.unit.to_arcsec(bmin),
                        pa.unit.to_deg(bpa),
                    )
                })
                .collect(),
        ))
    }
}

fn is_beams_table(hdu: &Hdu) -> bool {
    FitsHeader::from_cards(hdu.cards.clone()).get_str("EXTNAME") == Some("BEAMS")
}

struct BeamColumn {
    name: String,
    unit: AngleUnit,
}

/// Locate `BMAJ`, `BMIN` and `BPA` and check they can be decoded.
fn beam_columns(table: &Hdu) -> Result<[BeamColumn; 3]> {
    let HduInfo::BinaryTable { naxis1, tfields, .. } = table.info else {
        return Err(BeamconError::InvalidFits(
            "BEAMS extension is not a binary table".into(),
        ));
    };
    let columns = parse_binary_table_columns(&table.cards, tfields)
        .map_err(|e| BeamconError::InvalidFits(format!("BEAMS table: {e}")))?;
    let row_bytes: usize = columns.iter().map(|c| c.byte_width).sum();
    if row_bytes != naxis1 {
        return Err(BeamconError::InvalidFits(format!(
            "BEAMS columns span {row_bytes} bytes per row, NAXIS1 is {naxis1}"
        )));
    }

    let header = FitsHeader::from_cards(table.cards.clone());
    let find = |key: &str| -> Result<BeamColumn> {
        let (n, column) = columns
            .iter()
            .enumerate()
            .find(|(_, c)| {
                c.name
                    .as_deref()
                    .is_some_and(|name| name.trim().eq_ignore_ascii_case(key))
            })
            .ok_or_else(|| BeamconError::InvalidFits(format!("BEAMS table has no {key} column")))?;
        if column.repeat != 1
            || !matches!(column.col_type, BinaryColumnType::Float | BinaryColumnType::Double)
        {
            return Err(BeamconError::InvalidFits(format!(
                "BEAMS column {key} must hold one E or D value per row"
            )));
        }
        let unit = header
            .get_str(&format!("TUNIT{}", n + 1))
            .unwrap_or_default()
            .parse()
            .unwrap_or(AngleUnit::None);
        Ok(BeamColumn {
            name: column.name.as_deref().unwrap_or(key).trim().to_string(),
            unit,
        })
    };
    Ok([find("BMAJ")?, find("BMIN")?, find("BPA")?])
}
