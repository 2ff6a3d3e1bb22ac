use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fitsio::bintable::{
    build_binary_table_cards, serialize_binary_table, BinaryColumnData, BinaryColumnDescriptor,
    BinaryColumnType,
};
use fitsio::compat::fitsfile::FitsFile;
use fitsio::header::{serialize_header, Card};
use fitsio::image::serialize_image_f32;
use fitsio::image_writer::ImageWriter;
use ndarray::Array2;
use tracing::debug;

use crate::beam::Beam;
use crate::error::{BeamconError, Result};
use crate::io::fits::{FitsHeader, FitsImage, HeaderValue};

/// Outputs are always `BITPIX = -32`.
const OUTPUT_BITPIX: i64 = -32;
const OUTPUT_PIXEL_BYTES: usize = 4;

/// Cards the image writer derives from the shape itself.
fn is_structural(keyword: &str) -> bool {
    matches!(keyword, "SIMPLE" | "BITPIX" | "NAXIS" | "EXTEND" | "END")
        || keyword
            .strip_prefix("NAXIS")
            .is_some_and(|n| n.parse::<u32>().is_ok())
}

/// Header for a convolved output: the input header with 32-bit float
/// pixels and the beam keywords replaced.
pub fn output_header(input: &FitsHeader, beam: &Beam) -> Result<FitsHeader> {
    let mut header = input.clone();
    header.set("BITPIX", HeaderValue::Integer(OUTPUT_BITPIX))?;
    for keyword in ["BSCALE", "BZERO", "BLANK"] {
        header.remove(keyword);
    }
    header.set_beam(beam)?;
    Ok(header)
}

/// Streams a primary HDU to disk, plane by plane.
pub struct FitsWriter {
    image: ImageWriter<BufWriter<File>>,
    path: PathBuf,
    plane_shape: (usize, usize),
    planes_expected: usize,
    planes_written: usize,
}

impl FitsWriter {
    /// Create the file and write `header`, whose axes fix the data size.
    ///
    /// An `EXTEND` card in `header` is moved to directly after the axes.
    pub fn create(path: &Path, header: &FitsHeader) -> Result<Self> {
        let axes = header.axes()?;
        if axes.len() < 2 {
            return Err(BeamconError::InvalidFits(
                "output header needs at least 2 axes".into(),
            ));
        }
        let extend = header
            .get("EXTEND")
            .map(|value| Card::new("EXTEND", value.clone()))
            .transpose()?;
        let extra: Vec<Card> = extend
            .into_iter()
            .chain(
                header
                    .cards()
                    .iter()
                    .filter(|card| !is_structural(card.keyword_str()))
                    .cloned(),
            )
            .collect();

        let sink = BufWriter::new(File::create(path)?);
        let image = ImageWriter::primary(sink, OUTPUT_BITPIX, &axes, &extra)?;
        Ok(Self {
            image,
            path: path.to_path_buf(),
            plane_shape: (axes[1], axes[0]),
            planes_expected: axes[2..].iter().product(),
            planes_written: 0,
        })
    }

    pub fn write_plane(&mut self, plane: &Array2<f32>) -> Result<()> {
        check_shape(plane, self.plane_shape)?;
        if self.planes_written >= self.planes_expected {
            return Err(BeamconError::PlaneIndexOutOfRange {
                index: self.planes_written,
                total: self.planes_expected,
            });
        }
        self.image.write_iter(plane.iter().copied())?;
        self.planes_written += 1;
        Ok(())
    }

    /// Pad the data unit, append a `BEAMS` table holding one beam per
    /// channel if given, and return where each plane lives in the file.
    pub fn finish(self, beam_table: Option<&[Beam]>) -> Result<OutputLayout> {
        if self.planes_written != self.planes_expected {
            return Err(BeamconError::InvalidFits(format!(
                "{}: wrote {} of {} planes",
                self.path.display(),
                self.planes_written,
                self.planes_expected
            )));
        }
        let mut sink = self.image.finish()?;
        if let Some(beams) = beam_table {
            sink.write_all(&beam_table_hdu(beams)?)?;
        }
        sink.flush()?;
        drop(sink);

        let data_offset = FitsFile::open(&self.path)?.parsed()?.primary().data_start;
        let (height, width) = self.plane_shape;
        Ok(OutputLayout {
            path: self.path,
            data_offset,
            width,
            height,
            planes: self.planes_expected,
        })
    }
}

/// Location of the pixel data of a written file, for in-place plane updates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    pub path: PathBuf,
    pub data_offset: usize,
    pub width: usize,
    pub height: usize,
    pub planes: usize,
}

impl OutputLayout {
    fn plane_bytes(&self) -> usize {
        self.width * self.height * OUTPUT_PIXEL_BYTES
    }

    /// Overwrite plane `index`. Opens, seeks and releases its own handle,
    /// so ranks can write disjoint planes of one file concurrently.
    pub fn write_plane(&self, index: usize, plane: &Array2<f32>) -> Result<()> {
        if index >= self.planes {
            return Err(BeamconError::PlaneIndexOutOfRange {
                index,
                total: self.planes,
            });
        }
        check_shape(plane, (self.height, self.width))?;
        let samples: Vec<f32> = plane.iter().copied().collect();
        let mut bytes = serialize_image_f32(&samples);
        bytes.truncate(self.plane_bytes());

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(
            (self.data_offset + index * self.plane_bytes()) as u64,
        ))?;
        file.write_all(&bytes)?;
        debug!(path = %self.path.display(), index, "Wrote plane");
        Ok(())
    }
}

/// Write a single 2-D image file.
pub fn write_image(path: &Path, header: &FitsHeader, plane: &Array2<f32>) -> Result<()> {
    let mut writer = FitsWriter::create(path, header)?;
    writer.write_plane(plane)?;
    writer.finish(None)?;
    Ok(())
}

/// Create a cube output holding a copy of every input plane.
///
/// Planes are overwritten later through the returned layout. When
/// `beam_table` is given it is appended as a `BEAMS` extension.
pub fn initialise_cube(
    path: &Path,
    header: &FitsHeader,
    source: &FitsImage,
    beam_table: Option<&[Beam]>,
) -> Result<OutputLayout> {
    let mut header = header.clone();
    if beam_table.is_some() {
        header.set("EXTEND", HeaderValue::Logical(true))?;
    }
    let mut writer = FitsWriter::create(path, &header)?;
    for index in 0..source.plane_count() {
        writer.write_plane(&source.read_plane(index)?)?;
    }
    let layout = writer.finish(beam_table)?;
    debug!(path = %path.display(), planes = layout.planes, "Initialised output cube");
    Ok(layout)
}

/// `BEAMS` extension bytes: `CHAN` (1J), `BMAJ`/`BMIN` (1E, arcsec) and
/// `BPA` (1E, deg).
fn beam_table_hdu(beams: &[Beam]) -> Result<Vec<u8>> {
    let column = |name: &str, col_type: BinaryColumnType| BinaryColumnDescriptor {
        name: Some(name.to_string()),
        repeat: 1,
        col_type,
        byte_width: 4,
        tdim: None,
    };
    let columns = [
        column("CHAN", BinaryColumnType::Int),
        column("BMAJ", BinaryColumnType::Float),
        column("BMIN", BinaryColumnType::Float),
        column("BPA", BinaryColumnType::Float),
    ];
    let data = [
        BinaryColumnData::Int((0..beams.len()).map(|chan| chan as i32).collect()),
        BinaryColumnData::Float(beams.iter().map(|b| b.major as f32).collect()),
        BinaryColumnData::Float(beams.iter().map(|b| b.minor as f32).collect()),
        BinaryColumnData::Float(beams.iter().map(|b| b.pa as f32).collect()),
    ];

    let mut cards = build_binary_table_cards(&columns, beams.len(), 0)?;
    for (keyword, text) in [
        ("TUNIT2", "arcsec"),
        ("TUNIT3", "arcsec"),
        ("TUNIT4", "deg"),
        ("EXTNAME", "BEAMS"),
    ] {
        cards.push(Card::new(keyword, HeaderValue::String(text.into()))?);
    }
    cards.push(Card::new("NCHAN", HeaderValue::Integer(beams.len() as i64))?);
    cards.push(Card::new("NPOL", HeaderValue::Integer(1))?);

    let mut bytes = serialize_header(&cards)?;
    bytes.extend(serialize_binary_table(&columns, &data, beams.len())?);
    Ok(bytes)
}

fn check_shape(plane: &Array2<f32>, expected: (usize, usize)) -> Result<()> {
    if plane.dim() != expected {
        return Err(BeamconError::InvalidFits(format!(
            "plane shape {:?} does not match output shape {:?}",
            plane.dim(),
            expected
        )));
    }
    Ok(())
}
