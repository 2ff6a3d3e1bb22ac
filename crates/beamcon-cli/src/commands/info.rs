use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use beamcon_core::io::beamlog::{beamlog_path, read_beamlog};
use beamcon_core::io::FitsImage;
use clap::Args;

#[derive(Args)]
pub struct InfoArgs {
    /// Input FITS files
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
}

pub fn run(args: &InfoArgs) -> Result<()> {
    for (i, path) in args.files.iter().enumerate() {
        if i > 0 {
            println!();
        }
        print_file(path)?;
    }
    Ok(())
}

fn print_file(path: &Path) -> Result<()> {
    let image = FitsImage::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let shape: Vec<String> = image.axes().iter().map(ToString::to_string).collect();

    println!("File:        {}", path.display());
    println!("Shape:       {}", shape.join(" x "));
    println!("Planes:      {}", image.plane_count());
    match image.header.bitpix() {
        Ok(bitpix) => println!("BITPIX:      {bitpix}"),
        Err(_) => println!("BITPIX:      unknown"),
    }
    match image.header.beam() {
        Some(beam) => println!("Beam:        {beam}"),
        None => println!("Beam:        not in header"),
    }
    match image.header.grid() {
        Some(grid) => println!("Pixel size:  {:.3}\" x {:.3}\"", grid.dx, grid.dy),
        None => println!("Pixel size:  not in header"),
    }

    if image.plane_count() > 1 {
        if let Some(table) = image.beam_table()? {
            println!("BEAMS table: {} rows", table.len());
        }
        let log = beamlog_path(path);
        if log.exists() {
            let beams = read_beamlog(&log)
                .with_context(|| format!("Failed to read beam log {}", log.display()))?;
            println!("Beam log:    {} ({} channels)", log.display(), beams.len());
        } else {
            println!("Beam log:    none");
        }
    }

    let data_mb = image.data_len() as f64 / (1024.0 * 1024.0);
    println!("Data size:   {:.1} MB", data_mb);
    Ok(())
}
