pub mod beamlog;
pub mod fits;
pub mod fits_writer;
pub mod naming;

pub use fits::{FitsHeader, FitsImage, HeaderValue};
pub use fits_writer::{initialise_cube, output_header, write_image, FitsWriter, OutputLayout};
