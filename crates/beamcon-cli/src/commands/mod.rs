pub mod config;
pub mod cubes;
pub mod images;
pub mod info;
pub mod job;
