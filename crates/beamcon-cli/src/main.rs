mod commands;
mod progress;
mod summary;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "beamcon",
    about = "Convolve radio images and cubes to a common resolution"
)]
#[command(version)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convolve a set of 2-D images to one resolution
    #[command(name = "2d")]
    Images(commands::images::ImagesArgs),
    /// Convolve spectral cubes channel by channel
    #[command(name = "3d")]
    Cubes(commands::cubes::CubesArgs),
    /// Show beam, grid and shape of FITS files
    Info(commands::info::InfoArgs),
    /// Print or save a default job config as TOML
    Config(commands::config::ConfigArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match &cli.command {
        Commands::Images(args) => commands::images::run(args),
        Commands::Cubes(args) => commands::cubes::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Config(args) => commands::config::run(args),
    }
}
