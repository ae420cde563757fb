//! Command line arguments and shutdown coordination.

pub mod shutdown;

use std::path::PathBuf;

use clap::Parser;

pub use shutdown::ShutdownController;

#[derive(Parser, Debug)]
#[command(name = "gameap-daemon", author, version, about = "GameAP node daemon", long_about = None)]
pub struct Args {
    /// Path to the configuration file (.yaml, .yml, .cfg or .ini)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}
