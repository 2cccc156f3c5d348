use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// Path to a config file, equivalent to setting `LANDSCAPE__CONFIG`.
    #[clap(long)]
    pub config_path: Option<PathBuf>,
}
