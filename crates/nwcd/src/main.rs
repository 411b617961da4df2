//! nwcd
#![warn(missing_docs)]

use anyhow::Result;
use clap::Parser;
use nwcd::cli::CLIArgs;
use nwcd::{get_work_directory, load_settings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = CLIArgs::parse();

    let work_dir = get_work_directory(&args)?;
    let settings = load_settings(&work_dir, args.config.clone().map(Into::into))?;

    nwcd::run(&work_dir, &settings, !args.no_logging).await
}
