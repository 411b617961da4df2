//! Command-line arguments, mirroring `cdk-mintd::cli::CLIArgs`.

use clap::Parser;

#[derive(Parser)]
#[command(about = "A Nostr Wallet Connect service provider", author = env!("CARGO_PKG_AUTHORS"), version = env!("CARGO_PKG_VERSION"))]
pub struct CLIArgs {
    /// Use `<directory>` as the location of the database and config file
    #[arg(short, long, required = false)]
    pub work_dir: Option<String>,
    /// Use `<file>` as the location of the config file, overriding the
    /// default `<work_dir>/config.toml`
    #[arg(short, long, required = false)]
    pub config: Option<String>,
    /// Disable log output entirely (useful when embedding this binary)
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub no_logging: bool,
}
