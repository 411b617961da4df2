//! Environment variable names, mirroring `cdk-mintd::env_vars`.

/// Overrides the work directory where `config.toml` and the SQLite database
/// live.
pub const ENV_WORK_DIR: &str = "NWCD_WORK_DIR";
/// Overrides `[info] relay`.
pub const ENV_RELAY: &str = "NWCD_RELAY";
/// Overrides `[info] relay_alias`.
pub const ENV_RELAY_ALIAS: &str = "NWCD_RELAY_ALIAS";
/// Overrides `[info] alias`.
pub const ENV_ALIAS: &str = "NWCD_ALIAS";
