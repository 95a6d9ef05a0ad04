use std::path::PathBuf;

use clap::Args;

/// Parameters used to configure the bundle table.
#[derive(Debug, Clone, Args)]
pub struct DatabaseCliArgs {
    /// Path of the SQLite database file.
    #[arg(env = "AGGREGATOR_DATABASE_PATH", long, default_value = "aggregator.sqlite")]
    pub database_path: PathBuf,
}
