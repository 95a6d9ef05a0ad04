use std::path::PathBuf;

use crate::cli::database::DatabaseCliArgs;

#[derive(Debug, Clone)]
pub struct DatabaseParams {
    pub path: PathBuf,
}

impl From<DatabaseCliArgs> for DatabaseParams {
    fn from(args: DatabaseCliArgs) -> Self {
        Self { path: args.database_path }
    }
}
