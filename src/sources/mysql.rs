//! Backup of MySQL databases using `mysqldump`.

use std::fs;
use std::path::{Path, PathBuf};

use super::{RestoreError, StagingError};
use crate::command::{CommandLine, CommandRunner};
use crate::config::MysqlConfig;

pub const MYSQL_DIR: &str = "mysql";
const DUMP_EXTENSION: &str = "sql";

/// Dumps and imports the databases of a [MysqlConfig].
pub struct MySql<'a> {
    config: &'a MysqlConfig,
}

impl<'a> MySql<'a> {
    pub fn new(config: &'a MysqlConfig) -> Self {
        Self { config }
    }

    fn dump_path(dump_dest: &Path, database: &str) -> PathBuf {
        dump_dest.join(format!("{database}.{DUMP_EXTENSION}"))
    }

    /// Dumps every configured database to `mysql/<database>.sql`.
    pub fn dump(&self, runner: &dyn CommandRunner, stage: &Path) -> Result<(), StagingError> {
        if self.config.databases.is_empty() {
            return Ok(());
        }

        let dump_dest = stage.join(MYSQL_DIR);
        fs::create_dir_all(&dump_dest).map_err(StagingError::io(&dump_dest))?;

        for database in &self.config.databases {
            let dump_file = Self::dump_path(&dump_dest, database);
            log::info!(target: "sources::mysql", "Create database dump of: {database}");
            log::debug!(target: "sources::mysql", "Save database dump at: {}", dump_file.display());

            let dump = CommandLine::new("mysqldump")
                .arg("-u")
                .arg(&self.config.user)
                .secret_arg("-p", &self.config.password)
                .arg(database)
                .stdout_to(dump_file);
            runner.run(&dump)?;
        }

        log::info!(target: "sources::mysql", "Finished database dumps.");
        Ok(())
    }
}

/// Lists the `(database, dump file)` pairs of an unpacked backup, ordered by name.
pub fn dumps(stage: &Path) -> Result<Vec<(String, PathBuf)>, RestoreError> {
    let dump_dest = stage.join(MYSQL_DIR);
    if !dump_dest.is_dir() {
        return Ok(Vec::new());
    }

    let mut dumps = Vec::new();
    for entry in fs::read_dir(&dump_dest).map_err(RestoreError::io(&dump_dest))? {
        let path = entry.map_err(RestoreError::io(&dump_dest))?.path();
        if path.extension().is_none_or(|ext| ext != DUMP_EXTENSION) {
            continue;
        }
        let Some(database) = path.file_stem().and_then(|stem| stem.to_str()) else {
            log::warn!(target: "sources::mysql", "Skipping dump with invalid name: {}", path.display());
            continue;
        };
        dumps.push((database.to_string(), path.clone()));
    }
    dumps.sort();

    Ok(dumps)
}

/// Imports every dump of an unpacked backup into the database it was taken from.
///
/// Returns the number of imported databases.
pub fn restore(
    runner: &dyn CommandRunner,
    config: Option<&MysqlConfig>,
    stage: &Path,
) -> Result<usize, RestoreError> {
    let dumps = dumps(stage)?;
    if dumps.is_empty() {
        return Ok(0);
    }
    let config = config.ok_or(RestoreError::MissingMysqlLogin)?;

    for (database, dump_file) in &dumps {
        log::info!(target: "sources::mysql", "Import database dump of: {database}");
        let import = CommandLine::new("mysql")
            .arg("-u")
            .arg(&config.user)
            .secret_arg("-p", &config.password)
            .arg(database)
            .stdin_from(dump_file);
        runner.run(&import)?;
    }

    Ok(dumps.len())
}
