//! Sources of backup data.
//!
//! Every source stages its data into a subdirectory of the stage directory
//! and is able to apply such a staged copy back to the system:
//!
//! - [files]: Files and directories matched by glob patterns (`files/`).
//! - [mysql]: SQL dumps of MySQL databases (`mysql/`).
//! - [ldap]: Full dump of the slapd directory (`ldap/`).

use std::io;
use std::path::PathBuf;

use derive_more::{Display, Error, From};

use crate::command::CommandError;

pub mod files;
pub mod ldap;
pub mod mysql;

#[derive(Debug, Display, Error, From)]
/// Errors collecting backup data, the backup is aborted before archiving.
pub enum StagingError {
    /// A glob pattern of the job is invalid.
    #[display("Invalid file pattern {pattern}: {source}")]
    Pattern {
        pattern: String,
        source: glob::PatternError,
    },
    /// A matched path couldn't be read.
    #[display("Reading a matched path failed: {_0}")]
    #[from]
    Glob(glob::GlobError),
    /// Walking a matched directory failed.
    #[display("Walking a matched directory failed: {_0}")]
    #[from]
    Walk(walkdir::Error),
    /// Copying into the stage directory failed.
    #[display("Staging {} failed: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    /// A dump command failed.
    #[display("Dump failed: {_0}")]
    #[from]
    Command(CommandError),
}

#[derive(Debug, Display, Error, From)]
/// Errors applying a backup to the system, the system may be partially restored.
pub enum RestoreError {
    /// The backup contains database dumps, but no MySQL login is configured.
    #[display("Backup contains database dumps but mysql_user/mysql_password are not configured")]
    MissingMysqlLogin,
    /// Reading the backup or modifying the system failed.
    #[display("Restoring {} failed: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
    /// A restore command failed.
    #[display("Restore command failed: {_0}")]
    #[from]
    Command(CommandError),
}

impl StagingError {
    /// Wraps an [io::Error] together with the affected path.
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

impl RestoreError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
