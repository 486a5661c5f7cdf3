//! Storage targets of backup archives.
//!
//! Currently the following backends are implemented:
//!
//! - [FileBackend]: Archives in a local directory (`file://`).
//! - [FtpBackend]: Archives on an FTP server (`ftp://`).
//! - [SftpBackend]: Archives on an SSH server (`sftp://`).
//! - [S3Backend]: Archives as objects of an S3 bucket (`s3://`).
//!
//! All backends only ever see the archives of their own job: entries which
//! don't follow the job's [naming convention](crate::naming) are ignored.

pub mod file;
pub mod ftp;
pub mod s3;
pub mod sftp;

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use derive_more::{Display, Error, From};

pub use file::FileBackend;
pub use ftp::FtpBackend;
pub use s3::S3Backend;
pub use sftp::SftpBackend;

use crate::config::{BackupJob, ConfigError, Credentials, Target};
use crate::naming::ArchiveName;

/// A backup archive present on a backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct BackupEntry {
    /// File name or object key relative to the target location.
    #[serde(serialize_with = "serialize_display")]
    pub name: ArchiveName,
    /// Size in bytes, if known.
    pub size: Option<u64>,
    /// Modification time as reported by the backend.
    pub modified: Option<NaiveDateTime>,
}

fn serialize_display<S: serde::Serializer>(
    name: &ArchiveName,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(name)
}

impl BackupEntry {
    pub fn new(name: ArchiveName, size: Option<u64>, modified: Option<NaiveDateTime>) -> Self {
        Self {
            name,
            size,
            modified,
        }
    }

    pub fn identifier(&self) -> String {
        self.name.to_string()
    }
}

#[derive(Debug, Display, Error, From)]
/// Errors of a storage backend.
pub enum BackendError {
    /// The target is misconfigured, e.g. its directory is missing.
    #[display("{_0}")]
    #[from]
    Config(ConfigError),
    /// Connecting or logging in failed.
    #[display("Connecting to {target} failed: {reason}")]
    Connect { target: String, reason: String },
    /// Transferring or managing an archive failed.
    #[display("{operation} of {name} failed: {reason}")]
    Transport {
        operation: &'static str,
        name: String,
        reason: String,
    },
    /// Local file i/o while up- or downloading failed.
    #[display("Local i/o on {} failed: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl BackendError {
    pub(crate) fn connect<E: fmt::Display>(target: impl ToString) -> impl FnOnce(E) -> Self {
        let target = target.to_string();
        move |e| Self::Connect {
            target,
            reason: e.to_string(),
        }
    }

    pub(crate) fn transport<E: fmt::Display>(
        operation: &'static str,
        name: impl ToString,
    ) -> impl FnOnce(E) -> Self {
        let name = name.to_string();
        move |e| Self::Transport {
            operation,
            name,
            reason: e.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Generic storage backend.
pub trait Backend {
    /// Short name of the backend kind, e.g. `SFTP`.
    fn kind(&self) -> &'static str;

    /// Backups of the job present on the backend, oldest first.
    fn list(&mut self) -> Result<Vec<BackupEntry>, BackendError>;

    /// Uploads the local file `local` as `remote_name`.
    fn upload(&mut self, local: &Path, remote_name: &ArchiveName) -> Result<(), BackendError>;

    /// Downloads `entry` into `dest_dir`, returns the path of the local copy.
    fn download(&mut self, entry: &BackupEntry, dest_dir: &Path) -> Result<PathBuf, BackendError>;

    /// Deletes the backup `name`.
    ///
    /// Deleting a backup which doesn't exist isn't an error.
    fn delete(&mut self, name: &ArchiveName) -> Result<(), BackendError>;

    /// Releases the session of the backend, if any.
    ///
    /// Calling `close` more than once is allowed.
    fn close(&mut self) -> Result<(), BackendError> {
        Ok(())
    }

    /// Downloads the newest backup into `dest_dir`.
    ///
    /// Returns [None] if there is no backup at all.
    fn download_newest(
        &mut self,
        dest_dir: &Path,
    ) -> Result<Option<(BackupEntry, PathBuf)>, BackendError> {
        let Some(newest) = self.list()?.pop() else {
            return Ok(None);
        };
        let path = self.download(&newest, dest_dir)?;
        Ok(Some((newest, path)))
    }
}

/// Keeps the entries belonging to `job` and orders them oldest first.
///
/// The order is derived from the timestamp in the name, which is reliable on
/// every backend. Entries with equal timestamps keep their listing order.
pub fn job_entries<I>(job: &str, listing: I) -> Vec<BackupEntry>
where
    I: IntoIterator<Item = (String, Option<u64>, Option<NaiveDateTime>)>,
{
    let mut entries: Vec<_> = listing
        .into_iter()
        .filter_map(|(identifier, size, modified)| {
            let name = ArchiveName::parse_for_job(&identifier, job);
            if name.is_none() {
                log::trace!(target: "backend", "Ignoring foreign entry: {identifier}");
            }
            name.map(|name| BackupEntry::new(name, size, modified))
        })
        .collect();
    entries.sort_by_key(|entry| entry.name.timestamp());
    entries
}

/// Opens the backend selected by the job's target.
///
/// FTP and SFTP connect right away.
pub fn open(job: &BackupJob) -> Result<Box<dyn Backend>, BackendError> {
    let missing = |key| ConfigError::MissingKey {
        job: job.name.clone(),
        key,
    };

    let backend: Box<dyn Backend> = match (&job.target, &job.credentials) {
        (Target::File { dir }, _) => Box::new(FileBackend::new(&job.name, dir)?),
        (Target::Ftp(location), Credentials::Login(login)) => {
            Box::new(FtpBackend::connect(&job.name, location, login)?)
        }
        (Target::Ftp(_), _) => return Err(missing("ftp_user").into()),
        (Target::Sftp(location), Credentials::Login(login)) => {
            Box::new(SftpBackend::connect(&job.name, location, login)?)
        }
        (Target::Sftp(_), _) => return Err(missing("sftp_user").into()),
        (Target::S3 { bucket, prefix }, Credentials::Aws(aws)) => {
            Box::new(S3Backend::new(&job.name, bucket, prefix.as_deref(), aws)?)
        }
        (Target::S3 { .. }, _) => return Err(missing("aws-access-key-id").into()),
    };

    Ok(backend)
}

/// Step of a session a [BackendError] occurred in, see [with_session].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStep {
    Open,
    Close,
}

/// Opens the backend of `job`, runs `f` with it and closes it afterwards, no
/// matter if `f` succeeded.
///
/// Errors on opening and closing are converted by `map_err`. An error of `f`
/// takes precedence over an error on closing, which is only logged then.
pub fn with_session<T, E, M, F>(job: &BackupJob, map_err: M, f: F) -> Result<T, E>
where
    M: Fn(SessionStep, BackendError) -> E,
    F: FnOnce(&mut dyn Backend) -> Result<T, E>,
    E: fmt::Display,
{
    let backend = open(job).map_err(|e| map_err(SessionStep::Open, e))?;
    log::debug!(target: "backend", "Opened {} backend of job {}", backend.kind(), job.name);
    with_backend(backend, map_err, f)
}

/// Runs `f` with an already opened `backend` and closes it afterwards, see
/// [with_session].
pub fn with_backend<T, E, M, F>(mut backend: Box<dyn Backend>, map_err: M, f: F) -> Result<T, E>
where
    M: Fn(SessionStep, BackendError) -> E,
    F: FnOnce(&mut dyn Backend) -> Result<T, E>,
    E: fmt::Display,
{
    let res = f(backend.as_mut());
    let closed = backend.close().map_err(|e| map_err(SessionStep::Close, e));

    match (res, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), closed) => {
            if let Err(close_err) = closed {
                log::warn!(target: "backend", "Closing the backend failed: {close_err}");
            }
            Err(e)
        }
    }
}
