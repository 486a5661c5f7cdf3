//! Orchestration of the operations of a single job.
//!
//! A backup run goes through the stages
//! `Staging → Archiving → Encrypting → Uploading`, a restore through
//! `Downloading → Decrypting → Unarchiving → Restoring`. The first failing
//! stage aborts the run, nothing is rolled back.
//!
//! Only one invocation per job is expected to run at a time, there is no
//! locking of the working directory or the target.

use std::path::PathBuf;

use chrono::Local;
use derive_more::{Display, Error, From};

use crate::archive::{ArchiveBuilder, ArchiveError, Workspace};
use crate::backends::{self, Backend, BackendError, BackupEntry, SessionStep};
use crate::command::CommandRunner;
use crate::config::{BackupJob, ConfigError, DEFAULT_RESTORE_ROOT};
use crate::crypto::{DecryptionError, EncryptionError};
use crate::naming::ArchiveName;
use crate::sources::{RestoreError, StagingError};
use crate::util::retention::Retention;

/// Stage of a job, reported with every failure.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    #[display("checking privileges")]
    Idle,
    #[display("connecting")]
    Connecting,
    #[display("staging")]
    Staging,
    #[display("archiving")]
    Archiving,
    #[display("encrypting")]
    Encrypting,
    #[display("uploading")]
    Uploading,
    #[display("listing")]
    Listing,
    #[display("downloading")]
    Downloading,
    #[display("decrypting")]
    Decrypting,
    #[display("unarchiving")]
    Unarchiving,
    #[display("restoring")]
    Restoring,
    #[display("rotating")]
    Rotating,
    #[display("deleting")]
    Deleting,
    #[display("closing")]
    Closing,
}

#[derive(Debug, Display, Error, From)]
/// Cause of a failed job.
pub enum JobErrorKind {
    /// Creating and restoring backups requires root.
    #[display("Operation requires root privileges")]
    Permission,
    #[display("{_0}")]
    #[from]
    Config(ConfigError),
    #[display("Staging failed: {_0}")]
    #[from]
    Staging(StagingError),
    #[display("{_0}")]
    #[from]
    Archive(ArchiveError),
    #[display("{_0}")]
    #[from]
    Encryption(EncryptionError),
    #[display("{_0}")]
    #[from]
    Decryption(DecryptionError),
    #[display("{_0}")]
    Transport(BackendError),
    #[display("Restore failed: {_0}")]
    #[from]
    Restore(RestoreError),
}

impl From<BackendError> for JobErrorKind {
    fn from(e: BackendError) -> Self {
        match e {
            BackendError::Config(e) => Self::Config(e),
            e => Self::Transport(e),
        }
    }
}

/// A failed job, with the stage it failed in.
#[derive(Debug, Display, Error)]
#[display("Job {job} failed while {stage}: {kind}")]
pub struct JobError {
    pub job: String,
    pub stage: Stage,
    #[error(source)]
    pub kind: JobErrorKind,
}

/// Privileges of the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privileges {
    Root,
    Unprivileged,
}

impl Privileges {
    pub fn current() -> Self {
        if nix::unistd::Uid::effective().is_root() {
            Self::Root
        } else {
            Self::Unprivileged
        }
    }
}

/// The operations offered per job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Creates a backup, optionally followed by a rotation.
    Create { rotate: bool },
    Restore,
    List,
    Rotate,
    Delete { identifier: String },
}

impl Operation {
    fn is_privileged(&self) -> bool {
        matches!(self, Self::Create { .. } | Self::Restore)
    }
}

/// Result of a successful [Operation].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created {
        archive: ArchiveName,
        rotated: Vec<ArchiveName>,
    },
    /// [None] if there was nothing to restore.
    Restored(Option<ArchiveName>),
    Listed(Vec<BackupEntry>),
    Rotated(Vec<ArchiveName>),
    Deleted(ArchiveName),
}

/// Runs the operations of a [BackupJob].
pub struct Job<'a> {
    config: &'a BackupJob,
    runner: &'a dyn CommandRunner,
    privileges: Privileges,
    workdir: Option<PathBuf>,
    restore_root: PathBuf,
}

impl<'a> Job<'a> {
    /// A job with the privileges of the current process.
    pub fn new(config: &'a BackupJob, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            privileges: Privileges::current(),
            workdir: None,
            restore_root: PathBuf::from(DEFAULT_RESTORE_ROOT),
        }
    }

    pub fn with_privileges(mut self, privileges: Privileges) -> Self {
        self.privileges = privileges;
        self
    }

    /// Parent directory of the temporary working directories.
    pub fn with_workdir(mut self, workdir: Option<PathBuf>) -> Self {
        self.workdir = workdir;
        self
    }

    pub fn with_restore_root(mut self, restore_root: impl Into<PathBuf>) -> Self {
        self.restore_root = restore_root.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    fn at<E: Into<JobErrorKind>>(&self, stage: Stage) -> impl FnOnce(E) -> JobError + '_ {
        move |e| JobError {
            job: self.config.name.clone(),
            stage,
            kind: e.into(),
        }
    }

    fn enter(&self, stage: Stage) {
        log::info!(target: "job", "{}: {stage}", self.config.name);
    }

    fn require_privileges(&self) -> Result<(), JobError> {
        match self.privileges {
            Privileges::Root => Ok(()),
            Privileges::Unprivileged => Err(self.at(Stage::Idle)(JobErrorKind::Permission)),
        }
    }

    fn workspace(&self, stage: Stage) -> Result<Workspace, JobError> {
        Workspace::new(self.workdir.as_deref()).map_err(self.at(stage))
    }

    /// Connects to the target, runs `operation` and closes the connection
    /// again, also if the operation failed.
    pub fn execute(&self, operation: &Operation) -> Result<Outcome, JobError> {
        if operation.is_privileged() {
            self.require_privileges()?;
        }

        self.enter(Stage::Connecting);
        let map_err = |step, e: BackendError| match step {
            SessionStep::Open => self.at(Stage::Connecting)(e),
            SessionStep::Close => self.at(Stage::Closing)(e),
        };
        backends::with_session(self.config, map_err, |backend| {
            self.dispatch(backend, operation)
        })
    }

    fn dispatch(
        &self,
        backend: &mut dyn Backend,
        operation: &Operation,
    ) -> Result<Outcome, JobError> {
        match operation {
            Operation::Create { rotate } => {
                let archive = self.create(backend)?;
                let rotated = if *rotate {
                    self.rotate(backend)?
                } else {
                    Vec::new()
                };
                Ok(Outcome::Created { archive, rotated })
            }
            Operation::Restore => self.restore(backend).map(Outcome::Restored),
            Operation::List => self.list(backend).map(Outcome::Listed),
            Operation::Rotate => self.rotate(backend).map(Outcome::Rotated),
            Operation::Delete { identifier } => {
                self.delete(backend, identifier).map(Outcome::Deleted)
            }
        }
    }

    /// Creates a backup and uploads it, returns the name of the uploaded archive.
    pub fn create(&self, backend: &mut dyn Backend) -> Result<ArchiveName, JobError> {
        self.require_privileges()?;
        log::info!(target: "job", "Create backup of job {}", self.config.name);

        let workspace = self.workspace(Stage::Staging)?;
        let builder = ArchiveBuilder::new(self.config, self.runner);

        self.enter(Stage::Staging);
        builder.stage(&workspace).map_err(self.at(Stage::Staging))?;

        self.enter(Stage::Archiving);
        let timestamp = Local::now().naive_local();
        let archive = builder
            .pack(&workspace, timestamp)
            .map_err(self.at(Stage::Archiving))?;

        self.enter(Stage::Encrypting);
        let upload = self
            .config
            .encryption
            .encrypt(self.runner, &archive.path)
            .map_err(self.at(Stage::Encrypting))?;
        let name = if self.config.encryption.is_enabled() {
            archive.name.encrypted()
        } else {
            archive.name
        };

        self.enter(Stage::Uploading);
        backend
            .upload(&upload, &name)
            .map_err(self.at(Stage::Uploading))?;

        log::info!(target: "job", "Uploaded {name} to {} backend", backend.kind());
        Ok(name)
    }

    /// Restores the newest backup.
    ///
    /// Returns [None] without touching the system if there is no backup.
    pub fn restore(&self, backend: &mut dyn Backend) -> Result<Option<ArchiveName>, JobError> {
        self.require_privileges()?;

        let workspace = self.workspace(Stage::Downloading)?;
        let builder = ArchiveBuilder::new(self.config, self.runner);

        self.enter(Stage::Downloading);
        let Some((entry, downloaded)) = backend
            .download_newest(workspace.path())
            .map_err(self.at(Stage::Downloading))?
        else {
            log::info!(target: "job", "Nothing to restore for job {}", self.config.name);
            return Ok(None);
        };
        log::info!(target: "job", "Restore {} of job {}", entry.name, self.config.name);

        self.enter(Stage::Decrypting);
        let archive = self
            .config
            .encryption
            .decrypt(self.runner, &downloaded)
            .map_err(self.at(Stage::Decrypting))?;

        self.enter(Stage::Unarchiving);
        builder
            .unpack(&workspace, &archive)
            .map_err(self.at(Stage::Unarchiving))?;

        self.enter(Stage::Restoring);
        builder
            .apply(&workspace, &self.restore_root)
            .map_err(self.at(Stage::Restoring))?;

        log::info!(target: "job", "Restored {} of job {}", entry.name, self.config.name);
        Ok(Some(entry.name))
    }

    /// Backups of the job, oldest first.
    pub fn list(&self, backend: &mut dyn Backend) -> Result<Vec<BackupEntry>, JobError> {
        self.enter(Stage::Listing);
        backend.list().map_err(self.at(Stage::Listing))
    }

    /// Deletes all but the configured number of newest backups.
    ///
    /// Returns the deleted backups, oldest first.
    pub fn rotate(&self, backend: &mut dyn Backend) -> Result<Vec<ArchiveName>, JobError> {
        let entries = self.list(backend)?;

        self.enter(Stage::Rotating);
        let retention = Retention::from(self.config.retention);
        let outdated = retention.select_for_deletion(entries);

        for entry in &outdated {
            log::info!(target: "job", "Delete outdated backup {}", entry.name);
            backend
                .delete(&entry.name)
                .map_err(self.at(Stage::Rotating))?;
        }

        Ok(outdated.into_iter().map(|entry| entry.name).collect())
    }

    /// Deletes a single backup of the job.
    ///
    /// Identifiers which aren't a backup of this job are refused.
    pub fn delete(
        &self,
        backend: &mut dyn Backend,
        identifier: &str,
    ) -> Result<ArchiveName, JobError> {
        self.enter(Stage::Deleting);
        let name = ArchiveName::parse_for_job(identifier, &self.config.name).ok_or_else(|| {
            self.at(Stage::Deleting)(ConfigError::ForeignBackup {
                job: self.config.name.clone(),
                identifier: identifier.to_string(),
            })
        })?;

        log::info!(target: "job", "Delete backup {name}");
        backend.delete(&name).map_err(self.at(Stage::Deleting))?;
        Ok(name)
    }
}
