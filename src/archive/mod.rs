//! Creation and extraction of backup archives.
//!
//! Every run works in its own temporary [Workspace]. The sources are staged
//! into its stage directory, which is then packed into a gzip compressed
//! tarball next to it. Restores download into the workspace and unpack the
//! archive into the stage directory before the sources apply it.

mod tarball;

use std::io;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use derive_more::{Display, Error, From};
use tempfile::TempDir;

use crate::command::CommandRunner;
use crate::config::{BackupJob, LdapConfig};
use crate::naming::ArchiveName;
use crate::sources::mysql::{self, MySql};
use crate::sources::{files, ldap, RestoreError, StagingError};

const STAGE_DIR: &str = "stage";
const WORKSPACE_PREFIX: &str = "backuptool-";

#[derive(Debug, Display, Error, From)]
/// Errors on packing or unpacking an archive.
pub enum ArchiveError {
    /// The temporary workspace couldn't be created.
    #[display("Creating the working directory failed: {_0}")]
    #[from]
    Workspace(io::Error),
    #[display("Archive i/o on {} failed: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },
}

impl ArchiveError {
    fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}

/// Temporary working directory of a single run, deleted on drop.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates a new workspace below `parent`, or the system's temp directory.
    pub fn new(parent: Option<&Path>) -> Result<Self, ArchiveError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX);
        let dir = match parent {
            Some(parent) => builder.tempdir_in(parent)?,
            None => builder.tempdir()?,
        };
        log::debug!(target: "archive", "Working directory: {}", dir.path().display());

        let workspace = Self { dir };
        std::fs::create_dir(workspace.stage()).map_err(ArchiveError::io(workspace.stage()))?;
        Ok(workspace)
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Directory holding the content of the archive.
    pub fn stage(&self) -> PathBuf {
        self.dir.path().join(STAGE_DIR)
    }
}

/// A backup archive inside of a [Workspace].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Archive {
    pub name: ArchiveName,
    pub path: PathBuf,
}

/// Builds archives of a [BackupJob] and applies them to the system.
pub struct ArchiveBuilder<'a> {
    job: &'a BackupJob,
    runner: &'a dyn CommandRunner,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(job: &'a BackupJob, runner: &'a dyn CommandRunner) -> Self {
        Self { job, runner }
    }

    /// Collects files, database dumps and the directory dump into the stage directory.
    pub fn stage(&self, workspace: &Workspace) -> Result<(), StagingError> {
        let stage = workspace.stage();

        files::stage(&self.job.files, &stage)?;
        if let Some(mysql) = &self.job.mysql {
            MySql::new(mysql).dump(self.runner, &stage)?;
        }
        if self.job.ldap.is_some() {
            ldap::dump(self.runner, &stage)?;
        }

        Ok(())
    }

    /// Packs the stage directory into `backup-<job>-<timestamp>.tar.gz`.
    pub fn pack(
        &self,
        workspace: &Workspace,
        timestamp: NaiveDateTime,
    ) -> Result<Archive, ArchiveError> {
        let name = ArchiveName::new(&self.job.name, timestamp);
        let path = workspace.path().join(name.to_string());
        log::info!(target: "archive", "Create archive {name}");

        tarball::pack(&workspace.stage(), &path)?;

        Ok(Archive { name, path })
    }

    /// Extracts a downloaded (and decrypted) archive into the stage directory.
    pub fn unpack(&self, workspace: &Workspace, archive: &Path) -> Result<(), ArchiveError> {
        log::info!(target: "archive", "Extract archive {}", archive.display());
        tarball::unpack(archive, &workspace.stage())
    }

    /// Applies an unpacked backup: files first, then databases, then the directory.
    pub fn apply(&self, workspace: &Workspace, restore_root: &Path) -> Result<(), RestoreError> {
        let stage = workspace.stage();

        files::restore(self.runner, &stage, restore_root)?;
        mysql::restore(self.runner, self.job.mysql.as_ref(), &stage)?;

        let default_ldap = LdapConfig::default();
        let ldap_config = self.job.ldap.as_ref().unwrap_or(&default_ldap);
        ldap::restore(self.runner, ldap_config, &stage)?;

        Ok(())
    }
}
