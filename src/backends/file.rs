use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use super::{job_entries, Backend, BackendError, BackupEntry};
use crate::config::ConfigError;
use crate::naming::ArchiveName;

/// Backups in a local (or mounted) directory.
#[derive(Debug)]
pub struct FileBackend {
    job: String,
    dir: PathBuf,
}

impl FileBackend {
    /// Fails with [ConfigError::TargetDirMissing] if `dir` isn't a directory.
    pub fn new(job: &str, dir: &Path) -> Result<Self, BackendError> {
        if !dir.is_dir() {
            return Err(ConfigError::TargetDirMissing(dir.to_path_buf()).into());
        }

        Ok(Self {
            job: job.to_string(),
            dir: dir.to_path_buf(),
        })
    }
}

impl Backend for FileBackend {
    fn kind(&self) -> &'static str {
        "FILE"
    }

    fn list(&mut self) -> Result<Vec<BackupEntry>, BackendError> {
        let mut listing = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(BackendError::io(&self.dir))? {
            let entry = entry.map_err(BackendError::io(&self.dir))?;
            let metadata = entry.metadata().map_err(BackendError::io(entry.path()))?;
            if !metadata.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };

            let modified = metadata
                .modified()
                .ok()
                .map(|time| DateTime::<Local>::from(time).naive_local());
            listing.push((name, Some(metadata.len()), modified));
        }

        Ok(job_entries(&self.job, listing))
    }

    fn upload(&mut self, local: &Path, remote_name: &ArchiveName) -> Result<(), BackendError> {
        let dest = self.dir.join(remote_name.to_string());
        log::debug!(target: "backend::file", "Copy {} to {}", local.display(), dest.display());

        let mut src = File::open(local).map_err(BackendError::io(local))?;
        // An archive of the same name is never replaced.
        let mut file = File::create_new(&dest).map_err(BackendError::io(&dest))?;
        io::copy(&mut src, &mut file).map_err(BackendError::io(&dest))?;
        Ok(())
    }

    fn download(&mut self, entry: &BackupEntry, dest_dir: &Path) -> Result<PathBuf, BackendError> {
        let identifier = entry.identifier();
        let src = self.dir.join(&identifier);
        let dest = dest_dir.join(&identifier);
        log::debug!(target: "backend::file", "Copy {} to {}", src.display(), dest.display());
        fs::copy(&src, &dest).map_err(BackendError::io(&src))?;
        Ok(dest)
    }

    fn delete(&mut self, name: &ArchiveName) -> Result<(), BackendError> {
        let path = self.dir.join(name.to_string());
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!(target: "backend::file", "Already gone: {}", path.display());
                Ok(())
            }
            Err(e) => Err(BackendError::io(path)(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn name(job: &str, day: u32) -> ArchiveName {
        let ts = NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        ArchiveName::new(job, ts)
    }

    #[test]
    fn missing_directory_is_a_config_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FileBackend::new("db1", &tmp.path().join("nope")).unwrap_err();
        assert!(matches!(
            err,
            BackendError::Config(ConfigError::TargetDirMissing(_))
        ));
    }

    #[test]
    fn lists_only_own_backups_oldest_first() {
        let tmp = tempfile::tempdir().unwrap();
        for file in [
            "backup-db1-20240103000000.tar.gz",
            "backup-db1-20240101000000.tar.gz",
            "backup-db2-20240102000000.tar.gz",
            "existing_backup.tar.gz",
        ] {
            fs::write(tmp.path().join(file), "x").unwrap();
        }
        fs::create_dir(tmp.path().join("backup-db1-20240102000000.tar.gz")).unwrap();

        let mut backend = FileBackend::new("db1", tmp.path()).unwrap();
        let entries = backend.list().unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, name("db1", 1));
        assert_eq!(entries[1].name, name("db1", 3));
        assert_eq!(entries[0].size, Some(1));
    }

    #[test]
    fn upload_download_delete() {
        let target = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let archive = local.path().join("archive");
        fs::write(&archive, "content").unwrap();

        let mut backend = FileBackend::new("db1", target.path()).unwrap();
        backend.upload(&archive, &name("db1", 1)).unwrap();
        let entries = backend.list().unwrap();
        assert_eq!(entries.len(), 1);

        let dest = tempfile::tempdir().unwrap();
        let downloaded = backend.download(&entries[0], dest.path()).unwrap();
        assert_eq!(fs::read_to_string(downloaded).unwrap(), "content");

        backend.delete(&name("db1", 1)).unwrap();
        assert!(backend.list().unwrap().is_empty());
        // Deleting again is a no-op.
        backend.delete(&name("db1", 1)).unwrap();
    }

    #[test]
    fn upload_never_replaces_an_archive() {
        let target = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let first = local.path().join("first");
        let second = local.path().join("second");
        fs::write(&first, "first").unwrap();
        fs::write(&second, "second").unwrap();

        let mut backend = FileBackend::new("db1", target.path()).unwrap();
        backend.upload(&first, &name("db1", 1)).unwrap();
        let err = backend.upload(&second, &name("db1", 1)).unwrap_err();

        assert!(matches!(
            err,
            BackendError::Io { ref source, .. } if source.kind() == io::ErrorKind::AlreadyExists
        ));
        let uploaded = target.path().join(name("db1", 1).to_string());
        assert_eq!(fs::read_to_string(uploaded).unwrap(), "first");
    }

    #[test]
    fn download_newest_on_empty_target() {
        let target = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let mut backend = FileBackend::new("db1", target.path()).unwrap();
        assert!(backend.download_newest(dest.path()).unwrap().is_none());
    }
}
