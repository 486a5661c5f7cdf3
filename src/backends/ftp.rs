use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Local, NaiveDateTime};
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream};

use super::{job_entries, Backend, BackendError, BackupEntry};
use crate::config::{Login, RemoteLocation};
use crate::naming::ArchiveName;

/// Backups in a directory of an FTP server.
///
/// The directory of the target is relative to the login directory.
pub struct FtpBackend {
    job: String,
    location: RemoteLocation,
    stream: Option<FtpStream>,
}

impl FtpBackend {
    /// Connects and logs in, then changes into the target directory.
    pub fn connect(
        job: &str,
        location: &RemoteLocation,
        login: &Login,
    ) -> Result<Self, BackendError> {
        let addr = format!("{}:{}", location.host, location.port);
        log::debug!(target: "backend::ftp", "Connect to {addr} as {}", login.user);

        let mut stream = FtpStream::connect(&addr).map_err(BackendError::connect(&addr))?;
        stream
            .login(login.user.as_str(), login.password.expose())
            .map_err(BackendError::connect(&addr))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(BackendError::connect(&addr))?;
        if let Some(dir) = &location.dir {
            stream.cwd(dir).map_err(BackendError::connect(&addr))?;
        }

        Ok(Self {
            job: job.to_string(),
            location: location.clone(),
            stream: Some(stream),
        })
    }

    fn stream(&mut self) -> Result<&mut FtpStream, BackendError> {
        let target = format!("ftp://{}", self.location);
        self.stream
            .as_mut()
            .ok_or_else(|| BackendError::connect(target)("session already closed"))
    }
}

/// Parses the lines of a `LIST` response into `(name, size, modified)`.
///
/// Directories and lines which aren't understood are skipped.
pub fn parse_listing(lines: &[String]) -> Vec<(String, Option<u64>, Option<NaiveDateTime>)> {
    lines
        .iter()
        .filter_map(|line| match suppaftp::list::File::from_str(line) {
            Ok(file) if file.is_file() => Some(file),
            Ok(_) => None,
            Err(e) => {
                log::trace!(target: "backend::ftp", "Skipping listing line {line:?}: {e:?}");
                None
            }
        })
        .map(|file| {
            let modified = DateTime::<Local>::from(file.modified()).naive_local();
            (
                file.name().to_string(),
                Some(file.size() as u64),
                Some(modified),
            )
        })
        .collect()
}

impl Backend for FtpBackend {
    fn kind(&self) -> &'static str {
        "FTP"
    }

    fn list(&mut self) -> Result<Vec<BackupEntry>, BackendError> {
        let lines = self
            .stream()?
            .list(None)
            .map_err(BackendError::transport("Listing", "directory"))?;
        Ok(job_entries(&self.job, parse_listing(&lines)))
    }

    fn upload(&mut self, local: &Path, remote_name: &ArchiveName) -> Result<(), BackendError> {
        let name = remote_name.to_string();
        let file = File::open(local).map_err(BackendError::io(local))?;
        let mut reader = BufReader::new(file);

        log::debug!(target: "backend::ftp", "Upload {name}");
        self.stream()?
            .put_file(&name, &mut reader)
            .map_err(BackendError::transport("Upload", &name))?;
        Ok(())
    }

    fn download(&mut self, entry: &BackupEntry, dest_dir: &Path) -> Result<PathBuf, BackendError> {
        let name = entry.identifier();
        let dest = dest_dir.join(&name);
        let mut file = File::create(&dest).map_err(BackendError::io(&dest))?;

        log::debug!(target: "backend::ftp", "Download {name} to {}", dest.display());
        self.stream()?
            .retr(&name, |reader| {
                io::copy(reader, &mut file).map_err(FtpError::ConnectionError)
            })
            .map_err(BackendError::transport("Download", &name))?;
        Ok(dest)
    }

    fn delete(&mut self, name: &ArchiveName) -> Result<(), BackendError> {
        if !self.list()?.iter().any(|entry| entry.name == *name) {
            log::debug!(target: "backend::ftp", "Already gone: {name}");
            return Ok(());
        }

        let name = name.to_string();
        self.stream()?
            .rm(&name)
            .map_err(BackendError::transport("Deletion", &name))?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if let Some(mut stream) = self.stream.take() {
            stream
                .quit()
                .map_err(BackendError::transport("Logout", &self.location))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unix_listing() {
        let lines: Vec<String> = [
            "-rw-r--r-- 1 0 0 8192 Nov 5 2018 backup-db1-20181105000000.tar.gz",
            "drwxr-xr-x 2 0 0 4096 Nov 5 2018 somedir",
            "total 12",
        ]
        .iter()
        .map(|line| line.to_string())
        .collect();

        let files = parse_listing(&lines);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0, "backup-db1-20181105000000.tar.gz");
        assert_eq!(files[0].1, Some(8192));
    }
}
