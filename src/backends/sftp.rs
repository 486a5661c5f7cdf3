use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use ssh2::{ErrorCode, FileStat, Session, Sftp};

use super::{job_entries, Backend, BackendError, BackupEntry};
use crate::config::{Login, RemoteLocation};
use crate::naming::ArchiveName;

/// SFTP status code of a missing file.
const SSH_FX_NO_SUCH_FILE: i32 = 2;

/// Backups in a directory of an SSH server, accessed over SFTP.
///
/// The directory of the target is relative to the login directory.
pub struct SftpBackend {
    job: String,
    dir: PathBuf,
    session: Option<(Session, Sftp)>,
}

impl SftpBackend {
    /// Connects and authenticates with password.
    pub fn connect(
        job: &str,
        location: &RemoteLocation,
        login: &Login,
    ) -> Result<Self, BackendError> {
        let addr = format!("{}:{}", location.host, location.port);
        log::debug!(target: "backend::sftp", "Connect to {addr} as {}", login.user);

        let tcp = TcpStream::connect(&addr).map_err(BackendError::connect(&addr))?;
        let mut session = Session::new().map_err(BackendError::connect(&addr))?;
        session.set_tcp_stream(tcp);
        session.handshake().map_err(BackendError::connect(&addr))?;
        session
            .userauth_password(&login.user, login.password.expose())
            .map_err(BackendError::connect(&addr))?;
        let sftp = session.sftp().map_err(BackendError::connect(&addr))?;

        let dir = location
            .dir
            .as_deref()
            .map_or_else(|| PathBuf::from("."), PathBuf::from);

        Ok(Self {
            job: job.to_string(),
            dir,
            session: Some((session, sftp)),
        })
    }

    fn sftp(&self) -> Result<&Sftp, BackendError> {
        self.session
            .as_ref()
            .map(|(_, sftp)| sftp)
            .ok_or_else(|| BackendError::connect(self.dir.display())("session already closed"))
    }
}

fn is_missing(e: &ssh2::Error) -> bool {
    e.code() == ErrorCode::SFTP(SSH_FX_NO_SUCH_FILE)
}

/// Regular files of a `readdir` listing as `(name, size, modified)`, the
/// modification time in local time.
pub fn parse_listing(
    listing: Vec<(PathBuf, FileStat)>,
) -> Vec<(String, Option<u64>, Option<NaiveDateTime>)> {
    listing
        .into_iter()
        .filter(|(_, stat)| stat.is_file())
        .filter_map(|(path, stat)| {
            let name = path.file_name()?.to_str()?.to_string();
            let modified = stat
                .mtime
                .and_then(|mtime| DateTime::from_timestamp(mtime as i64, 0))
                .map(|time| DateTime::<Local>::from(time).naive_local());
            Some((name, stat.size, modified))
        })
        .collect()
}

impl Backend for SftpBackend {
    fn kind(&self) -> &'static str {
        "SFTP"
    }

    fn list(&mut self) -> Result<Vec<BackupEntry>, BackendError> {
        let listing = self
            .sftp()?
            .readdir(&self.dir)
            .map_err(BackendError::transport("Listing", self.dir.display()))?;

        Ok(job_entries(&self.job, parse_listing(listing)))
    }

    fn upload(&mut self, local: &Path, remote_name: &ArchiveName) -> Result<(), BackendError> {
        let remote = self.dir.join(remote_name.to_string());
        let mut file = File::open(local).map_err(BackendError::io(local))?;

        log::debug!(target: "backend::sftp", "Upload {}", remote.display());
        let mut remote_file = self
            .sftp()?
            .create(&remote)
            .map_err(BackendError::transport("Upload", remote.display()))?;
        io::copy(&mut file, &mut remote_file)
            .map_err(BackendError::transport("Upload", remote.display()))?;
        Ok(())
    }

    fn download(&mut self, entry: &BackupEntry, dest_dir: &Path) -> Result<PathBuf, BackendError> {
        let name = entry.identifier();
        let remote = self.dir.join(&name);
        let dest = dest_dir.join(&name);

        log::debug!(target: "backend::sftp", "Download {} to {}", remote.display(), dest.display());
        let mut remote_file = self
            .sftp()?
            .open(&remote)
            .map_err(BackendError::transport("Download", remote.display()))?;
        let mut file = File::create(&dest).map_err(BackendError::io(&dest))?;
        io::copy(&mut remote_file, &mut file)
            .map_err(BackendError::transport("Download", remote.display()))?;
        Ok(dest)
    }

    fn delete(&mut self, name: &ArchiveName) -> Result<(), BackendError> {
        let remote = self.dir.join(name.to_string());
        match self.sftp()?.unlink(&remote) {
            Ok(()) => Ok(()),
            Err(e) if is_missing(&e) => {
                log::debug!(target: "backend::sftp", "Already gone: {}", remote.display());
                Ok(())
            }
            Err(e) => Err(BackendError::transport("Deletion", remote.display())(e)),
        }
    }

    fn close(&mut self) -> Result<(), BackendError> {
        if let Some((session, sftp)) = self.session.take() {
            drop(sftp);
            session
                .disconnect(None, "backup finished", None)
                .map_err(BackendError::transport("Logout", self.dir.display()))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    /// Mode bits of a regular file and a directory.
    const S_IFREG: u32 = 0o100644;
    const S_IFDIR: u32 = 0o040755;

    fn stat(perm: u32, size: u64, mtime: u64) -> FileStat {
        FileStat {
            size: Some(size),
            uid: None,
            gid: None,
            perm: Some(perm),
            atime: None,
            mtime: Some(mtime),
        }
    }

    #[test]
    fn parses_regular_files_in_local_time() {
        let mtime = 1_704_067_200;
        let listing = vec![
            (
                PathBuf::from("backups/backup-db1-20240101000000.tar.gz"),
                stat(S_IFREG, 2_097_152, mtime),
            ),
            (
                PathBuf::from("backups/backup-db1-20240102000000.tar.gz"),
                stat(S_IFDIR, 4096, mtime),
            ),
            (PathBuf::from("backups/notes.txt"), stat(S_IFREG, 1, mtime)),
        ];

        let files = parse_listing(listing);

        assert_eq!(files.len(), 2);
        let (name, size, modified) = &files[0];
        assert_eq!(name, "backup-db1-20240101000000.tar.gz");
        assert_eq!(*size, Some(2_097_152));
        let expected = Local.timestamp_opt(mtime as i64, 0).unwrap().naive_local();
        assert_eq!(*modified, Some(expected));
        assert_eq!(files[1].0, "notes.txt");
    }

    #[test]
    fn missing_attributes_stay_unknown() {
        let listing = vec![(
            PathBuf::from("backup-db1-20240101000000.tar.gz"),
            FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: Some(S_IFREG),
                atime: None,
                mtime: None,
            },
        )];

        assert_eq!(
            parse_listing(listing),
            [("backup-db1-20240101000000.tar.gz".to_string(), None, None)]
        );
    }
}
