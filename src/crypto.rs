//! Public key encryption of archives using `gpg`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use derive_more::{Display, Error};

use crate::command::{CommandError, CommandLine, CommandRunner};

const GPG_SUFFIX: &str = "gpg";

/// Encryption setting of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Encryption {
    /// Archives are uploaded as they are.
    Disabled,
    /// Archives are encrypted for the recipient `key_id`.
    Gpg { key_id: String },
}

#[derive(Debug, Display, Error)]
/// Errors on encryption, an archive is never uploaded unencrypted in case of one.
pub enum EncryptionError {
    /// `gpg` failed.
    #[display("GPG encryption was not successful: {_0}")]
    Gpg(CommandError),
    /// `gpg` claimed success but produced no file.
    #[display("GPG encryption produced no output: {}", _0.display())]
    MissingOutput(#[error(ignore)] PathBuf),
}

#[derive(Debug, Display, Error)]
/// Errors on decryption of a downloaded archive.
pub enum DecryptionError {
    /// `gpg` failed, e.g. due to a missing secret key or corrupt data.
    #[display("GPG decryption was not successful: {_0}")]
    Gpg(CommandError),
    /// `gpg` claimed success but produced no file.
    #[display("GPG decryption produced no output: {}", _0.display())]
    MissingOutput(#[error(ignore)] PathBuf),
}

/// Path of the encrypted sibling of `archive`.
pub fn encrypted_path(archive: &Path) -> PathBuf {
    let mut path = OsString::from(archive.as_os_str());
    path.push(".");
    path.push(GPG_SUFFIX);
    PathBuf::from(path)
}

/// Returns if the file name of `path` marks it as encrypted.
pub fn is_encrypted(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == GPG_SUFFIX)
}

impl Encryption {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Gpg { .. })
    }

    /// Encrypts `archive` and returns the path of the file to upload.
    ///
    /// Without encryption this is `archive` itself.
    pub fn encrypt(
        &self,
        runner: &dyn CommandRunner,
        archive: &Path,
    ) -> Result<PathBuf, EncryptionError> {
        let Self::Gpg { key_id } = self else {
            return Ok(archive.to_path_buf());
        };

        let encrypted = encrypted_path(archive);
        log::info!(target: "crypto", "Encrypt {} for key {key_id}", archive.display());

        let gpg = CommandLine::new("gpg")
            .args(["--batch", "--yes", "--trust-model", "always"])
            .arg("--recipient")
            .arg(key_id)
            .arg("--output")
            .arg(&encrypted)
            .arg("--encrypt")
            .arg(archive);
        runner.run(&gpg).map_err(EncryptionError::Gpg)?;

        if !encrypted.is_file() {
            return Err(EncryptionError::MissingOutput(encrypted));
        }
        log::debug!(target: "crypto", "Encrypted archive: {}", encrypted.display());

        Ok(encrypted)
    }

    /// Decrypts a downloaded archive if its name ends with `.gpg`.
    ///
    /// The secret key is looked up by `gpg` itself, hence this also works for
    /// backups created before encryption got disabled.
    pub fn decrypt(
        &self,
        runner: &dyn CommandRunner,
        downloaded: &Path,
    ) -> Result<PathBuf, DecryptionError> {
        if !is_encrypted(downloaded) {
            if self.is_enabled() {
                log::warn!(target: "crypto", "Backup is not encrypted: {}", downloaded.display());
            }
            return Ok(downloaded.to_path_buf());
        }
        if !self.is_enabled() {
            log::warn!(target: "crypto", "Backup is encrypted although encryption is disabled");
        }

        let decrypted = downloaded.with_extension("");
        log::info!(target: "crypto", "Decrypt {}", downloaded.display());

        let gpg = CommandLine::new("gpg")
            .args(["--batch", "--yes"])
            .arg("--output")
            .arg(&decrypted)
            .arg("--decrypt")
            .arg(downloaded);
        runner.run(&gpg).map_err(DecryptionError::Gpg)?;

        if !decrypted.is_file() {
            return Err(DecryptionError::MissingOutput(decrypted));
        }

        Ok(decrypted)
    }
}
