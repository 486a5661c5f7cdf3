//! Naming convention of backup archives.
//!
//! Every archive is called `backup-<job>-<YYYYMMDDHHMMSS>.tar.gz`, with an
//! additional `.gpg` suffix if it got encrypted. The timestamp has a fixed
//! width, which makes the lexical and the chronological order of archives of
//! the same job identical.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{NaiveDateTime, Timelike};
use derive_more::{Display, Error};
use regex::Regex;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const ARCHIVE_SUFFIX: &str = ".tar.gz";
const ENCRYPTED_SUFFIX: &str = ".gpg";

static ARCHIVE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^backup-(?<job>.+)-(?<ts>\d{14})\.tar\.gz(?<gpg>\.gpg)?$")
        .expect("archive name regex should be valid")
});

/// Name of a backup archive, as stored on a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveName {
    job: String,
    timestamp: NaiveDateTime,
    encrypted: bool,
}

/// The identifier doesn't follow the archive naming convention.
#[derive(Debug, Display, Error)]
#[display("Not a backup archive name: {_0}")]
pub struct InvalidArchiveName(#[error(ignore)] String);

impl ArchiveName {
    /// Name of a fresh, unencrypted archive of `job`.
    ///
    /// Sub-second precision of `timestamp` is dropped.
    pub fn new(job: &str, timestamp: NaiveDateTime) -> Self {
        let timestamp = timestamp.with_nanosecond(0).unwrap_or(timestamp);
        Self {
            job: job.to_string(),
            timestamp,
            encrypted: false,
        }
    }

    /// Prefix shared by all archives of `job`.
    pub fn prefix(job: &str) -> String {
        format!("backup-{job}-")
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// The name of this archive once it got encrypted.
    pub fn encrypted(&self) -> Self {
        Self {
            encrypted: true,
            ..self.clone()
        }
    }

    /// Parses `identifier` and only accepts it if it belongs to `job`.
    pub fn parse_for_job(identifier: &str, job: &str) -> Option<Self> {
        identifier
            .parse::<Self>()
            .ok()
            .filter(|name| name.job == job)
    }
}

impl fmt::Display for ArchiveName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "backup-{}-{}{ARCHIVE_SUFFIX}",
            self.job,
            self.timestamp.format(TIMESTAMP_FORMAT)
        )?;
        if self.encrypted {
            f.write_str(ENCRYPTED_SUFFIX)?;
        }
        Ok(())
    }
}

impl FromStr for ArchiveName {
    type Err = InvalidArchiveName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidArchiveName(s.to_string());

        let caps = ARCHIVE_NAME.captures(s).ok_or_else(invalid)?;
        let timestamp = NaiveDateTime::parse_from_str(&caps["ts"], TIMESTAMP_FORMAT)
            .map_err(|_| invalid())?;

        Ok(Self {
            job: caps["job"].to_string(),
            timestamp,
            encrypted: caps.name("gpg").is_some(),
        })
    }
}
