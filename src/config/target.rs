use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::LazyLock;

use derive_more::{Display, Error};
use regex::Regex;

const DEFAULT_FTP_PORT: u16 = 21;
const DEFAULT_SFTP_PORT: u16 = 22;

static REMOTE_TARGET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?<host>[^:/]+)(?::(?<port>\d+))?(?:/(?<dir>.*))?$")
        .expect("remote target regex should be valid")
});

/// Storage location of a job's backups, selecting the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// `file:///abs/dir`
    File { dir: PathBuf },
    /// `ftp://host[:port][/dir]`
    Ftp(RemoteLocation),
    /// `sftp://host[:port][/dir]`
    Sftp(RemoteLocation),
    /// `s3://bucket[/prefix]`
    S3 {
        bucket: String,
        prefix: Option<String>,
    },
}

/// Host, port and optional directory of FTP and SFTP targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub host: String,
    pub port: u16,
    pub dir: Option<String>,
}

#[derive(Debug, Display, Error)]
/// Errors parsing a backup target.
pub enum TargetError {
    #[display("Target has no scheme: {_0}")]
    MissingScheme(#[error(ignore)] String),
    #[display("Unsupported target scheme: {_0}")]
    UnsupportedScheme(#[error(ignore)] String),
    #[display("File target must be an absolute path: {_0}")]
    RelativePath(#[error(ignore)] String),
    #[display("Invalid target location: {_0}")]
    InvalidLocation(#[error(ignore)] String),
}

impl Target {
    /// Short name of the backend kind, as shown in listings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::File { .. } => "FILE",
            Self::Ftp(_) => "FTP",
            Self::Sftp(_) => "SFTP",
            Self::S3 { .. } => "S3",
        }
    }
}

impl RemoteLocation {
    fn parse(location: &str, default_port: u16) -> Result<Self, TargetError> {
        let invalid = || TargetError::InvalidLocation(location.to_string());

        let caps = REMOTE_TARGET.captures(location).ok_or_else(invalid)?;
        let port = match caps.name("port") {
            Some(port) => port.as_str().parse().map_err(|_| invalid())?,
            None => default_port,
        };
        let dir = caps
            .name("dir")
            .map(|dir| dir.as_str().trim_end_matches('/'))
            .filter(|dir| !dir.is_empty())
            .map(str::to_string);

        Ok(Self {
            host: caps["host"].to_string(),
            port,
            dir,
        })
    }
}

impl FromStr for Target {
    type Err = TargetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, location) = s
            .split_once("://")
            .ok_or_else(|| TargetError::MissingScheme(s.to_string()))?;

        match scheme {
            "file" => {
                let dir = PathBuf::from(location);
                if !dir.is_absolute() {
                    return Err(TargetError::RelativePath(s.to_string()));
                }
                Ok(Self::File { dir })
            }
            "ftp" => RemoteLocation::parse(location, DEFAULT_FTP_PORT).map(Self::Ftp),
            "sftp" => RemoteLocation::parse(location, DEFAULT_SFTP_PORT).map(Self::Sftp),
            "s3" => {
                let (bucket, prefix) = match location.split_once('/') {
                    Some((bucket, prefix)) => (bucket, Some(prefix.trim_matches('/'))),
                    None => (location, None),
                };
                if bucket.is_empty() {
                    return Err(TargetError::InvalidLocation(s.to_string()));
                }
                Ok(Self::S3 {
                    bucket: bucket.to_string(),
                    prefix: prefix.filter(|p| !p.is_empty()).map(str::to_string),
                })
            }
            other => Err(TargetError::UnsupportedScheme(other.to_string())),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { dir } => write!(f, "file://{}", dir.display()),
            Self::Ftp(loc) => write!(f, "ftp://{loc}"),
            Self::Sftp(loc) => write!(f, "sftp://{loc}"),
            Self::S3 { bucket, prefix } => {
                write!(f, "s3://{bucket}")?;
                match prefix {
                    Some(prefix) => write!(f, "/{prefix}"),
                    None => Ok(()),
                }
            }
        }
    }
}

impl fmt::Display for RemoteLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)?;
        match &self.dir {
            Some(dir) => write!(f, "/{dir}"),
            None => Ok(()),
        }
    }
}

impl TryFrom<String> for Target {
    type Error = TargetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_target() {
        let target: Target = "file:///srv/backups".parse().unwrap();
        assert_eq!(
            target,
            Target::File {
                dir: "/srv/backups".into()
            }
        );
        assert!(matches!(
            "file://relative/dir".parse::<Target>(),
            Err(TargetError::RelativePath(_))
        ));
    }

    #[test]
    fn parses_remote_targets_with_default_ports() {
        let ftp: Target = "ftp://testftp.example.com".parse().unwrap();
        assert_eq!(
            ftp,
            Target::Ftp(RemoteLocation {
                host: "testftp.example.com".into(),
                port: 21,
                dir: None,
            })
        );

        let sftp: Target = "sftp://backup.example.com:2222/srv/backups/".parse().unwrap();
        assert_eq!(
            sftp,
            Target::Sftp(RemoteLocation {
                host: "backup.example.com".into(),
                port: 2222,
                dir: Some("srv/backups".into()),
            })
        );
    }

    #[test]
    fn parses_s3_bucket_and_prefix() {
        let s3: Target = "s3://backup-test-bucket".parse().unwrap();
        assert_eq!(
            s3,
            Target::S3 {
                bucket: "backup-test-bucket".into(),
                prefix: None
            }
        );

        let s3: Target = "s3://bucket/hosts/web1/".parse().unwrap();
        assert_eq!(
            s3,
            Target::S3 {
                bucket: "bucket".into(),
                prefix: Some("hosts/web1".into())
            }
        );
    }

    #[test]
    fn rejects_invalid_targets() {
        assert!(matches!(
            "/srv/backups".parse::<Target>(),
            Err(TargetError::MissingScheme(_))
        ));
        assert!(matches!(
            "smb://host/share".parse::<Target>(),
            Err(TargetError::UnsupportedScheme(_))
        ));
        assert!(matches!(
            "ftp://host:99999".parse::<Target>(),
            Err(TargetError::InvalidLocation(_))
        ));
        assert!(matches!(
            "s3://".parse::<Target>(),
            Err(TargetError::InvalidLocation(_))
        ));
    }
}
