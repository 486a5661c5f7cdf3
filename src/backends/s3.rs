use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use super::{job_entries, Backend, BackendError, BackupEntry};
use crate::config::AwsCredentials;
use crate::naming::ArchiveName;

/// Backups as objects of an S3 bucket, optionally below a key prefix.
pub struct S3Backend {
    job: String,
    prefix: Option<String>,
    bucket: Box<Bucket>,
}

impl S3Backend {
    pub fn new(
        job: &str,
        bucket: &str,
        prefix: Option<&str>,
        credentials: &AwsCredentials,
    ) -> Result<Self, BackendError> {
        let target = format!("s3://{bucket}");
        log::debug!(target: "backend::s3", "Use bucket {bucket} in {}", credentials.region);

        let region: Region = credentials
            .region
            .parse()
            .map_err(BackendError::connect(&target))?;
        let creds = Credentials::new(
            Some(credentials.access_key_id.expose()),
            Some(credentials.secret_access_key.expose()),
            None,
            None,
            None,
        )
        .map_err(BackendError::connect(&target))?;
        let bucket = Bucket::new(bucket, region, creds).map_err(BackendError::connect(&target))?;

        Ok(Self {
            job: job.to_string(),
            prefix: prefix.map(|prefix| prefix.trim_matches('/').to_string()),
            bucket,
        })
    }

    fn key(&self, name: &str) -> String {
        object_key(self.prefix.as_deref(), name)
    }
}

/// Key of the object `name` below `prefix`.
pub fn object_key(prefix: Option<&str>, name: &str) -> String {
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{prefix}/{name}"),
        _ => name.to_string(),
    }
}

/// Name of the object `key` if it is directly below `prefix`.
pub fn object_name<'k>(prefix: Option<&str>, key: &'k str) -> Option<&'k str> {
    let name = match prefix {
        Some(prefix) if !prefix.is_empty() => key.strip_prefix(prefix)?.strip_prefix('/')?,
        _ => key,
    };
    (!name.contains('/')).then_some(name)
}

/// `LastModified` of an object in local time.
fn parse_last_modified(last_modified: &str) -> Option<NaiveDateTime> {
    DateTime::parse_from_rfc3339(last_modified)
        .ok()
        .map(|time| time.with_timezone(&Local).naive_local())
}

impl Backend for S3Backend {
    fn kind(&self) -> &'static str {
        "S3"
    }

    fn list(&mut self) -> Result<Vec<BackupEntry>, BackendError> {
        let list_prefix = self.key(&ArchiveName::prefix(&self.job));
        let pages = self
            .bucket
            .list(list_prefix.clone(), None)
            .map_err(BackendError::transport("Listing", &list_prefix))?;

        let objects = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .filter_map(|object| {
                let name = object_name(self.prefix.as_deref(), &object.key)?.to_string();
                let modified = parse_last_modified(&object.last_modified);
                Some((name, Some(object.size), modified))
            });

        Ok(job_entries(&self.job, objects))
    }

    fn upload(&mut self, local: &Path, remote_name: &ArchiveName) -> Result<(), BackendError> {
        let key = self.key(&remote_name.to_string());
        let mut file = File::open(local).map_err(BackendError::io(local))?;

        log::debug!(target: "backend::s3", "Upload {key}");
        self.bucket
            .put_object_stream(&mut file, &key)
            .map_err(BackendError::transport("Upload", &key))?;
        Ok(())
    }

    fn download(&mut self, entry: &BackupEntry, dest_dir: &Path) -> Result<PathBuf, BackendError> {
        let name = entry.identifier();
        let key = self.key(&name);
        let dest = dest_dir.join(&name);
        let mut file = File::create(&dest).map_err(BackendError::io(&dest))?;

        log::debug!(target: "backend::s3", "Download {key} to {}", dest.display());
        self.bucket
            .get_object_to_writer(&key, &mut file)
            .map_err(BackendError::transport("Download", &key))?;
        Ok(dest)
    }

    /// Deleting a missing key succeeds on S3 anyway.
    fn delete(&mut self, name: &ArchiveName) -> Result<(), BackendError> {
        let key = self.key(&name.to_string());
        log::debug!(target: "backend::s3", "Delete {key}");
        self.bucket
            .delete_object(&key)
            .map_err(BackendError::transport("Deletion", &key))?;
        Ok(())
    }
}
