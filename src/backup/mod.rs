//! Backup sources: where the dump comes from and how it reaches local disk.

pub(crate) mod archive;
pub(crate) mod key_template;
pub(crate) mod local;
pub(crate) mod s3_download;
pub(crate) mod scp_download;

use async_trait::async_trait;
use std::path::Path;

use crate::config::{BackupConfig, BackupLocation};
use crate::errors::{RestoreError, Result};
use crate::utils::scratch::DumpFile;

/// Fetches a backup to local disk.
///
/// Implementations hand back the raw (possibly still compressed) file; the
/// orchestrator runs it through [`archive::Extractor`] afterwards.
#[async_trait]
pub trait BackupSource: Send + Sync {
    /// Short label used in progress logs.
    fn describe(&self) -> String;

    async fn resolve(&self) -> Result<DumpFile>;
}

/// Builds the source selected by the `backup` section of the config.
///
/// Credentials and key templates are resolved here, so configuration and
/// credential errors surface before anything touches the database.
///
/// `download_secs` is handed to transports whose blocking I/O would
/// otherwise outlive the download deadline.
pub fn create_backup_source(
    backup: &BackupConfig,
    scratch_dir: &Path,
    download_secs: Option<u64>,
) -> Result<Box<dyn BackupSource>> {
    let lookup = |name: &str| std::env::var(name).ok();
    match backup.location() {
        Some(BackupLocation::Local(path)) => Ok(Box::new(local::LocalSource::new(path))),
        Some(BackupLocation::S3(s3)) => Ok(Box::new(s3_download::S3Source::new(
            s3,
            scratch_dir,
            lookup,
        )?)),
        Some(BackupLocation::Scp(scp)) => Ok(Box::new(
            scp_download::ScpSource::new(scp, scratch_dir, lookup)?.with_timeout(download_secs),
        )),
        None => Err(RestoreError::Config(
            "backup must define one of 'local', 's3' or 'scp'".to_string(),
        )),
    }
}

/// Local file name for a downloaded object, taken from the last path segment.
pub(crate) fn download_file_name(key: &str) -> Result<&str> {
    key.rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| RestoreError::Config(format!("Backup key has no file name: {}", key)))
}
