// restorecheck/src/backup/s3_download.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use log::info;
use s3::config::Region;
use s3::error::DisplayErrorContext;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::AsyncWriteExt; // For write_all

use super::{BackupSource, download_file_name, key_template};
use crate::config::S3BackupConfig;
use crate::errors::{RestoreError, Result};
use crate::utils::scratch::DumpFile;

pub const ACCESS_KEY_ENV: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_KEY_ENV: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENDPOINT_ENV: &str = "AWS_ENDPOINT_URL";

/// How the S3 client authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum S3Credentials {
    /// Named profile from the shared AWS config/credentials files.
    Profile(String),
    /// Static keys taken from the environment.
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl std::fmt::Debug for S3Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            S3Credentials::Profile(name) => f.debug_tuple("Profile").field(name).finish(),
            S3Credentials::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .finish_non_exhaustive(),
        }
    }
}

/// Resolves credentials: a configured profile wins, otherwise both static
/// keys must be present in the environment.
pub fn resolve_credentials(
    profile: Option<&str>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<S3Credentials> {
    if let Some(profile) = profile.filter(|p| !p.trim().is_empty()) {
        return Ok(S3Credentials::Profile(profile.to_string()));
    }

    let access_key_id = lookup(ACCESS_KEY_ENV).filter(|v| !v.is_empty());
    let secret_access_key = lookup(SECRET_KEY_ENV).filter(|v| !v.is_empty());
    match (access_key_id, secret_access_key) {
        (Some(access_key_id), Some(secret_access_key)) => Ok(S3Credentials::Static {
            access_key_id,
            secret_access_key,
        }),
        _ => Err(RestoreError::Credential(format!(
            "S3 credentials not found: set backup.s3.profile or both {} and {}",
            ACCESS_KEY_ENV, SECRET_KEY_ENV
        ))),
    }
}

/// A backup object in an S3-compatible bucket.
#[derive(Debug)]
pub struct S3Source {
    bucket: String,
    key: String,
    region: Option<String>,
    endpoint_url: Option<String>,
    credentials: S3Credentials,
    scratch_dir: PathBuf,
}

impl S3Source {
    pub fn new(
        config: &S3BackupConfig,
        scratch_dir: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if config.bucket.trim().is_empty() || config.key.trim().is_empty() {
            return Err(RestoreError::Config(
                "backup.s3 requires both 'bucket' and 'key'".to_string(),
            ));
        }

        let credentials = resolve_credentials(config.profile.as_deref(), &lookup)?;
        if let S3Credentials::Profile(name) = &credentials {
            info!("Using AWS profile {}", name);
        }
        let key = key_template::render(&config.key)?;

        Ok(Self {
            bucket: config.bucket.clone(),
            key,
            region: config.region.clone().filter(|r| !r.is_empty()),
            endpoint_url: lookup(ENDPOINT_ENV).filter(|v| !v.is_empty()),
            credentials,
            scratch_dir: scratch_dir.to_path_buf(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    async fn client(&self) -> s3::Client {
        let mut loader = aws_config::defaults(s3::config::BehaviorVersion::latest());
        if let Some(region) = &self.region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &self.endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }
        loader = match &self.credentials {
            S3Credentials::Profile(name) => loader.profile_name(name),
            S3Credentials::Static {
                access_key_id,
                secret_access_key,
            } => loader.credentials_provider(s3::config::Credentials::new(
                access_key_id,
                secret_access_key,
                None,     // session_token
                None,     // expiry
                "Static", // provider_name
            )),
        };

        let sdk_config = loader.load().await;
        // S3-compatible endpoints (MinIO and friends) rarely resolve
        // bucket subdomains.
        let s3_config = s3::config::Builder::from(&sdk_config)
            .force_path_style(self.endpoint_url.is_some())
            .build();
        s3::Client::from_conf(s3_config)
    }
}

#[async_trait]
impl BackupSource for S3Source {
    fn describe(&self) -> String {
        format!("s3://{}/{}", self.bucket, self.key())
    }

    async fn resolve(&self) -> Result<DumpFile> {
        let destination = self.scratch_dir.join(download_file_name(&self.key)?);
        info!(
            "Downloading s3://{}/{} to {}",
            self.bucket,
            self.key,
            destination.display()
        );

        // Owns the destination from here on: an early return removes the partial file.
        let dump = DumpFile::owned(&destination);

        let mut output_file = File::create(&destination).await.map_err(|e| {
            RestoreError::Retrieval(format!(
                "Failed to create destination file {}: {}",
                destination.display(),
                e
            ))
        })?;

        let client = self.client().await;
        let mut object = client
            .get_object()
            .bucket(&self.bucket)
            .key(&self.key)
            .send()
            .await
            .map_err(|e| {
                RestoreError::Retrieval(format!(
                    "Failed to get object s3://{}/{}: {}",
                    self.bucket,
                    self.key,
                    DisplayErrorContext(&e)
                ))
            })?;

        let mut total_bytes_downloaded = 0;
        while let Some(bytes_chunk) = object.body.try_next().await.map_err(|e| {
            RestoreError::Retrieval(format!(
                "Download of s3://{}/{} was interrupted: {}",
                self.bucket, self.key, e
            ))
        })? {
            output_file.write_all(&bytes_chunk).await.map_err(|e| {
                RestoreError::Retrieval(format!(
                    "Failed to write to destination file {}: {}",
                    destination.display(),
                    e
                ))
            })?;
            total_bytes_downloaded += bytes_chunk.len();
        }
        output_file.flush().await?;

        info!(
            "✅ {} bytes downloaded from s3://{}/{} to {}",
            total_bytes_downloaded,
            self.bucket,
            self.key,
            destination.display()
        );
        Ok(dump)
    }
}
