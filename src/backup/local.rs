// restorecheck/src/backup/local.rs
use async_trait::async_trait;
use log::info;
use std::path::{Path, PathBuf};

use super::BackupSource;
use crate::errors::Result;
use crate::utils::scratch::DumpFile;

/// A backup already on local disk. Nothing is fetched and the file is never
/// deleted by this process.
pub struct LocalSource {
    path: PathBuf,
}

impl LocalSource {
    pub fn new(path: &Path) -> Self {
        Self { path: path.to_path_buf() }
    }
}

#[async_trait]
impl BackupSource for LocalSource {
    fn describe(&self) -> String {
        format!("local file {}", self.path.display())
    }

    async fn resolve(&self) -> Result<DumpFile> {
        info!("Using local backup {}", self.path.display());
        Ok(DumpFile::borrowed(&self.path))
    }
}
