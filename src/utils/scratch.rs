// restorecheck/src/utils/scratch.rs
use log::{debug, warn};
use std::path::{Path, PathBuf};

/// A dump file on local disk, optionally owned by the holder.
///
/// Owned files are removed when the value is dropped; borrowed files (for
/// example a backup the user pointed at directly) are left alone.
#[derive(Debug)]
pub struct DumpFile {
    path: PathBuf,
    owned: bool,
}

impl DumpFile {
    /// A file this process created and is responsible for deleting.
    pub fn owned(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), owned: true }
    }

    /// A file that belongs to someone else and must survive the run.
    pub fn borrowed(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), owned: false }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_owned(&self) -> bool {
        self.owned
    }
}

impl Drop for DumpFile {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed scratch file {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                "⚠️ Cleanup error: could not remove scratch file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owned_file_removed_on_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        std::fs::write(&path, b"select 1;")?;

        drop(DumpFile::owned(&path));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn test_borrowed_file_survives_drop() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        std::fs::write(&path, b"select 1;")?;

        drop(DumpFile::borrowed(&path));
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn test_missing_owned_file_is_not_an_error() {
        drop(DumpFile::owned("/nonexistent/restorecheck/dump.sql"));
    }
}
