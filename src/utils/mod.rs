pub mod scratch;
pub mod version;

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::time::timeout;
use which::which;

use crate::errors::{RestoreError, Result};

/// Finds the mysql client executable in the system PATH.
pub fn find_mysql_executable() -> Result<PathBuf> {
    which("mysql").map_err(|e| {
        RestoreError::Config(format!(
            "mysql executable not found in PATH ({}). Please ensure MySQL client tools are installed and in your PATH.",
            e
        ))
    })
}

/// Awaits `step`, bounded by `secs` when a deadline is configured.
pub async fn with_deadline<T, F>(step: &'static str, secs: Option<u64>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(secs) = secs else {
        return fut.await;
    };
    match timeout(Duration::from_secs(secs), fut).await {
        Ok(result) => result,
        Err(_) => Err(RestoreError::Timeout { step, secs }),
    }
}
