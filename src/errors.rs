use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Backup retrieval failed: {0}")]
    Retrieval(String),

    #[error("Archive extraction failed: {0}")]
    Extraction(String),

    #[error("Engine version {found} is older than the required {required}")]
    VersionIncompatible { found: String, required: String },

    #[error("Restore command exited with {status}: {output}")]
    RestoreCommand { status: String, output: String },

    #[error("Check #{index} ({query}) failed: {reason}")]
    CheckFailure {
        index: usize,
        query: String,
        reason: String,
    },

    #[error("Unsupported check operator: {0}")]
    UnsupportedOperator(String),

    #[error("Cleanup failed: {0}")]
    Cleanup(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Step '{step}' timed out after {secs}s")]
    Timeout { step: &'static str, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RestoreError>;
