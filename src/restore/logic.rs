// restorecheck/src/restore/logic.rs
use log::{error, info, warn};
use std::fmt;

use super::db_restore::DatabaseEngine;
use super::verification;
use crate::backup::BackupSource;
use crate::backup::archive::Extractor;
use crate::config::{CheckTarget, TimeoutConfig};
use crate::errors::{RestoreError, Result};
use crate::utils::scratch::DumpFile;
use crate::utils::with_deadline;

/// Where an orchestration pass currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Initializing,
    Restoring,
    Validating,
    CleaningUp,
    Done,
    Failed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Summary of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub phase: Phase,
    pub checks_passed: usize,
}

/// Drives one restore-and-validate pass.
///
/// `run` consumes the orchestrator, so a pass can never be restarted. The
/// scratch database is torn down on every path once initialization has
/// started; teardown problems are logged and never change the outcome.
pub struct Orchestrator {
    source: Box<dyn BackupSource>,
    extractor: Extractor,
    engine: Box<dyn DatabaseEngine>,
    checks: Vec<CheckTarget>,
    timeouts: TimeoutConfig,
    phase: Phase,
}

impl Orchestrator {
    pub fn new(
        source: Box<dyn BackupSource>,
        extractor: Extractor,
        engine: Box<dyn DatabaseEngine>,
        checks: Vec<CheckTarget>,
        timeouts: TimeoutConfig,
    ) -> Self {
        Self {
            source,
            extractor,
            engine,
            checks,
            timeouts,
            phase: Phase::Idle,
        }
    }

    fn enter(&mut self, phase: Phase) {
        info!("▶ {} → {}", self.phase, phase);
        self.phase = phase;
    }

    pub async fn run(mut self) -> Result<RunReport> {
        self.enter(Phase::Initializing);
        let outcome = self.execute().await;

        self.enter(Phase::CleaningUp);
        if let Err(e) = self.engine.teardown().await {
            warn!("⚠️ {}", e);
        }

        match outcome {
            Ok(checks_passed) => {
                self.enter(Phase::Done);
                Ok(RunReport {
                    phase: Phase::Done,
                    checks_passed,
                })
            }
            Err(e) => {
                self.enter(Phase::Failed);
                error!("❌ Restore validation failed: {}", e);
                Err(e)
            }
        }
    }

    async fn execute(&mut self) -> Result<usize> {
        self.engine.prepare().await?;

        self.enter(Phase::Restoring);
        info!("Fetching backup from {}", self.source.describe());
        let payload = with_deadline("download", self.timeouts.download_secs, self.fetch()).await?;
        with_deadline(
            "restore",
            self.timeouts.restore_secs,
            self.engine.restore(payload.path()),
        )
        .await?;
        // The restored payload is no longer needed.
        drop(payload);

        self.enter(Phase::Validating);
        verification::verify_restore(self.engine.as_mut(), &self.checks, self.timeouts.check_secs).await
    }

    /// Retrieves the raw backup and peels its compression layers.
    async fn fetch(&self) -> Result<DumpFile> {
        let raw = self.source.resolve().await?;
        let extractor = self.extractor.clone();
        tokio::task::spawn_blocking(move || extractor.extract(raw))
            .await
            .map_err(|e| RestoreError::Extraction(format!("Extraction task failed: {}", e)))?
    }
}
