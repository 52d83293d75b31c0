pub(crate) mod db_restore; // Scratch database engine and the native restore command
pub(crate) mod logic; // Orchestration state machine
pub(crate) mod verification; // Check evaluation

use anyhow::{Context, Result};
use log::info;
use std::path::PathBuf;
use tempfile::{Builder as TempDirBuilder, TempDir};

use crate::backup::archive::Extractor;
use crate::backup::create_backup_source;
use crate::config::{Config, DatabaseType};
use db_restore::{DatabaseEngine, MySqlEngine};
use logic::{Orchestrator, RunReport};

/// Public entry point for one restore-and-validate pass.
pub async fn run_restore_flow(config: &Config) -> Result<RunReport> {
    // Kept alive until the pass is over; removed on drop.
    let (scratch_dir, _scratch_guard) = scratch_directory(config)?;
    info!("Scratch directory: {}", scratch_dir.display());

    let source = create_backup_source(&config.backup, &scratch_dir, config.timeouts.download_secs)
        .context("Failed to set up the backup source")?;

    let engine: Box<dyn DatabaseEngine> = match config.database.db_type {
        DatabaseType::Mysql => Box::new(MySqlEngine::new(config.database.clone())),
    };

    let orchestrator = Orchestrator::new(
        source,
        Extractor::new(&scratch_dir),
        engine,
        config.check.clone(),
        config.timeouts,
    );
    let report = orchestrator.run().await.with_context(|| {
        format!("Restore validation of database '{}' failed", config.database.name)
    })?;
    Ok(report)
}

fn scratch_directory(config: &Config) -> Result<(PathBuf, Option<TempDir>)> {
    match &config.scratch_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).with_context(|| {
                format!("Failed to create scratch directory: {}", dir.display())
            })?;
            Ok((dir.clone(), None))
        }
        None => {
            let temp = TempDirBuilder::new()
                .prefix("restorecheck_")
                .tempdir()
                .context("Failed to create temporary scratch directory")?;
            Ok((temp.path().to_path_buf(), Some(temp)))
        }
    }
}
