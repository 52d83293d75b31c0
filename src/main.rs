//! Database restore checker
//!
//! Restores a backup into a scratch database, runs the configured checks
//! against it and drops the database again. Meant to run as a CI job.

// restorecheck/src/main.rs
mod backup;
mod config;
mod errors;
mod restore;
mod utils;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Config, DatabaseType};
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "restorecheck", about = "Restore a database backup and validate it")]
struct CliArgs {
    /// Path to the YAML (or .json) configuration file
    #[arg(short, long, default_value = "./sample/config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = CliArgs::parse();
    match run_app(&args).await {
        Ok(_) => {
            info!("✅ succeeded");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(args: &CliArgs) -> Result<()> {
    let config = Config::load(&args.config).context(format!(
        "Failed to load configuration from {}",
        args.config.display()
    ))?;
    info!(
        "Restoring into {} database '{}' at {}:{} with {} check(s)",
        match config.database.db_type {
            DatabaseType::Mysql => "mysql",
        },
        config.database.name,
        config.database.host,
        config.database.port,
        config.check.len()
    );
    if let Some(image) = &config.database.image {
        info!("Database image: {}", image);
    }

    let report = restore::run_restore_flow(&config).await?;
    info!("{} check(s) passed, final state {}", report.checks_passed, report.phase);
    Ok(())
}
