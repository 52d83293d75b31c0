// restorecheck/src/restore/db_restore.rs
use async_trait::async_trait;
use log::{info, warn};
use sqlx::mysql::{MySqlConnectOptions, MySqlRow};
use sqlx::types::BigDecimal;
use sqlx::{Connection, MySqlConnection, Row, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::verification::{CountMode, Observation};
use crate::config::DatabaseConfig;
use crate::errors::{RestoreError, Result};
use crate::utils::find_mysql_executable;
use crate::utils::version::{EngineVersion, REDO_LOG_TOGGLE_MIN};

/// The scratch database the orchestrator restores into.
///
/// `teardown` must be safe to call after any failure, including a failed
/// `prepare`.
#[async_trait]
pub trait DatabaseEngine: Send {
    /// Connects to the scratch schema, creating it if needed, and applies
    /// requested engine tuning.
    async fn prepare(&mut self) -> Result<()>;

    /// Loads a plain dump file into the scratch schema.
    async fn restore(&mut self, dump: &Path) -> Result<()>;

    /// Runs a check query. Query errors are reported in the observation, not
    /// as `Err`.
    async fn observe(&mut self, query: &str, mode: CountMode) -> Result<Observation>;

    /// Drops the scratch schema and undoes tuning.
    async fn teardown(&mut self) -> Result<()>;
}

/// A command line for the native restore client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreInvocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Builds `mysql --host .. --port .. --user .. <schema>`; the password goes
/// through `MYSQL_PWD` so it never shows up in the process list.
pub fn restore_invocation(program: PathBuf, database: &DatabaseConfig) -> RestoreInvocation {
    let args = vec![
        "--protocol=TCP".to_string(),
        "--host".to_string(),
        database.host.clone(),
        "--port".to_string(),
        database.port.to_string(),
        "--user".to_string(),
        database.user.clone(),
        database.name.clone(),
    ];
    let env = if database.password.is_empty() {
        Vec::new()
    } else {
        vec![("MYSQL_PWD".to_string(), database.password.clone())]
    };
    RestoreInvocation { program, args, env }
}

/// Runs the invocation with `dump` on stdin and returns the combined output.
pub async fn run_restore_command(invocation: &RestoreInvocation, dump: &Path) -> Result<String> {
    let input = std::fs::File::open(dump).map_err(|e| {
        RestoreError::Extraction(format!("Failed to open dump {}: {}", dump.display(), e))
    })?;

    info!(
        "Executing {} {} < {}",
        invocation.program.display(),
        invocation.args.join(" "),
        dump.display()
    );

    let output = Command::new(&invocation.program)
        .args(&invocation.args)
        .envs(invocation.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .stdin(Stdio::from(input))
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| RestoreError::RestoreCommand {
            status: "not started".to_string(),
            output: format!("Failed to execute {}: {}", invocation.program.display(), e),
        })?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if !output.status.success() {
        return Err(RestoreError::RestoreCommand {
            status: output.status.to_string(),
            output: combined,
        });
    }
    Ok(combined)
}

/// Quotes a MySQL identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// One result cell, decoded as far as a check needs it.
#[derive(Debug, Clone, PartialEq)]
enum Cell {
    Null,
    Integer(i64),
    Unsigned(u64),
    /// `DECIMAL`, which is what `SUM()` and `AVG()` return.
    Decimal(BigDecimal),
    Float(f64),
    Other(String),
}

fn read_cell(row: &MySqlRow) -> Cell {
    let type_name = match row.try_get_raw(0) {
        Ok(raw) if raw.is_null() => return Cell::Null,
        Ok(raw) => raw.type_info().name().to_string(),
        Err(e) => return Cell::Other(e.to_string()),
    };

    if let Ok(value) = row.try_get::<i64, _>(0) {
        Cell::Integer(value)
    } else if let Ok(value) = row.try_get::<u64, _>(0) {
        Cell::Unsigned(value)
    } else if let Ok(value) = row.try_get::<i32, _>(0) {
        Cell::Integer(value as i64)
    } else if let Ok(value) = row.try_get::<BigDecimal, _>(0) {
        Cell::Decimal(value)
    } else if let Ok(value) = row.try_get::<f64, _>(0) {
        Cell::Float(value)
    } else {
        Cell::Other(type_name)
    }
}

/// Turns a single cell into a comparable count. Anything that is not a
/// whole number in `i64` range is an error rather than a silent row count.
fn cell_value(cell: &Cell) -> std::result::Result<i64, String> {
    match cell {
        Cell::Integer(value) => Ok(*value),
        Cell::Unsigned(value) => {
            i64::try_from(*value).map_err(|_| format!("value {} is out of range", value))
        }
        Cell::Decimal(value) => {
            let whole = value.with_scale(0);
            if &whole != value {
                return Err(format!("value {} is not a whole number", value));
            }
            whole
                .to_string()
                .parse::<i64>()
                .map_err(|_| format!("value {} is out of range", value))
        }
        Cell::Float(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Ok(*value as i64)
        }
        Cell::Float(value) => Err(format!("value {} is not a whole number", value)),
        Cell::Null => Err("query returned NULL".to_string()),
        Cell::Other(type_name) => Err(format!("{} value cannot be compared as a number", type_name)),
    }
}

/// Reads a single-row, single-column result. `None` means the result has
/// another shape and the row count applies.
fn scalar_of(rows: &[MySqlRow]) -> Option<std::result::Result<i64, String>> {
    let [row] = rows else { return None };
    if row.columns().len() != 1 {
        return None;
    }
    Some(cell_value(&read_cell(row)))
}

/// MySQL scratch instance, reached over TCP with `sqlx` and restored with
/// the `mysql` client.
pub struct MySqlEngine {
    config: DatabaseConfig,
    conn: Option<MySqlConnection>,
    redo_log_disabled: bool,
}

impl MySqlEngine {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            conn: None,
            redo_log_disabled: false,
        }
    }

    /// Server-level options, no schema bound.
    fn admin_options(&self) -> MySqlConnectOptions {
        MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.user)
            .password(&self.config.password)
    }

    fn target_options(&self) -> MySqlConnectOptions {
        self.admin_options().database(&self.config.name)
    }

    fn connection(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_mut().ok_or_else(|| {
            RestoreError::Config(format!(
                "Not connected to scratch database '{}'",
                self.config.name
            ))
        })
    }

    async fn connect_or_create(&self) -> Result<MySqlConnection> {
        match MySqlConnection::connect_with(&self.target_options()).await {
            Ok(conn) => {
                info!("✅ Connected to {}:{}/{}", self.config.host, self.config.port, self.config.name);
                Ok(conn)
            }
            Err(e) => {
                info!(
                    "Database '{}' is not reachable ({}); creating it through an admin connection",
                    self.config.name, e
                );
                let mut admin = MySqlConnection::connect_with(&self.admin_options()).await?;
                sqlx::query(&format!(
                    "CREATE DATABASE IF NOT EXISTS {}",
                    quote_ident(&self.config.name)
                ))
                .execute(&mut admin)
                .await?;
                admin.close().await?;
                info!("✓ Database '{}' created.", self.config.name);

                Ok(MySqlConnection::connect_with(&self.target_options()).await?)
            }
        }
    }

    async fn disable_redo_log(&mut self) -> Result<()> {
        let conn = self.connection()?;
        let reported: String = sqlx::query_scalar("SELECT VERSION()").fetch_one(&mut *conn).await?;
        if !EngineVersion::reported_at_least(&reported, REDO_LOG_TOGGLE_MIN) {
            return Err(RestoreError::VersionIncompatible {
                found: reported,
                required: REDO_LOG_TOGGLE_MIN.to_string(),
            });
        }

        sqlx::query("ALTER INSTANCE DISABLE INNODB REDO_LOG")
            .execute(&mut *conn)
            .await?;
        self.redo_log_disabled = true;
        info!("✓ InnoDB redo log disabled (server {})", reported);
        Ok(())
    }
}

#[async_trait]
impl DatabaseEngine for MySqlEngine {
    async fn prepare(&mut self) -> Result<()> {
        let conn = self.connect_or_create().await?;
        self.conn = Some(conn);
        if self.config.disable_redo_log {
            self.disable_redo_log().await?;
        }
        Ok(())
    }

    async fn restore(&mut self, dump: &Path) -> Result<()> {
        let invocation = restore_invocation(find_mysql_executable()?, &self.config);
        let output = run_restore_command(&invocation, dump).await?;
        if !output.trim().is_empty() {
            info!("mysql output: {}", output.trim());
        }
        info!("✓ Restored {} into '{}'", dump.display(), self.config.name);
        Ok(())
    }

    async fn observe(&mut self, query: &str, mode: CountMode) -> Result<Observation> {
        let conn = self.connection()?;
        let observation = match sqlx::query(query).fetch_all(&mut *conn).await {
            Ok(rows) => {
                let row_count = rows.len() as i64;
                match mode {
                    CountMode::Rows => Observation::count(row_count),
                    CountMode::ScalarOrRows => match scalar_of(&rows) {
                        None => Observation::count(row_count),
                        Some(Ok(value)) => Observation::count(value),
                        Some(Err(reason)) => Observation::failed(format!(
                            "single-value result is unusable: {}",
                            reason
                        )),
                    },
                }
            }
            Err(e) => Observation::failed(e),
        };
        Ok(observation)
    }

    async fn teardown(&mut self) -> Result<()> {
        let mut problems = Vec::new();

        let mut conn = match self.conn.take() {
            Some(conn) => Some(conn),
            None => match MySqlConnection::connect_with(&self.admin_options()).await {
                Ok(conn) => Some(conn),
                Err(e) => {
                    problems.push(format!("could not connect to drop '{}': {}", self.config.name, e));
                    None
                }
            },
        };

        if let Some(conn) = conn.as_mut() {
            let drop_sql = format!("DROP DATABASE IF EXISTS {}", quote_ident(&self.config.name));
            match sqlx::query(&drop_sql).execute(&mut *conn).await {
                Ok(_) => info!("✓ Database '{}' dropped.", self.config.name),
                Err(e) => problems.push(format!("failed to drop '{}': {}", self.config.name, e)),
            }

            if self.redo_log_disabled {
                match sqlx::query("ALTER INSTANCE ENABLE INNODB REDO_LOG").execute(&mut *conn).await {
                    Ok(_) => self.redo_log_disabled = false,
                    Err(e) => problems.push(format!("failed to re-enable the redo log: {}", e)),
                }
            }
        }

        if let Some(conn) = conn {
            if let Err(e) = conn.close().await {
                warn!("Closing the connection to '{}' failed: {}", self.config.name, e);
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(RestoreError::Cleanup(problems.join("; ")))
        }
    }
}
