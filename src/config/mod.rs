// restorecheck/src/config/mod.rs
use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub check: Vec<CheckTarget>,
    pub backup: BackupConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// Where downloads and extracted layers are written. A fresh temporary
    /// directory is used when unset.
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    #[serde(alias = "MySQL")]
    Mysql,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    pub name: String,
    /// Container image tag of the scratch instance. Informational only.
    #[serde(default)]
    pub image: Option<String>,
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_mysql_port", deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    #[serde(default)]
    pub disable_redo_log: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckTarget {
    pub query: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: i64,
}

/// Comparison applied to a check query's observation.
///
/// `gt` and `lt` are the historical tags for `>=` and `<=`. Unknown tags are
/// kept as `Unsupported` so the evaluator can reject them at check time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Operator {
    Exists,
    Equal,
    GreaterOrEqual,
    LessOrEqual,
    ExpectError,
    ExpectNoError,
    Unsupported(String),
}

impl From<String> for Operator {
    fn from(tag: String) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "exists" => Operator::Exists,
            "equal" | "eq" => Operator::Equal,
            "gt" | "gte" | "greater_or_equal" => Operator::GreaterOrEqual,
            "lt" | "lte" | "less_or_equal" => Operator::LessOrEqual,
            "error" | "expect_error" => Operator::ExpectError,
            "noerror" | "no_error" | "expect_no_error" => Operator::ExpectNoError,
            _ => Operator::Unsupported(tag),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackupConfig {
    pub local: Option<PathBuf>,
    pub s3: Option<S3BackupConfig>,
    pub scp: Option<ScpBackupConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct S3BackupConfig {
    #[serde(default)]
    pub bucket: String,
    /// Object key, may contain date placeholders.
    #[serde(default)]
    pub key: String,
    pub profile: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScpBackupConfig {
    pub host: String,
    #[serde(default = "default_ssh_port", deserialize_with = "port_from_number_or_string")]
    pub port: u16,
    pub user: String,
    /// Remote file path, may contain date placeholders.
    #[serde(alias = "key")]
    pub path: String,
    #[serde(alias = "sshKey")]
    pub ssh_key: Option<String>,
    pub passphrase: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct TimeoutConfig {
    pub download_secs: Option<u64>,
    pub restore_secs: Option<u64>,
    pub check_secs: Option<u64>,
}

/// The transport a backup is fetched with, in precedence order.
#[derive(Debug, Clone)]
pub enum BackupLocation<'a> {
    Local(&'a Path),
    S3(&'a S3BackupConfig),
    Scp(&'a ScpBackupConfig),
}

impl BackupConfig {
    /// Picks the configured transport. Local wins over S3, which wins over SCP.
    pub fn location(&self) -> Option<BackupLocation<'_>> {
        let populated = [
            self.local.as_ref().is_some_and(|p| !p.as_os_str().is_empty()),
            self.s3.is_some(),
            self.scp.is_some(),
        ];
        if populated.iter().filter(|set| **set).count() > 1 {
            warn!("More than one backup source is configured; using the first of local, s3, scp.");
        }

        match (&self.local, &self.s3, &self.scp) {
            (Some(path), _, _) if !path.as_os_str().is_empty() => Some(BackupLocation::Local(path)),
            (_, Some(s3), _) => Some(BackupLocation::S3(s3)),
            (_, _, Some(scp)) => Some(BackupLocation::Scp(scp)),
            _ => None,
        }
    }
}

impl Config {
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;

        let is_json = config_path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let config: Config = if is_json {
            serde_json::from_str(&config_content).with_context(|| {
                format!("Failed to parse JSON from config file at {}", config_path.display())
            })?
        } else {
            serde_yaml_ng::from_str(&config_content).with_context(|| {
                format!("Failed to parse YAML from config file at {}", config_path.display())
            })?
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.database.name.trim().is_empty() {
            return Err(anyhow::anyhow!("database.name cannot be empty."));
        }
        if self.database.name.contains('`') {
            return Err(anyhow::anyhow!(
                "database.name must not contain backticks: {}",
                self.database.name
            ));
        }
        if self.backup.location().is_none() {
            return Err(anyhow::anyhow!(
                "backup must define one of 'local', 's3' or 'scp'."
            ));
        }
        Ok(())
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_ssh_port() -> u16 {
    22
}

/// Ports show up both as `3306` and `"3306"` in hand-written configs.
fn port_from_number_or_string<'de, D>(deserializer: D) -> std::result::Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawPort {
        Number(u16),
        Text(String),
    }

    match RawPort::deserialize(deserializer)? {
        RawPort::Number(port) => Ok(port),
        RawPort::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid port: {}", text))),
    }
}
