use crate::core::db::recovery::{RecoveryPolicy, RETRY_ATTEMPTS};
use crate::core::driver::{ConnectOptions, DriverKind};
use crate::core::{Result, SqlrunError};
use crate::log::{FileLog, LogSink, TracingLog};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Top-level configuration structure parsed from a TOML file.
#[derive(Debug, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub retry: Option<RetryConfig>,
    pub log: Option<LogConfig>,
}

/// Connection settings.
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// `mysql`, `pgsql` or `sqlite`
    pub driver: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub name: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Database file for sqlite, or `:memory:`
    pub path: Option<String>,
}

/// Automatic reconnect settings.
#[derive(Debug, Deserialize)]
pub struct RetryConfig {
    pub auto_reconnect: Option<bool>,
    pub attempts: Option<u32>,
    pub signatures: Option<Vec<String>>,
}

/// Failure log settings.
#[derive(Debug, Deserialize)]
pub struct LogConfig {
    pub dir: Option<String>,
}

impl Config {
    /// Builds the connection options for the configured driver.
    pub fn connect_options(&self) -> Result<ConnectOptions> {
        let db = &self.database;
        let kind = DriverKind::from_name(&db.driver)
            .ok_or_else(|| SqlrunError::Config(format!("unknown driver {:?}", db.driver)))?;
        let host = db.host.as_deref().unwrap_or("localhost");
        let user = db.user.as_deref().unwrap_or("");
        let password = db.password.as_deref().unwrap_or("");

        let options = match kind {
            DriverKind::Sqlite => {
                let path = db.path.as_deref().or(db.name.as_deref()).ok_or_else(|| {
                    SqlrunError::Config("sqlite needs database.path".to_string())
                })?;
                ConnectOptions::sqlite(path)
            }
            DriverKind::MySql => {
                ConnectOptions::mysql(host, db.port.unwrap_or(3306), self.database_name()?, user, password)
            }
            DriverKind::PostgreSql => {
                ConnectOptions::postgres(host, db.port.unwrap_or(5432), self.database_name()?, user, password)
            }
        };
        Ok(options)
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        let default = RecoveryPolicy::default();
        match &self.retry {
            None => default,
            Some(retry) => RecoveryPolicy::new(
                retry.auto_reconnect.unwrap_or(true),
                retry.attempts.unwrap_or(RETRY_ATTEMPTS),
                retry
                    .signatures
                    .clone()
                    .unwrap_or_else(|| default.signatures().to_vec()),
            ),
        }
    }

    /// A file log when `log.dir` is set, otherwise tracing output.
    pub fn log_sink(&self) -> Box<dyn LogSink> {
        match self.log.as_ref().and_then(|l| l.dir.as_ref()) {
            Some(dir) => Box::new(FileLog::new(dir)),
            None => Box::new(TracingLog),
        }
    }

    fn database_name(&self) -> Result<&str> {
        self.database
            .name
            .as_deref()
            .ok_or_else(|| SqlrunError::Config("database.name is required".to_string()))
    }
}

/// Loads configuration from a TOML file at the given path.
///
/// # Example
///
/// ```no_run
/// let config = sqlrun::config::load_config("sqlrun.toml").expect("Failed to load config");
/// println!("{:?}", config);
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// `<config dir>/sqlrun/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sqlrun").join("config.toml"))
}
