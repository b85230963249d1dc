//! Monitoring configuration
//!
//! Loads from environment variables:
//! - MONITORING_ENABLED: install the tracing subscriber at all (true/false)
//! - RUST_LOG: tracing filter (debug, info, warn, error, or directives)
//! - LOG_FORMAT: console output format (json or text)
//! - LOG_TO_FILE: also write daily-rotated JSON logs (true/false)
//! - LOG_DIR: directory for log files (default: ~/.chunk-ingest/logs)
//! - LOG_RETENTION_DAYS: rotated files kept on disk (default: 7)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,

    /// Filter used when RUST_LOG is unset
    pub log_level: String,

    pub log_format: LogFormat,

    pub log_dir: PathBuf,

    pub log_retention_days: u32,

    pub enable_file_logging: bool,

    pub enable_console_logging: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    pub fn as_str(&self) -> &str {
        match self {
            LogFormat::Json => "json",
            LogFormat::Text => "text",
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" => Ok(LogFormat::Text),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            log_dir: Self::default_log_dir(),
            log_retention_days: 7,
            enable_file_logging: false,
            enable_console_logging: true,
        }
    }
}

impl MonitoringConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(enabled) = std::env::var("MONITORING_ENABLED") {
            config.enabled = enabled.to_lowercase() == "true" || enabled == "1";
        }

        if let Ok(log_level) = std::env::var("RUST_LOG") {
            config.log_level = log_level;
        }

        if let Ok(log_format) = std::env::var("LOG_FORMAT") {
            if let Ok(format) = log_format.parse() {
                config.log_format = format;
            }
        }

        if let Ok(to_file) = std::env::var("LOG_TO_FILE") {
            config.enable_file_logging = to_file.to_lowercase() == "true" || to_file == "1";
        }

        if let Ok(log_dir) = std::env::var("LOG_DIR") {
            config.log_dir = PathBuf::from(log_dir);
        }

        if let Ok(retention) = std::env::var("LOG_RETENTION_DAYS") {
            if let Ok(days) = retention.parse() {
                config.log_retention_days = days;
            }
        }

        config
    }

    /// ~/.chunk-ingest/logs, or /tmp/.chunk-ingest/logs without HOME
    pub fn default_log_dir() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        PathBuf::from(home).join(".chunk-ingest").join("logs")
    }

    pub fn ensure_log_dir(&self) -> Result<(), Box<dyn std::error::Error>> {
        if !self.log_dir.exists() {
            std::fs::create_dir_all(&self.log_dir)?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let perms = std::fs::Permissions::from_mode(0o755);
                std::fs::set_permissions(&self.log_dir, perms)?;
            }
        }

        Ok(())
    }
}
