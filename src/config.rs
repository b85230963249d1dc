// src/config.rs
use crate::chunker::{ChunkParams, ChunkUnit, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PORT: u16 = 8091;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 << 20;
pub const DEFAULT_COLLABORATOR_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {key} = {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, value: &str, reason: impl ToString) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Defaults applied when a request carries no chunking overrides
    pub chunk_params: ChunkParams,
    pub echo_text: bool,
    pub max_upload_bytes: usize,

    // Collaborators. `None` means "discover at startup".
    pub python_bin: Option<PathBuf>,
    pub extract_script: Option<PathBuf>,
    pub risk_script: Option<PathBuf>,
    pub collaborator_timeout: Duration,
    pub extract_collapse: bool,
    pub extract_max_bytes: Option<u64>,

    pub api_key: Option<String>,

    pub rate_limit_enabled: bool,
    pub rate_limit_qps: f64,
    pub rate_limit_burst: f64,
    pub rate_limit_lru_capacity: usize,
    pub trust_proxy: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            chunk_params: ChunkParams::default(),
            echo_text: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            python_bin: None,
            extract_script: None,
            risk_script: None,
            collaborator_timeout: Duration::from_secs(DEFAULT_COLLABORATOR_TIMEOUT_SECS),
            extract_collapse: false,
            extract_max_bytes: None,
            api_key: None,
            rate_limit_enabled: true,
            rate_limit_qps: 5.0,
            rate_limit_burst: 10.0,
            rate_limit_lru_capacity: 10_000,
            trust_proxy: false,
        }
    }
}

impl ApiConfig {
    /// Load configuration from the process environment. `.env` is loaded
    /// once in `main`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Blank values count
    /// as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = Self::default();

        if let Some(host) = get("INGEST_HOST") {
            config.host = host;
        }
        if let Some((key, raw)) = get("PORT")
            .map(|v| ("PORT", v))
            .or_else(|| get("INGEST_PORT").map(|v| ("INGEST_PORT", v)))
        {
            config.port = parse_value(key, &raw)?;
        }

        let size = match get("CHUNK_SIZE") {
            Some(raw) => parse_value::<i64>("CHUNK_SIZE", &raw)?,
            None => DEFAULT_CHUNK_SIZE as i64,
        };
        let overlap = match get("CHUNK_OVERLAP") {
            Some(raw) => parse_value::<i64>("CHUNK_OVERLAP", &raw)?,
            None => DEFAULT_OVERLAP as i64,
        };
        let unit = match get("CHUNK_UNIT") {
            Some(raw) => raw
                .parse::<ChunkUnit>()
                .map_err(|e| ConfigError::invalid("CHUNK_UNIT", &raw, e))?,
            None => ChunkUnit::Bytes,
        };
        config.chunk_params = ChunkParams::new(size, overlap)
            .map_err(|e| {
                ConfigError::invalid("CHUNK_SIZE/CHUNK_OVERLAP", &format!("{}/{}", size, overlap), e)
            })?
            .with_unit(unit);

        if let Some(raw) = get("ECHO_TEXT") {
            config.echo_text = parse_bool("ECHO_TEXT", &raw)?;
        }
        if let Some(raw) = get("MAX_UPLOAD_BYTES") {
            config.max_upload_bytes = parse_value("MAX_UPLOAD_BYTES", &raw)?;
        }

        config.python_bin = get("PYTHON_BIN").map(PathBuf::from);
        config.extract_script = get("PY_EXTRACT_SCRIPT").map(PathBuf::from);
        config.risk_script = get("RISK_SCRIPT").map(PathBuf::from);
        if let Some(raw) = get("COLLABORATOR_TIMEOUT_SECS") {
            let secs: u64 = parse_value("COLLABORATOR_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::invalid(
                    "COLLABORATOR_TIMEOUT_SECS",
                    &raw,
                    "must be at least 1",
                ));
            }
            config.collaborator_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = get("EXTRACT_COLLAPSE") {
            config.extract_collapse = parse_bool("EXTRACT_COLLAPSE", &raw)?;
        }
        if let Some(raw) = get("EXTRACT_MAX_BYTES") {
            config.extract_max_bytes = Some(parse_value("EXTRACT_MAX_BYTES", &raw)?);
        }

        config.api_key = get("API_KEY");

        if let Some(raw) = get("RATE_LIMIT_ENABLED") {
            config.rate_limit_enabled = parse_bool("RATE_LIMIT_ENABLED", &raw)?;
        }
        if let Some(raw) = get("RATE_LIMIT_QPS") {
            config.rate_limit_qps = parse_value("RATE_LIMIT_QPS", &raw)?;
        }
        if let Some(raw) = get("RATE_LIMIT_BURST") {
            config.rate_limit_burst = parse_value("RATE_LIMIT_BURST", &raw)?;
        }
        if let Some(raw) = get("RATE_LIMIT_LRU_CAPACITY") {
            config.rate_limit_lru_capacity = parse_value("RATE_LIMIT_LRU_CAPACITY", &raw)?;
        }
        if let Some(raw) = get("TRUST_PROXY") {
            config.trust_proxy = parse_bool("TRUST_PROXY", &raw)?;
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| ConfigError::invalid(key, raw, e))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::invalid(key, raw, "expected a boolean")),
    }
}
