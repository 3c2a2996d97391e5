//! Store configuration loading from file and environment variables.

use std::str::FromStr;

use chronicle_types::{QueryLimits, WriteLimits};
use serde::Deserialize;
use thiserror::Error;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Which backend [`open_store`](crate::open_store) builds.
    #[serde(default)]
    pub backend: Backend,

    /// Relational backend settings.
    #[serde(default)]
    pub sqlite: SqliteConfig,

    /// Key-value backend settings.
    #[serde(default)]
    pub kv: KvConfig,

    /// Ring buffer settings.
    #[serde(default)]
    pub ring: RingConfig,

    /// Filter and event limits for the durable backends.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// SQLite database file.
    #[default]
    Sqlite,
    /// Embedded redb database file.
    Kv,
    /// Bounded in-memory ring buffer.
    Ring,
}

impl FromStr for Backend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "kv" => Ok(Self::Kv),
            "ring" => Ok(Self::Ring),
            _ => Err(ConfigError::UnknownBackend(s.to_string())),
        }
    }
}

/// SQLite backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy timeout for SQLite connections, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Extra attempts for writes that hit a locked database.
    #[serde(default = "default_retries")]
    pub retries: u32,
}

/// Key-value backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct KvConfig {
    /// Path to the redb database file.
    #[serde(default = "default_kv_path")]
    pub path: String,
}

/// Ring buffer configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RingConfig {
    /// Maximum number of events held in memory.
    #[serde(default = "default_ring_capacity")]
    pub capacity: usize,
}

/// Limits applied by the durable backends.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitsConfig {
    /// Per-filter limits.
    #[serde(default)]
    pub query: QueryLimits,

    /// Per-event limits.
    #[serde(default)]
    pub write: WriteLimits,

    /// Require every constrained tag name of a filter to match instead of any.
    #[serde(default)]
    pub match_all_tags: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "chronicle_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_db_path() -> String {
    "chronicle.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_retries() -> u32 {
    2
}

fn default_kv_path() -> String {
    "chronicle.redb".to_string()
}

fn default_ring_capacity() -> usize {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            retries: default_retries(),
        }
    }
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            path: default_kv_path(),
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: default_ring_capacity(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The backend name is not one of `sqlite`, `kv` or `ring`.
    #[error("unknown backend '{0}', expected sqlite, kv or ring")]
    UnknownBackend(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CHRONICLE_BACKEND` overrides `backend`
/// - `CHRONICLE_DB_PATH` overrides `sqlite.path`
/// - `CHRONICLE_KV_PATH` overrides `kv.path`
/// - `CHRONICLE_RING_CAPACITY` overrides `ring.capacity`
/// - `CHRONICLE_LOG_LEVEL` overrides `logging.level`
/// - `CHRONICLE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if `CHRONICLE_BACKEND` names an unknown backend.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Applies `CHRONICLE_*` overrides read through `var`.
fn apply_overrides(
    config: &mut Config,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    if let Some(backend) = var("CHRONICLE_BACKEND") {
        config.backend = backend.parse()?;
    }
    if let Some(db_path) = var("CHRONICLE_DB_PATH") {
        config.sqlite.path = db_path;
    }
    if let Some(kv_path) = var("CHRONICLE_KV_PATH") {
        config.kv.path = kv_path;
    }
    if let Some(capacity) = var("CHRONICLE_RING_CAPACITY") {
        if let Ok(parsed) = capacity.parse() {
            config.ring.capacity = parsed;
        }
    }
    if let Some(level) = var("CHRONICLE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("CHRONICLE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    Ok(())
}
