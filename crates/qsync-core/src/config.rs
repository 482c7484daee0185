//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/qsync/config.toml, QSYNC_CONFIG, or --config)
//! 3. Environment variables (QSYNC_* prefix)
//!
//! Environment variables take precedence over config file values.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Environment variable prefix
const ENV_PREFIX: &str = "QSYNC";

/// Default upper bound for one serialized update
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 128_000;

/// Default window for confirming a delete
pub const DEFAULT_DELETE_CONFIRM_MS: u64 = 3_000;

/// Which snapshot backend to use when running without a transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Sqlite,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "sqlite" => Ok(StorageBackend::Sqlite),
            other => bail!("Unknown storage backend '{}' (expected file or sqlite)", other),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local data (snapshot, database, undelivered updates)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Shared exchange file; when set, updates travel through it
    #[serde(default)]
    pub exchange_path: Option<PathBuf>,

    /// Upper bound in bytes for one serialized update
    #[serde(default = "default_max_payload_size")]
    pub max_payload_size: usize,

    /// Snapshot backend used without a transport
    #[serde(default)]
    pub storage: StorageBackend,

    /// How long a delete request waits for confirmation
    #[serde(default = "default_delete_confirm_ms")]
    pub delete_confirm_ms: u64,

    /// Grid square prefilled as `myGrid` on new contacts
    #[serde(default)]
    pub station_grid: Option<String>,

    /// Write logs here instead of stderr
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Default log level when RUST_LOG is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            exchange_path: None,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            storage: StorageBackend::default(),
            delete_confirm_ms: DEFAULT_DELETE_CONFIRM_MS,
            station_grid: None,
            log_file: None,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (QSYNC_DATA_DIR, QSYNC_EXCHANGE_PATH, ...)
    /// 2. Config file (~/.config/qsync/config.toml or QSYNC_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring an explicit `--config` path
    pub fn load_with_cli_override(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides()?;
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        for key in Self::KEYS {
            let name = format!("{}_{}", ENV_PREFIX, key.to_ascii_uppercase());
            if let Ok(val) = std::env::var(&name) {
                self.set(key, &val)
                    .with_context(|| format!("Invalid value in {}", name))?;
            }
        }
        Ok(())
    }

    /// Keys accepted by `set` and the environment overrides
    pub const KEYS: [&'static str; 8] = [
        "data_dir",
        "exchange_path",
        "max_payload_size",
        "storage",
        "delete_confirm_ms",
        "station_grid",
        "log_file",
        "log_level",
    ];

    /// Set one value by key; an empty string clears optional values
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let value = value.trim();
        match key {
            "data_dir" => self.data_dir = PathBuf::from(value),
            "exchange_path" => self.exchange_path = non_empty(value).map(PathBuf::from),
            "max_payload_size" => {
                let size: usize = value
                    .parse()
                    .with_context(|| format!("max_payload_size must be a number: {}", value))?;
                if size == 0 {
                    bail!("max_payload_size must be greater than zero");
                }
                self.max_payload_size = size;
            }
            "storage" => self.storage = value.parse()?,
            "delete_confirm_ms" => {
                self.delete_confirm_ms = value
                    .parse()
                    .with_context(|| format!("delete_confirm_ms must be a number: {}", value))?
            }
            "station_grid" => {
                self.station_grid = non_empty(value).map(|grid| grid.to_uppercase())
            }
            "log_file" => self.log_file = non_empty(value).map(PathBuf::from),
            "log_level" => {
                self.log_level = non_empty(value)
                    .map(str::to_string)
                    .unwrap_or_else(default_log_level)
            }
            _ => bail!(
                "Unknown config key '{}'. Valid keys: {}",
                key,
                Self::KEYS.join(", ")
            ),
        }
        Ok(())
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with QSYNC_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("qsync")
            .join("config.toml")
    }

    /// Get the path to the JSON snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join("qsos.json")
    }

    /// Get the path to the SQLite database
    pub fn sqlite_path(&self) -> PathBuf {
        self.data_dir.join("qsync.db")
    }

    /// Get the path where updates land when the transport refuses them
    pub fn undelivered_path(&self) -> PathBuf {
        self.data_dir.join("undelivered.jsonl")
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qsync")
}

fn default_max_payload_size() -> usize {
    DEFAULT_MAX_PAYLOAD_SIZE
}

fn default_delete_confirm_ms() -> u64 {
    DEFAULT_DELETE_CONFIRM_MS
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Mutex to serialize tests that touch environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Guard that locks env access and saves/restores env vars
    struct EnvGuard<'a> {
        _lock: std::sync::MutexGuard<'a, ()>,
        saved: Vec<(String, Option<String>)>,
    }

    impl<'a> EnvGuard<'a> {
        fn new(vars: &[&str]) -> Self {
            let lock = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
            let saved = vars
                .iter()
                .map(|&name| (name.to_string(), env::var(name).ok()))
                .collect();
            for name in vars {
                env::remove_var(name);
            }
            Self { _lock: lock, saved }
        }
    }

    impl Drop for EnvGuard<'_> {
        fn drop(&mut self) {
            for (name, value) in &self.saved {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    const ENV_VARS: &[&str] = &[
        "QSYNC_DATA_DIR",
        "QSYNC_EXCHANGE_PATH",
        "QSYNC_MAX_PAYLOAD_SIZE",
        "QSYNC_STORAGE",
        "QSYNC_DELETE_CONFIRM_MS",
        "QSYNC_STATION_GRID",
        "QSYNC_LOG_FILE",
        "QSYNC_LOG_LEVEL",
        "QSYNC_CONFIG",
    ];

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.exchange_path.is_none());
        assert_eq!(config.max_payload_size, 128_000);
        assert_eq!(config.delete_confirm_ms, 3_000);
        assert_eq!(config.storage, StorageBackend::File);
        assert!(config.data_dir.ends_with("qsync"));
    }

    #[test]
    fn test_file_paths() {
        let config = Config::default();

        assert!(config.snapshot_path().ends_with("qsos.json"));
        assert!(config.sqlite_path().ends_with("qsync.db"));
        assert!(config.undelivered_path().ends_with("undelivered.jsonl"));
    }

    #[test]
    fn test_env_override_data_dir() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("QSYNC_DATA_DIR", "/tmp/qsync-test");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/qsync-test"));
    }

    #[test]
    fn test_env_override_exchange_path() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("QSYNC_EXCHANGE_PATH", "/shared/log.jsonl");
        config.apply_env_overrides().unwrap();
        assert_eq!(
            config.exchange_path,
            Some(PathBuf::from("/shared/log.jsonl"))
        );

        // Empty string clears it
        env::set_var("QSYNC_EXCHANGE_PATH", "");
        config.apply_env_overrides().unwrap();
        assert!(config.exchange_path.is_none());
    }

    #[test]
    fn test_env_override_numbers_and_storage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();

        env::set_var("QSYNC_MAX_PAYLOAD_SIZE", "4096");
        env::set_var("QSYNC_STORAGE", "SQLite");
        env::set_var("QSYNC_DELETE_CONFIRM_MS", "500");
        config.apply_env_overrides().unwrap();

        assert_eq!(config.max_payload_size, 4096);
        assert_eq!(config.storage, StorageBackend::Sqlite);
        assert_eq!(config.delete_confirm_ms, 500);
    }

    #[test]
    fn test_env_override_rejects_garbage() {
        let _guard = EnvGuard::new(ENV_VARS);

        let mut config = Config::default();
        env::set_var("QSYNC_MAX_PAYLOAD_SIZE", "lots");
        assert!(config.apply_env_overrides().is_err());
    }

    #[test]
    fn test_set() {
        let mut config = Config::default();

        config.set("station_grid", "fn31pr").unwrap();
        assert_eq!(config.station_grid.as_deref(), Some("FN31PR"));

        config.set("station_grid", "").unwrap();
        assert!(config.station_grid.is_none());

        config.set("log_level", "debug").unwrap();
        assert_eq!(config.log_level, "debug");

        assert!(config.set("max_payload_size", "0").is_err());
        assert!(config.set("storage", "postgres").is_err());
        assert!(config.set("favorite_color", "blue").is_err());
    }

    #[test]
    fn test_serialization() {
        let _guard = EnvGuard::new(ENV_VARS);

        let config = Config {
            data_dir: PathBuf::from("/data/qsync"),
            exchange_path: Some(PathBuf::from("/shared/exchange.jsonl")),
            storage: StorageBackend::Sqlite,
            ..Config::default()
        };

        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("data_dir"));
        assert!(toml_str.contains("exchange_path"));
        assert!(toml_str.contains("storage = \"sqlite\""));

        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.data_dir, config.data_dir);
        assert_eq!(parsed.exchange_path, config.exchange_path);
        assert_eq!(parsed.storage, config.storage);
    }

    #[test]
    fn test_load_from_str() {
        let _guard = EnvGuard::new(ENV_VARS);

        let toml = r#"
            data_dir = "/custom/data"
            max_payload_size = 2048
            station_grid = "FN31"
        "#;

        let config = Config::load_from_str(toml).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/custom/data"));
        assert_eq!(config.max_payload_size, 2048);
        assert_eq!(config.station_grid.as_deref(), Some("FN31"));
        assert_eq!(config.delete_confirm_ms, DEFAULT_DELETE_CONFIRM_MS);
    }

    #[test]
    fn test_load_from_path_missing_file() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        env::set_var("QSYNC_DATA_DIR", temp_dir.path().join("data"));

        let path = temp_dir.path().join("missing.toml");
        let config = Config::load_from_path(&path).unwrap();

        assert!(config.exchange_path.is_none());
        assert!(config.data_dir.exists());
    }

    #[test]
    fn test_save_and_reload() {
        let _guard = EnvGuard::new(ENV_VARS);
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");

        let config = Config {
            data_dir: temp_dir.path().join("data"),
            delete_confirm_ms: 1_000,
            ..Config::default()
        };
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_with_cli_override(Some(&path)).unwrap();
        assert_eq!(loaded.delete_confirm_ms, 1_000);
        assert_eq!(loaded.data_dir, config.data_dir);
    }
}
