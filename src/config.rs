use crate::constants::DEFAULT_DELIMITER;
use crate::error::{ReconError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_CONFIG_FILE: &str = "recon_fields.toml";

pub const ENV_DB: &str = "RECON_FIELDS_DB";
pub const ENV_TX_ROOT: &str = "RECON_FIELDS_TX_ROOT";
pub const ENV_LOG_DIR: &str = "RECON_FIELDS_LOG_DIR";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub transactions: TransactionConfig,
    pub input: InputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file mirroring the resource-object tables
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/metadata.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransactionConfig {
    pub root: PathBuf,
    /// Where the document of a failed import is written
    pub recovery_dir: PathBuf,
}

impl Default for TransactionConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data/transactions"),
            recovery_dir: PathBuf::from("data/recovery"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub delimiter: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_name: String,
    /// Default directive when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "recon_fields.log".to_string(),
            level: "recon_fields=info".to_string(),
        }
    }
}

impl Config {
    /// Load the config file, then apply environment overrides.
    ///
    /// An explicit path must exist. The default file is optional and its
    /// absence yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?,
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            ReconError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        debug!("Loaded config from {}", path.display());
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from a variable lookup (the process environment in `load`)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(v) = non_empty(ENV_DB) {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_TX_ROOT) {
            self.transactions.root = PathBuf::from(v);
        }
        if let Some(v) = non_empty(ENV_LOG_DIR) {
            self.logging.dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.input.delimiter.is_empty() {
            return Err(ReconError::Config("input.delimiter must not be empty".to_string()));
        }
        if self.logging.file_name.trim().is_empty() {
            return Err(ReconError::Config("logging.file_name must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.input.delimiter, ",");
        assert_eq!(config.store.path, PathBuf::from("data/metadata.db"));
        assert_eq!(config.logging.file_name, "recon_fields.log");
    }

    #[test]
    fn test_partial_sections() {
        let config = Config::from_toml(
            r#"
            [input]
            delimiter = "|"

            [transactions]
            root = "/var/lib/recon/tx"
            "#,
        )
        .unwrap();
        assert_eq!(config.input.delimiter, "|");
        assert_eq!(config.transactions.root, PathBuf::from("/var/lib/recon/tx"));
        assert_eq!(config.transactions.recovery_dir, PathBuf::from("data/recovery"));
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            ENV_DB => Some("/tmp/other.db".to_string()),
            ENV_LOG_DIR => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.store.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.logging.dir, PathBuf::from("logs"));
    }

    #[test]
    fn test_empty_delimiter_is_rejected() {
        let config = Config::from_toml("[input]\ndelimiter = \"\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ReconError::Config(_))));
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/recon_fields.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
