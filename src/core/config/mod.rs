//! core::config
//!
//! Configuration schema and loading.
//!
//! # Locations
//!
//! Searched in order, first existing file wins:
//! 1. `$GOALTREE_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/goaltree/config.toml`
//! 3. `~/.goaltree/config.toml`
//!
//! Missing files are not an error; defaults are used.
//!
//! # Example
//!
//! ```
//! use goaltree::core::config::{Config, ExecutionRestriction};
//!
//! let config = Config::parse_str(r#"
//!     [execution]
//!     restriction = "warn"
//! "#).unwrap();
//!
//! assert_eq!(config.restriction(), ExecutionRestriction::Warn);
//! assert_eq!(config.update_capacity(), 256);
//! ```

pub mod schema;

pub use schema::{ExecutionRestriction, FileConfig, DEFAULT_UPDATE_CAPACITY};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "GOALTREE_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Effective configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Parsed file contents
    pub file: FileConfig,
    /// Path the config was loaded from (if any)
    loaded_from: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be read, parsed
    /// or validated.
    pub fn load() -> Result<Config, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok(), dirs::home_dir())
    }

    /// Load using an explicit environment lookup and home directory.
    pub fn load_with(
        env: impl Fn(&str) -> Option<String>,
        home: Option<PathBuf>,
    ) -> Result<Config, ConfigError> {
        for path in Self::candidate_paths(&env, home) {
            if path.exists() {
                return Self::from_path(&path);
            }
        }
        Ok(Config::default())
    }

    fn candidate_paths(env: &impl Fn(&str) -> Option<String>, home: Option<PathBuf>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(explicit) = env(CONFIG_ENV) {
            paths.push(PathBuf::from(explicit));
        }
        if let Some(xdg_home) = env("XDG_CONFIG_HOME") {
            paths.push(PathBuf::from(xdg_home).join("goaltree/config.toml"));
        }
        if let Some(home) = home {
            paths.push(home.join(".goaltree/config.toml"));
        }
        paths
    }

    /// Read, parse and validate a config file.
    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: FileConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Config {
            file,
            loaded_from: Some(path.to_path_buf()),
        })
    }

    /// Parse and validate config text.
    pub fn parse_str(contents: &str) -> Result<Config, ConfigError> {
        let file: FileConfig = toml::from_str(contents).map_err(|e| ConfigError::ParseError {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        file.validate()?;
        Ok(Config {
            file,
            loaded_from: None,
        })
    }

    // =========================================================================
    // Accessors with defaults
    // =========================================================================

    /// Restriction applied to new scopes.
    ///
    /// Defaults to `none`.
    pub fn restriction(&self) -> ExecutionRestriction {
        self.file
            .execution
            .as_ref()
            .and_then(|e| e.restriction)
            .unwrap_or_default()
    }

    /// Per-tree update buffer.
    ///
    /// Defaults to [`DEFAULT_UPDATE_CAPACITY`].
    pub fn update_capacity(&self) -> usize {
        self.file
            .updates
            .as_ref()
            .and_then(|u| u.capacity)
            .unwrap_or(DEFAULT_UPDATE_CAPACITY)
    }

    pub fn loaded_from(&self) -> Option<&Path> {
        self.loaded_from.as_deref()
    }
}
