//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Example
//!
//! ```toml
//! [execution]
//! restriction = "warn"
//!
//! [updates]
//! capacity = 512
//! ```
//!
//! # Validation
//!
//! Values are validated after parsing (e.g. the update buffer must be
//! non-empty).

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Default per-tree update buffer.
pub const DEFAULT_UPDATE_CAPACITY: usize = 256;

/// Policy applied when a goal is started while eager execution is restricted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionRestriction {
    /// Starting goals is allowed.
    #[default]
    None,
    /// Starting goals is allowed but logged.
    Warn,
    /// Starting goals fails with `GoalError::EagerExecution`.
    Error,
}

impl std::fmt::Display for ExecutionRestriction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionRestriction::None => write!(f, "none"),
            ExecutionRestriction::Warn => write!(f, "warn"),
            ExecutionRestriction::Error => write!(f, "error"),
        }
    }
}

/// Root of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    /// Goal execution settings
    pub execution: Option<ExecutionSection>,

    /// Update stream settings
    pub updates: Option<UpdatesSection>,
}

impl FileConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(updates) = &self.updates {
            if updates.capacity == Some(0) {
                return Err(ConfigError::InvalidValue(
                    "updates.capacity must be greater than zero".into(),
                ));
            }
        }
        Ok(())
    }
}

/// `[execution]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutionSection {
    /// Restriction applied to scopes built from this config
    pub restriction: Option<ExecutionRestriction>,
}

/// `[updates]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct UpdatesSection {
    /// Buffered events per subscriber before the oldest are dropped
    pub capacity: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restriction_parses_lowercase() {
        let config: FileConfig = toml::from_str(
            r#"
            [execution]
            restriction = "error"
            "#,
        )
        .unwrap();
        assert_eq!(
            config.execution.unwrap().restriction,
            Some(ExecutionRestriction::Error)
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let config = FileConfig {
            updates: Some(UpdatesSection { capacity: Some(0) }),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn empty_is_valid() {
        assert!(FileConfig::default().validate().is_ok());
    }
}
