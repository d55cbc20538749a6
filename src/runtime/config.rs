//! Runtime configuration.
//!
//! Settings are read from a TOML file (`lazyrts.toml` by convention) or built
//! in code. Every field has a default, so an empty file is a valid
//! configuration.
//!
//! ## Format
//!
//! ```toml
//! capabilities = 8
//! eager_blackholing = true
//! keep_cafs = false
//! log_level = "debug"
//!
//! [debug]
//! scheduler = true
//! gccafs = true
//! ```

use std::fmt;
use std::path::Path;

use serde::Deserialize;

/// Log levels accepted by `log_level`.
const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Runtime configuration shared by every capability.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RtsConfig {
    /// Number of capabilities (parallel workers) in the reference host.
    pub capabilities: usize,

    /// Claim thunks before evaluating them so contenders block instead of
    /// duplicating work.
    pub eager_blackholing: bool,

    /// Initial value of the CAF registry's keep flag.
    pub keep_cafs: bool,

    /// Maximum level emitted by [`crate::runtime::logging::init`].
    pub log_level: String,

    /// Per-subsystem diagnostics.
    pub debug: DebugFlags,
}

/// Debug switches, one per runtime subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebugFlags {
    /// Log task blocking and wakeups.
    pub scheduler: bool,
    /// Log every apply-family call.
    pub apply: bool,
    /// Log CAF registration and revert.
    pub gccafs: bool,
    /// Check graph invariants on every update.
    pub sanity: bool,
}

impl Default for RtsConfig {
    fn default() -> Self {
        Self {
            capabilities: num_cpus::get(),
            eager_blackholing: false,
            keep_cafs: false,
            log_level: "warn".to_string(),
            debug: DebugFlags::default(),
        }
    }
}

impl RtsConfig {
    /// Parse and validate a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RtsConfig = toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values that cannot describe a running host.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capabilities == 0 {
            return Err(ConfigError::Invalid("capabilities must be at least 1".to_string()));
        }
        if !LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "unknown log_level '{}' (expected one of {})",
                self.log_level,
                LOG_LEVELS.join(", ")
            )));
        }
        Ok(())
    }

    /// Same configuration with eager blackholing switched on.
    pub fn with_eager_blackholing(mut self) -> Self {
        self.eager_blackholing = true;
        self
    }

    /// Same configuration with a fixed number of capabilities.
    pub fn with_capabilities(mut self, n: usize) -> Self {
        self.capabilities = n;
        self
    }
}

/// Errors raised while loading a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The file could not be read
    Io { path: String, message: String },
    /// The file is not valid TOML for [`RtsConfig`]
    Parse(String),
    /// A field holds an unusable value
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, message } => write!(f, "Cannot read {}: {}", path, message),
            ConfigError::Parse(msg) => write!(f, "Invalid runtime configuration: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid runtime configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = RtsConfig::from_toml_str("").unwrap();
        assert_eq!(config, RtsConfig::default());
        assert!(!config.eager_blackholing);
        assert!(config.capabilities >= 1);
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            capabilities = 3
            eager_blackholing = true
            keep_cafs = true
            log_level = "trace"

            [debug]
            scheduler = true
            gccafs = true
        "#;
        let config = RtsConfig::from_toml_str(text).unwrap();
        assert_eq!(config.capabilities, 3);
        assert!(config.eager_blackholing);
        assert!(config.keep_cafs);
        assert_eq!(config.log_level, "trace");
        assert!(config.debug.scheduler);
        assert!(config.debug.gccafs);
        assert!(!config.debug.apply);
    }

    #[test]
    fn test_zero_capabilities_rejected() {
        let err = RtsConfig::from_toml_str("capabilities = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_log_level_rejected() {
        let err = RtsConfig::from_toml_str(r#"log_level = "loud""#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = RtsConfig::from_toml_str("eager = true").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = RtsConfig::load(Path::new("/nonexistent/lazyrts.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
