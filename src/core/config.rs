//! Configuration for the key cache and the tag interpreters
//!
//! Configuration is plain TOML. Every field has a default, so an empty
//! document is a valid configuration:
//!
//! ```toml
//! [cache]
//! memory_capacity = 100
//! persistent_capacity = 1000
//! ttl_secs = 2592000
//! namespace = "derived_keys"
//!
//! [interpreter]
//! color_match_threshold = 100.0
//! ```

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Default memory tier capacity (entries)
pub const DEFAULT_MEMORY_CAPACITY: usize = 100;

/// Default persistent tier capacity (entries)
pub const DEFAULT_PERSISTENT_CAPACITY: usize = 1000;

/// Default time-to-live for derived keys (30 days)
pub const DEFAULT_TTL_SECS: u64 = 30 * 24 * 60 * 60;

/// Default store namespace prefix for persisted keys
pub const DEFAULT_NAMESPACE: &str = "derived_keys";

/// Default maximum RGB distance accepted as a catalog color match
pub const DEFAULT_COLOR_MATCH_THRESHOLD: f64 = 100.0;

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub cache: CacheConfig,

    #[validate(nested)]
    pub interpreter: InterpreterConfig,
}

impl Config {
    /// Parse and validate a TOML document
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}

/// Derived key cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held in the memory tier
    #[validate(range(min = 1))]
    pub memory_capacity: usize,

    /// Maximum number of entries held in the persistent tier
    #[validate(range(min = 1))]
    pub persistent_capacity: usize,

    /// Entries older than this are treated as absent
    #[validate(range(min = 1))]
    pub ttl_secs: u64,

    /// Store namespace prefix; entries land in `<namespace>.<engine id>`
    #[validate(length(min = 1))]
    pub namespace: String,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            persistent_capacity: DEFAULT_PERSISTENT_CAPACITY,
            ttl_secs: DEFAULT_TTL_SECS,
            namespace: DEFAULT_NAMESPACE.to_string(),
        }
    }
}

/// Interpreter tuning
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Euclidean RGB distance below which a catalog product counts as the
    /// same color. The largest possible distance is ~441.7.
    #[validate(range(min = 1.0, max = 442.0))]
    pub color_match_threshold: f64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            color_match_threshold: DEFAULT_COLOR_MATCH_THRESHOLD,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpoolTagError;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.cache.memory_capacity, DEFAULT_MEMORY_CAPACITY);
        assert_eq!(config.cache.persistent_capacity, DEFAULT_PERSISTENT_CAPACITY);
        assert_eq!(config.cache.ttl(), Duration::from_secs(DEFAULT_TTL_SECS));
        assert_eq!(config.cache.namespace, "derived_keys");
        assert_eq!(config.interpreter.color_match_threshold, 100.0);
    }

    #[test]
    fn test_partial_override() {
        let config = Config::from_toml_str(
            r#"
            [cache]
            memory_capacity = 8

            [interpreter]
            color_match_threshold = 42.5
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.memory_capacity, 8);
        assert_eq!(config.cache.persistent_capacity, DEFAULT_PERSISTENT_CAPACITY);
        assert_eq!(config.interpreter.color_match_threshold, 42.5);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = Config::from_toml_str("[cache]\nmemory_capacity = 0\n");
        assert!(matches!(result, Err(SpoolTagError::ConfigValidation(_))));
    }

    #[test]
    fn test_empty_namespace_rejected() {
        let result = Config::from_toml_str("[cache]\nnamespace = \"\"\n");
        assert!(matches!(result, Err(SpoolTagError::ConfigValidation(_))));
    }

    #[test]
    fn test_malformed_toml() {
        let result = Config::from_toml_str("[cache\nmemory_capacity = ");
        assert!(matches!(result, Err(SpoolTagError::ConfigParse(_))));
    }
}
