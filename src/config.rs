//! Engine configuration
//!
//! Loaded from YAML:
//!
//! ```yaml
//! lookup:
//!   AUTHOR: someone
//! indicators:
//!   empty_tabstop: "•"
//!   empty_tabstop_final: "∎"
//! ```

use std::fs;
use std::path::Path;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::parser::{Context, Lookup};

lazy_static! {
    static ref LOOKUP_KEY_RE: Regex = Regex::new(r"^(\d+|[A-Za-z_][A-Za-z0-9_]*)$").unwrap();
}

/// Virtual text shown on empty tabstop occurrences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Indicators {
    pub empty_tabstop: String,
    pub empty_tabstop_final: String,
}

impl Default for Indicators {
    fn default() -> Self {
        Self {
            empty_tabstop: "•".to_string(),
            empty_tabstop_final: "∎".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Global lookup, overridden per call by [`StartOptions::lookup`]
    pub lookup: Lookup,
    pub indicators: Indicators,
}

impl EngineConfig {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_lookup(&self.lookup)?;
        for (field, value) in [
            ("empty_tabstop", &self.indicators.empty_tabstop),
            ("empty_tabstop_final", &self.indicators.empty_tabstop_final),
        ] {
            if value.contains('\n') {
                return Err(ConfigError::InvalidIndicator {
                    field,
                    reason: "must not contain a newline".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Check that every key is a tabstop id or a variable name
pub fn validate_lookup(lookup: &Lookup) -> Result<(), ConfigError> {
    let mut keys: Vec<&String> = lookup.keys().collect();
    keys.sort();
    match keys.into_iter().find(|key| !LOOKUP_KEY_RE.is_match(key)) {
        Some(key) => Err(ConfigError::InvalidLookupKey { key: key.clone() }),
        None => Ok(()),
    }
}

/// Per-call options of [`crate::session::Engine::start`]
#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Wins over the configured lookup
    pub lookup: Lookup,
    /// Editing context for built-in variables; derived from the buffer when
    /// absent
    pub context: Option<Context>,
}

impl StartOptions {
    pub fn with_lookup<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            lookup: entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
            context: None,
        }
    }
}
