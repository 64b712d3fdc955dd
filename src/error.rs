//! Error types for parsing, configuration and engine operations

use std::path::PathBuf;

use thiserror::Error;

/// A malformed snippet body.
///
/// Positions are character indices into the body (lines joined with `\n`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(
        "`${{` at position {position} should be followed by a digit (tabstop) \
         or a letter/underscore (variable), not {found:?}"
    )]
    InvalidBraceStart { position: usize, found: char },

    #[error(
        "tabstop id at position {position} should be followed by `}}`, `:`, `|` or `/`, \
         not {found:?}"
    )]
    InvalidAfterTabstopId { position: usize, found: char },

    #[error(
        "variable name at position {position} should be followed by `}}`, `:` or `/`, \
         not {found:?}"
    )]
    InvalidAfterVariableName { position: usize, found: char },

    #[error("choice list at position {position} should be closed with `|}}`, not {found:?}")]
    InvalidChoiceClose { position: usize, found: char },

    #[error("unexpected end of snippet: {construct} is not closed, expected {expected}")]
    UnexpectedEof {
        construct: &'static str,
        expected: &'static str,
    },
}

/// Invalid configuration or options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid lookup key {key:?}: expected a tabstop id (digits) or a variable name")]
    InvalidLookupKey { key: String },

    #[error("invalid indicator `{field}`: {reason}")]
    InvalidIndicator { field: &'static str, reason: String },
}

/// Errors surfaced synchronously by [`crate::session::Engine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unknown buffer {0}")]
    UnknownBuffer(crate::session::BufferId),

    #[error("position {line}:{character} is outside of the buffer")]
    InvalidPosition { line: u32, character: u32 },

    #[error("range {start}..{end} is not a valid range of the buffer")]
    InvalidRange { start: usize, end: usize },
}
