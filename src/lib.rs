//! snippet-session: snippet template parsing and interactive tabstop sessions
//!
//! This library provides:
//! - A parser for LSP-style snippet bodies (`$1`, `${1:placeholder}`,
//!   `${1|a,b|}`, `$VAR`, transforms) into a typed node tree
//! - Normalization with user lookups and built-in variables
//! - An [`Engine`](session::Engine) that expands snippets into buffers and
//!   tracks them while the user jumps between tabstops and types
//!
//! # Example
//!
//! ```
//! use snippet_session::config::StartOptions;
//! use snippet_session::session::{BufferInfo, Direction, Engine};
//!
//! let mut engine = Engine::default();
//! let buffer = engine.open_buffer("", BufferInfo::default());
//! engine.start(buffer, "$1_$1", &StartOptions::default()).unwrap();
//! engine.type_text(buffer, "x").unwrap();
//! assert_eq!(engine.buffer(buffer).unwrap().text(), "x_x");
//! engine.jump(Direction::Next);
//! ```

pub mod config;
pub mod error;
pub mod parser;
pub mod session;
pub mod snippet;

pub use error::{ConfigError, EngineError, ParseError};
