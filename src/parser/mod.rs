//! Snippet grammar: node tree, parser, normalization and built-in variables

pub mod nodes;
mod normalize;
mod scanner;
pub mod variables;

pub use nodes::{render, Body, Node, Tabstop, TabstopId, Transform, Variable};
pub use normalize::{normalize, Lookup, NormalizeOptions};
pub use scanner::parse;
pub use variables::Context;
