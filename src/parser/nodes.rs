//! Snippet node tree

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a tabstop: a non-empty digit sequence kept verbatim.
///
/// Ids compare as numbers of arbitrary length with ties broken by the
/// original string, so `"01"` and `"1"` are distinct but adjacent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabstopId(String);

impl TabstopId {
    /// The id of the final tabstop
    pub const FINAL: &'static str = "0";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn final_id() -> Self {
        Self(Self::FINAL.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is exactly `"0"`; `"00"` is an ordinary tabstop.
    pub fn is_final(&self) -> bool {
        self.0 == Self::FINAL
    }

    fn numeric_digits(&self) -> &str {
        let trimmed = self.0.trim_start_matches('0');
        if trimmed.is_empty() {
            "0"
        } else {
            trimmed
        }
    }
}

impl Ord for TabstopId {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = (self.numeric_digits(), other.numeric_digits());
        a.len()
            .cmp(&b.len())
            .then_with(|| a.cmp(b))
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for TabstopId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for TabstopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TabstopId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A `(pattern, format, options)` triple kept exactly as written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transform {
    pub pattern: String,
    pub format: String,
    pub options: String,
}

/// A `$1` / `${1:...}` / `${1|a,b|}` node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tabstop {
    pub id: TabstopId,
    /// Resolved literal text (set by normalization only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

impl Default for TabstopId {
    fn default() -> Self {
        Self::final_id()
    }
}

/// A `$name` / `${name:...}` node
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    /// Resolved literal text (set by normalization only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Vec<Node>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
}

/// One element of a parsed snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Node {
    Text { text: String },
    Tabstop(Tabstop),
    Variable(Variable),
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text { text: text.into() }
    }

    /// A tabstop whose placeholder is a single empty text node
    pub fn empty_tabstop(id: impl Into<String>) -> Self {
        Node::Tabstop(Tabstop {
            id: TabstopId::new(id),
            placeholder: Some(vec![Node::text("")]),
            ..Tabstop::default()
        })
    }

    pub fn as_tabstop(&self) -> Option<&Tabstop> {
        match self {
            Node::Tabstop(tabstop) => Some(tabstop),
            _ => None,
        }
    }

    /// The nested placeholder of a tabstop or variable
    pub fn placeholder(&self) -> Option<&[Node]> {
        match self {
            Node::Text { .. } => None,
            Node::Tabstop(t) => t.placeholder.as_deref(),
            Node::Variable(v) => v.placeholder.as_deref(),
        }
    }

    /// Text that would be inserted into a buffer for this node
    pub fn render(&self) -> String {
        let mut out = String::new();
        self.render_into(&mut out);
        out
    }

    fn render_into(&self, out: &mut String) {
        match self {
            Node::Text { text } => out.push_str(text),
            Node::Tabstop(Tabstop {
                text, placeholder, ..
            })
            | Node::Variable(Variable {
                text, placeholder, ..
            }) => {
                if let Some(text) = text {
                    out.push_str(text);
                } else if let Some(nodes) = placeholder {
                    nodes.iter().for_each(|n| n.render_into(out));
                }
            }
        }
    }
}

/// Render a node sequence as inserted text
pub fn render(nodes: &[Node]) -> String {
    nodes.iter().map(Node::render).collect()
}

/// Whether a tabstop with id `"0"` exists anywhere in `nodes`
pub fn contains_final(nodes: &[Node]) -> bool {
    nodes.iter().any(|node| match node {
        Node::Tabstop(t) if t.id.is_final() => true,
        other => other.placeholder().is_some_and(contains_final),
    })
}

/// A snippet body: one string or lines joined with `\n`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Body {
    Text(String),
    Lines(Vec<String>),
}

impl Body {
    pub fn into_text(self) -> String {
        match self {
            Body::Text(text) => text,
            Body::Lines(lines) => lines.join("\n"),
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<Vec<String>> for Body {
    fn from(lines: Vec<String>) -> Self {
        Body::Lines(lines)
    }
}

impl From<&[&str]> for Body {
    fn from(lines: &[&str]) -> Self {
        Body::Lines(lines.iter().map(|l| l.to_string()).collect())
    }
}
