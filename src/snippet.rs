//! Snippet entries as handed over by snippet loaders

use serde::{Deserialize, Serialize};

use crate::parser::Body;
use crate::session::BufferId;

/// One prefix or several alternatives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prefix {
    One(String),
    Many(Vec<String>),
}

impl Prefix {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Prefix::One(prefix) => std::slice::from_ref(prefix),
            Prefix::Many(prefixes) => prefixes,
        };
        items.iter().map(String::as_str)
    }

    pub fn matches(&self, prefix: &str) -> bool {
        self.iter().any(|p| p == prefix)
    }
}

/// A snippet as written in a snippet collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnippetEntry {
    pub prefix: Prefix,
    pub body: Body,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Where snippets are requested for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadContext {
    pub buffer: BufferId,
    pub language_id: Option<String>,
}

/// Produces snippet entries for a context
pub trait SnippetProvider {
    fn entries(&self, ctx: &LoadContext) -> Vec<SnippetEntry>;
}

impl SnippetProvider for Vec<SnippetEntry> {
    fn entries(&self, _ctx: &LoadContext) -> Vec<SnippetEntry> {
        self.clone()
    }
}

/// Entries computed from the context on every request
pub struct Generator<F>(pub F);

impl<F> SnippetProvider for Generator<F>
where
    F: Fn(&LoadContext) -> Vec<SnippetEntry>,
{
    fn entries(&self, ctx: &LoadContext) -> Vec<SnippetEntry> {
        (self.0)(ctx)
    }
}

/// Collect entries from several providers and keep those matching `prefix`
pub fn find_by_prefix(
    providers: &[&dyn SnippetProvider],
    ctx: &LoadContext,
    prefix: &str,
) -> Vec<SnippetEntry> {
    providers
        .iter()
        .flat_map(|provider| provider.entries(ctx))
        .filter(|entry| entry.prefix.matches(prefix))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTRIES: &str = r#"
- prefix: fn
  body: "fn ${1:name}() {\n\t$0\n}"
  description: Function
- prefix: [log, print]
  body:
    - "println!(\"$1\");"
    - "$0"
"#;

    fn context(language: &str) -> LoadContext {
        LoadContext {
            buffer: BufferId::new(1),
            language_id: Some(language.to_string()),
        }
    }

    #[test]
    fn test_entries_deserialize_from_yaml() {
        let entries: Vec<SnippetEntry> = serde_yaml::from_str(ENTRIES).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].prefix, Prefix::One("fn".to_string()));
        assert_eq!(entries[0].description.as_deref(), Some("Function"));
        assert!(entries[1].prefix.matches("print"));
        assert_eq!(
            entries[1].body.clone().into_text(),
            "println!(\"$1\");\n$0"
        );
    }

    #[test]
    fn test_find_by_prefix_across_providers() {
        let static_entries: Vec<SnippetEntry> = serde_yaml::from_str(ENTRIES).unwrap();
        let by_language = Generator(|ctx: &LoadContext| {
            if ctx.language_id.as_deref() == Some("rust") {
                vec![SnippetEntry {
                    prefix: Prefix::One("log".to_string()),
                    body: Body::from("tracing::info!($1);"),
                    description: None,
                }]
            } else {
                Vec::new()
            }
        });
        let providers: [&dyn SnippetProvider; 2] = [&static_entries, &by_language];

        assert_eq!(find_by_prefix(&providers, &context("rust"), "log").len(), 2);
        assert_eq!(find_by_prefix(&providers, &context("lua"), "log").len(), 1);
        assert!(find_by_prefix(&providers, &context("rust"), "nope").is_empty());
    }
}
