//! Snippet normalization
//!
//! After normalization every tabstop and variable carries either resolved
//! `text` or a `placeholder` (never both, never neither) and the snippet
//! contains a final tabstop.

use std::collections::HashMap;

use super::nodes::{contains_final, Node, Tabstop, Variable};
use super::variables::{self, Context};

/// Lookup table from tabstop id or variable name to literal text
pub type Lookup = HashMap<String, String>;

/// Options for [`normalize`]
#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeOptions<'a> {
    /// User-supplied values, consulted before built-in variables
    pub lookup: Option<&'a Lookup>,
    /// Context for built-in variables; built-ins are skipped without it
    pub context: Option<&'a Context>,
}

/// Resolves each distinct id/name at most once per normalization
struct Resolver<'a> {
    options: NormalizeOptions<'a>,
    tabstops: HashMap<String, Option<String>>,
    variables: HashMap<String, Option<String>>,
}

impl<'a> Resolver<'a> {
    fn new(options: NormalizeOptions<'a>) -> Self {
        Self {
            options,
            tabstops: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    fn tabstop(&mut self, id: &str) -> Option<String> {
        let lookup = self.options.lookup;
        self.tabstops
            .entry(id.to_string())
            .or_insert_with(|| lookup.and_then(|l| l.get(id).cloned()))
            .clone()
    }

    fn variable(&mut self, name: &str) -> Option<String> {
        let NormalizeOptions { lookup, context } = self.options;
        self.variables
            .entry(name.to_string())
            .or_insert_with(|| {
                lookup
                    .and_then(|l| l.get(name).cloned())
                    .or_else(|| context.and_then(|ctx| variables::resolve(name, ctx)))
            })
            .clone()
    }

    fn nodes(&mut self, nodes: &[Node]) -> Vec<Node> {
        nodes.iter().map(|node| self.node(node)).collect()
    }

    fn node(&mut self, node: &Node) -> Node {
        match node {
            Node::Text { .. } => node.clone(),
            Node::Tabstop(tabstop) => {
                let resolved = self.tabstop(tabstop.id.as_str());
                let (text, placeholder) =
                    self.fill(resolved, &tabstop.text, &tabstop.placeholder, || {
                        tabstop
                            .choices
                            .as_ref()
                            .and_then(|choices| choices.first())
                            .map(|first| vec![Node::text(first.clone())])
                    });
                Node::Tabstop(Tabstop {
                    text,
                    placeholder,
                    ..tabstop.clone()
                })
            }
            Node::Variable(variable) => {
                let resolved = self.variable(&variable.name);
                let (text, placeholder) =
                    self.fill(resolved, &variable.text, &variable.placeholder, || None);
                Node::Variable(Variable {
                    text,
                    placeholder,
                    ..variable.clone()
                })
            }
        }
    }

    /// Pick exactly one of resolved text or placeholder
    fn fill(
        &mut self,
        resolved: Option<String>,
        text: &Option<String>,
        placeholder: &Option<Vec<Node>>,
        default: impl FnOnce() -> Option<Vec<Node>>,
    ) -> (Option<String>, Option<Vec<Node>>) {
        if let Some(resolved) = resolved {
            return (Some(resolved), None);
        }
        if let Some(text) = text {
            return (Some(text.clone()), None);
        }
        let placeholder = match placeholder {
            Some(nodes) => self.nodes(nodes),
            None => default().unwrap_or_else(|| vec![Node::text("")]),
        };
        (None, Some(placeholder))
    }
}

/// Normalize a parsed snippet.
///
/// Side-effecting resolutions (dates, random values) are computed once per
/// distinct name and reused for every reference.
pub fn normalize(nodes: &[Node], options: &NormalizeOptions<'_>) -> Vec<Node> {
    let mut resolver = Resolver::new(*options);
    let mut normalized = resolver.nodes(nodes);
    if !contains_final(&normalized) {
        normalized.push(Node::empty_tabstop("0"));
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::nodes::TabstopId;
    use crate::parser::parse;

    fn normalized(body: &str) -> Vec<Node> {
        normalize(&parse(body).unwrap(), &NormalizeOptions::default())
    }

    #[test]
    fn test_final_tabstop_appended() {
        assert_eq!(
            normalized("aa"),
            vec![Node::text("aa"), Node::empty_tabstop("0")]
        );
    }

    #[test]
    fn test_final_tabstop_not_duplicated_when_nested() {
        let nodes = normalized("${1:x $0}");
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_empty_placeholder_synthesized() {
        assert_eq!(
            normalized("$1"),
            vec![Node::empty_tabstop("1"), Node::empty_tabstop("0")]
        );
    }

    #[test]
    fn test_choice_default_is_first_choice() {
        let nodes = normalized("${1|aa,bb|}");
        let tabstop = nodes[0].as_tabstop().unwrap();
        assert_eq!(tabstop.placeholder, Some(vec![Node::text("aa")]));
        assert_eq!(nodes[0].render(), "aa");
    }

    #[test]
    fn test_lookup_replaces_placeholder() {
        let lookup = Lookup::from([
            ("1".to_string(), "one".to_string()),
            ("AUTHOR".to_string(), "me".to_string()),
        ]);
        let options = NormalizeOptions {
            lookup: Some(&lookup),
            context: None,
        };
        let nodes = normalize(&parse("${1:x} $AUTHOR ${2:y}").unwrap(), &options);

        let one = nodes[0].as_tabstop().unwrap();
        assert_eq!(one.text.as_deref(), Some("one"));
        assert_eq!(one.placeholder, None);
        assert_eq!(render(&nodes), "one me y");
    }

    #[test]
    fn test_unknown_variable_gets_empty_placeholder() {
        let nodes = normalize(
            &parse("$SNIPPET_SESSION_UNKNOWN").unwrap(),
            &NormalizeOptions {
                lookup: None,
                context: Some(&Context::default()),
            },
        );
        match &nodes[0] {
            Node::Variable(v) => {
                assert_eq!(v.text, None);
                assert_eq!(v.placeholder, Some(vec![Node::text("")]));
            }
            other => panic!("expected variable, got {:?}", other),
        }
    }

    #[test]
    fn test_variable_resolved_once() {
        let ctx = Context::default();
        let nodes = normalize(
            &parse("$RANDOM-$RANDOM").unwrap(),
            &NormalizeOptions {
                lookup: None,
                context: Some(&ctx),
            },
        );
        let text = render(&nodes);
        let (a, b) = text.split_once('-').unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_lookup_wins_over_builtin() {
        let lookup = Lookup::from([("TM_FILENAME".to_string(), "override".to_string())]);
        let ctx = Context {
            file_path: Some("a.rs".into()),
            ..Context::default()
        };
        let nodes = normalize(
            &parse("$TM_FILENAME").unwrap(),
            &NormalizeOptions {
                lookup: Some(&lookup),
                context: Some(&ctx),
            },
        );
        assert_eq!(render(&nodes), "override");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalized("a ${1:b ${2}} ${3|x,y|} $VAR $0");
        let twice = normalize(&once, &NormalizeOptions::default());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_final_tabstop_kept_in_place() {
        let nodes = normalized("$0 tail");
        assert_eq!(
            nodes[0].as_tabstop().map(|t| t.id.clone()),
            Some(TabstopId::final_id())
        );
        assert_eq!(nodes.len(), 2);
    }

    fn render(nodes: &[Node]) -> String {
        crate::parser::nodes::render(nodes)
    }
}
