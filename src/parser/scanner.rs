//! Snippet body parsing
//!
//! A single left-to-right scan over the body characters. The scanner keeps a
//! [`Mode`] (which owns the tabstop/variable currently being read) and a stack
//! of sibling layers, one per open placeholder. Closing a placeholder pops the
//! innermost layer and hands it to the node that opened it.
//!
//! Leniencies:
//! - a `$` not starting a tabstop or variable is literal text
//! - a `}` outside of any `${...}` is literal text
//! - a backslash not escaping a special character is kept as is

use crate::error::ParseError;

use super::nodes::{Body, Node, Tabstop, TabstopId, Transform, Variable};

/// A tabstop or variable whose header is still being scanned
#[derive(Debug)]
struct Open {
    is_tabstop: bool,
    key: String,
    choices: Option<Vec<String>>,
    transform: Option<Transform>,
}

impl Open {
    fn tabstop(first: char) -> Self {
        Self {
            is_tabstop: true,
            key: first.to_string(),
            choices: None,
            transform: None,
        }
    }

    fn variable(first: char) -> Self {
        Self {
            is_tabstop: false,
            ..Self::tabstop(first)
        }
    }

    fn transform_mut(&mut self) -> &mut Transform {
        self.transform.get_or_insert_with(|| Transform {
            pattern: String::new(),
            format: String::new(),
            options: String::new(),
        })
    }

    fn into_node(self, placeholder: Option<Vec<Node>>) -> Node {
        if self.is_tabstop {
            Node::Tabstop(Tabstop {
                id: TabstopId::new(self.key),
                text: None,
                placeholder,
                choices: self.choices,
                transform: self.transform,
            })
        } else {
            Node::Variable(Variable {
                name: self.key,
                text: None,
                placeholder,
                transform: self.transform,
            })
        }
    }
}

#[derive(Debug)]
enum Mode {
    Text { escaped: bool },
    /// After `$`
    Dollar,
    /// After `${`
    DollarBrace,
    TabstopId { open: Open, braced: bool },
    VariableName { open: Open, braced: bool },
    Choices { open: Open, item: String, escaped: bool },
    /// After the unescaped `|` ending the last choice
    ChoicesEnd { open: Open },
    Pattern { open: Open, escaped: bool },
    Format {
        open: Open,
        depth: usize,
        escaped: bool,
        after_dollar: bool,
    },
    Options { open: Open },
}

enum Step {
    Consumed,
    /// Character must be scanned again in the new mode
    Reprocess,
}

struct Scanner {
    mode: Mode,
    /// `layers[0]` is the root; every other layer is an open placeholder
    layers: Vec<Vec<Node>>,
    /// Owner of each non-root layer (`owners.len() + 1 == layers.len()`)
    owners: Vec<Open>,
    position: usize,
}

fn is_name_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Scanner {
    fn new() -> Self {
        Self {
            mode: Mode::Text { escaped: false },
            layers: vec![Vec::new()],
            owners: Vec::new(),
            position: 0,
        }
    }

    fn push_text(&mut self, text: &str) {
        let Some(layer) = self.layers.last_mut() else {
            return;
        };
        match layer.last_mut() {
            Some(Node::Text { text: current }) => current.push_str(text),
            _ => layer.push(Node::text(text)),
        }
    }

    fn push_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.push_text(c.encode_utf8(&mut buf));
    }

    fn push_node(&mut self, node: Node) {
        if let Some(layer) = self.layers.last_mut() {
            layer.push(node);
        }
    }

    fn open_placeholder(&mut self, open: Open) {
        self.owners.push(open);
        self.layers.push(Vec::new());
    }

    /// Returns `false` when no placeholder is open
    fn close_placeholder(&mut self) -> bool {
        let Some(owner) = self.owners.pop() else {
            return false;
        };
        let nodes = self.layers.pop().unwrap_or_default();
        self.push_node(owner.into_node(Some(nodes)));
        true
    }

    fn feed(&mut self, c: char) -> Result<(), ParseError> {
        while let Step::Reprocess = self.step(c)? {}
        self.position += 1;
        Ok(())
    }

    fn step(&mut self, c: char) -> Result<Step, ParseError> {
        let position = self.position;
        let mode = std::mem::replace(&mut self.mode, Mode::Text { escaped: false });

        self.mode = match mode {
            Mode::Text { escaped: true } => {
                if !matches!(c, '$' | '}' | '\\') {
                    self.push_char('\\');
                }
                self.push_char(c);
                Mode::Text { escaped: false }
            }
            Mode::Text { escaped: false } => match c {
                '\\' => Mode::Text { escaped: true },
                '$' => Mode::Dollar,
                '}' => {
                    if !self.close_placeholder() {
                        self.push_char(c);
                    }
                    Mode::Text { escaped: false }
                }
                _ => {
                    self.push_char(c);
                    Mode::Text { escaped: false }
                }
            },

            Mode::Dollar => match c {
                '{' => Mode::DollarBrace,
                _ if c.is_ascii_digit() => Mode::TabstopId {
                    open: Open::tabstop(c),
                    braced: false,
                },
                _ if is_name_start(c) => Mode::VariableName {
                    open: Open::variable(c),
                    braced: false,
                },
                _ => {
                    self.push_char('$');
                    return Ok(Step::Reprocess);
                }
            },

            Mode::DollarBrace => match c {
                _ if c.is_ascii_digit() => Mode::TabstopId {
                    open: Open::tabstop(c),
                    braced: true,
                },
                _ if is_name_start(c) => Mode::VariableName {
                    open: Open::variable(c),
                    braced: true,
                },
                _ => return Err(ParseError::InvalidBraceStart { position, found: c }),
            },

            Mode::TabstopId { mut open, braced } => {
                if c.is_ascii_digit() {
                    open.key.push(c);
                    Mode::TabstopId { open, braced }
                } else if !braced {
                    self.push_node(open.into_node(None));
                    return Ok(Step::Reprocess);
                } else {
                    match c {
                        '}' => {
                            self.push_node(open.into_node(None));
                            Mode::Text { escaped: false }
                        }
                        ':' => {
                            self.open_placeholder(open);
                            Mode::Text { escaped: false }
                        }
                        '|' => Mode::Choices {
                            open,
                            item: String::new(),
                            escaped: false,
                        },
                        '/' => Mode::Pattern {
                            open,
                            escaped: false,
                        },
                        _ => return Err(ParseError::InvalidAfterTabstopId { position, found: c }),
                    }
                }
            }

            Mode::VariableName { mut open, braced } => {
                if is_name_char(c) {
                    open.key.push(c);
                    Mode::VariableName { open, braced }
                } else if !braced {
                    self.push_node(open.into_node(None));
                    return Ok(Step::Reprocess);
                } else {
                    match c {
                        '}' => {
                            self.push_node(open.into_node(None));
                            Mode::Text { escaped: false }
                        }
                        ':' => {
                            self.open_placeholder(open);
                            Mode::Text { escaped: false }
                        }
                        '/' => Mode::Pattern {
                            open,
                            escaped: false,
                        },
                        _ => {
                            return Err(ParseError::InvalidAfterVariableName { position, found: c })
                        }
                    }
                }
            }

            Mode::Choices {
                mut open,
                mut item,
                escaped,
            } => {
                if escaped {
                    if !matches!(c, ',' | '|' | '\\') {
                        item.push('\\');
                    }
                    item.push(c);
                    Mode::Choices {
                        open,
                        item,
                        escaped: false,
                    }
                } else {
                    match c {
                        '\\' => Mode::Choices {
                            open,
                            item,
                            escaped: true,
                        },
                        ',' => {
                            open.choices.get_or_insert_with(Vec::new).push(item);
                            Mode::Choices {
                                open,
                                item: String::new(),
                                escaped: false,
                            }
                        }
                        '|' => {
                            open.choices.get_or_insert_with(Vec::new).push(item);
                            Mode::ChoicesEnd { open }
                        }
                        '}' => return Err(ParseError::InvalidChoiceClose { position, found: c }),
                        _ => {
                            item.push(c);
                            Mode::Choices {
                                open,
                                item,
                                escaped: false,
                            }
                        }
                    }
                }
            }

            Mode::ChoicesEnd { open } => {
                if c != '}' {
                    return Err(ParseError::InvalidChoiceClose { position, found: c });
                }
                self.push_node(open.into_node(None));
                Mode::Text { escaped: false }
            }

            Mode::Pattern { mut open, escaped } => {
                if !escaped && c == '/' {
                    Mode::Format {
                        open,
                        depth: 0,
                        escaped: false,
                        after_dollar: false,
                    }
                } else {
                    open.transform_mut().pattern.push(c);
                    Mode::Pattern {
                        open,
                        escaped: !escaped && c == '\\',
                    }
                }
            }

            Mode::Format {
                mut open,
                mut depth,
                escaped,
                after_dollar,
            } => {
                if !escaped && depth == 0 && c == '/' {
                    // Make sure an empty format is still recorded
                    open.transform_mut();
                    Mode::Options { open }
                } else {
                    if !escaped {
                        match c {
                            '{' if after_dollar => depth += 1,
                            '}' if depth > 0 => depth -= 1,
                            _ => {}
                        }
                    }
                    open.transform_mut().format.push(c);
                    Mode::Format {
                        open,
                        depth,
                        escaped: !escaped && c == '\\',
                        after_dollar: !escaped && c == '$',
                    }
                }
            }

            Mode::Options { mut open } => {
                if c == '}' {
                    self.push_node(open.into_node(None));
                    Mode::Text { escaped: false }
                } else {
                    open.transform_mut().options.push(c);
                    Mode::Options { open }
                }
            }
        };

        Ok(Step::Consumed)
    }

    fn finish(mut self) -> Result<Vec<Node>, ParseError> {
        let mode = std::mem::replace(&mut self.mode, Mode::Text { escaped: false });
        match mode {
            Mode::Text { escaped } => {
                if escaped {
                    self.push_char('\\');
                }
            }
            Mode::Dollar => self.push_char('$'),
            Mode::DollarBrace => {
                return Err(ParseError::UnexpectedEof {
                    construct: "`${`",
                    expected: "a digit or a letter/underscore",
                })
            }
            Mode::TabstopId { open, braced: false }
            | Mode::VariableName { open, braced: false } => {
                self.push_node(open.into_node(None))
            }
            Mode::TabstopId { braced: true, .. } => {
                return Err(ParseError::UnexpectedEof {
                    construct: "tabstop",
                    expected: "`}`, `:`, `|` or `/`",
                })
            }
            Mode::VariableName { braced: true, .. } => {
                return Err(ParseError::UnexpectedEof {
                    construct: "variable",
                    expected: "`}`, `:` or `/`",
                })
            }
            Mode::Choices { .. } | Mode::ChoicesEnd { .. } => {
                return Err(ParseError::UnexpectedEof {
                    construct: "choice list",
                    expected: "`|}`",
                })
            }
            Mode::Pattern { .. } | Mode::Format { .. } => {
                return Err(ParseError::UnexpectedEof {
                    construct: "transform",
                    expected: "`/`",
                })
            }
            Mode::Options { .. } => {
                return Err(ParseError::UnexpectedEof {
                    construct: "transform",
                    expected: "`}`",
                })
            }
        }

        if !self.owners.is_empty() {
            return Err(ParseError::UnexpectedEof {
                construct: "placeholder",
                expected: "`}`",
            });
        }

        let root = self.layers.pop().unwrap_or_default();
        let nodes = prune(root);
        if nodes.is_empty() {
            return Ok(vec![Node::text("")]);
        }
        Ok(nodes)
    }
}

/// Drop empty text, guarantee non-empty placeholders and strip choices
/// from the final tabstop.
fn prune(nodes: Vec<Node>) -> Vec<Node> {
    nodes
        .into_iter()
        .filter_map(|node| match node {
            Node::Text { ref text } if text.is_empty() => None,
            Node::Text { .. } => Some(node),
            Node::Tabstop(mut tabstop) => {
                if tabstop.id.is_final() {
                    tabstop.choices = None;
                }
                tabstop.placeholder = tabstop.placeholder.map(prune_placeholder);
                Some(Node::Tabstop(tabstop))
            }
            Node::Variable(mut variable) => {
                variable.placeholder = variable.placeholder.map(prune_placeholder);
                Some(Node::Variable(variable))
            }
        })
        .collect()
}

fn prune_placeholder(nodes: Vec<Node>) -> Vec<Node> {
    let nodes = prune(nodes);
    if nodes.is_empty() {
        vec![Node::text("")]
    } else {
        nodes
    }
}

/// Parse a snippet body into its node tree.
///
/// Array bodies are joined with `\n` before scanning.
pub fn parse(body: impl Into<Body>) -> Result<Vec<Node>, ParseError> {
    let text = body.into().into_text();
    let mut scanner = Scanner::new();
    for c in text.chars() {
        scanner.feed(c)?;
    }
    scanner.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn tabstop(id: &str) -> Tabstop {
        Tabstop {
            id: TabstopId::from(id),
            ..Tabstop::default()
        }
    }

    fn variable(name: &str) -> Variable {
        Variable {
            name: name.to_string(),
            ..Variable::default()
        }
    }

    #[test]
    fn test_parse_plain_text() {
        assert_eq!(parse("aa").unwrap(), vec![Node::text("aa")]);
    }

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(parse("").unwrap(), vec![Node::text("")]);
    }

    #[test]
    fn test_parse_lines_are_joined() {
        let nodes = parse(vec!["a".to_string(), "$1".to_string()]).unwrap();
        assert_eq!(
            nodes,
            vec![Node::text("a\n"), Node::Tabstop(tabstop("1"))]
        );
    }

    #[test]
    fn test_parse_escapes_in_text() {
        assert_eq!(parse(r"\$1 \} \\").unwrap(), vec![Node::text(r"$1 } \")]);
        // Unknown escapes are kept verbatim
        assert_eq!(parse(r"\n\a").unwrap(), vec![Node::text(r"\n\a")]);
        // Trailing backslash is literal
        assert_eq!(parse("a\\").unwrap(), vec![Node::text("a\\")]);
    }

    #[test]
    fn test_parse_bare_tabstops_in_document_order() {
        let nodes = parse("$3 $2 $0").unwrap();
        let ids: Vec<_> = nodes
            .iter()
            .filter_map(Node::as_tabstop)
            .map(|t| t.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["3", "2", "0"]);
    }

    #[test]
    fn test_parse_leading_zero_ids_are_distinct() {
        let nodes = parse("$01$1").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Tabstop(tabstop("01")), Node::Tabstop(tabstop("1"))]
        );
    }

    #[test]
    fn test_parse_bare_variable() {
        let nodes = parse("$TM_FILENAME-x").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Variable(variable("TM_FILENAME")), Node::text("-x")]
        );
    }

    #[test]
    fn test_parse_orphan_dollars_are_text() {
        assert_eq!(parse("$").unwrap(), vec![Node::text("$")]);
        assert_eq!(parse("a $ b").unwrap(), vec![Node::text("a $ b")]);
        assert_eq!(parse("$-").unwrap(), vec![Node::text("$-")]);
        assert_eq!(
            parse("$$1").unwrap(),
            vec![Node::text("$"), Node::Tabstop(tabstop("1"))]
        );
    }

    #[test]
    fn test_parse_unmatched_closing_brace_is_text() {
        assert_eq!(parse("a}b").unwrap(), vec![Node::text("a}b")]);
    }

    #[test]
    fn test_parse_placeholder_nested() {
        let nodes = parse("${1:a ${2:b ${3:c}}} d").unwrap();
        let expected = vec![
            Node::Tabstop(Tabstop {
                placeholder: Some(vec![
                    Node::text("a "),
                    Node::Tabstop(Tabstop {
                        placeholder: Some(vec![
                            Node::text("b "),
                            Node::Tabstop(Tabstop {
                                placeholder: Some(vec![Node::text("c")]),
                                ..tabstop("3")
                            }),
                        ]),
                        ..tabstop("2")
                    }),
                ]),
                ..tabstop("1")
            }),
            Node::text(" d"),
        ];
        assert_eq!(nodes, expected);
    }

    #[test]
    fn test_parse_empty_placeholder_gets_empty_text() {
        assert_eq!(
            parse("${1:}").unwrap(),
            vec![Node::Tabstop(Tabstop {
                placeholder: Some(vec![Node::text("")]),
                ..tabstop("1")
            })]
        );
    }

    #[test]
    fn test_parse_variable_placeholder() {
        assert_eq!(
            parse("${AUTHOR:me}").unwrap(),
            vec![Node::Variable(Variable {
                placeholder: Some(vec![Node::text("me")]),
                ..variable("AUTHOR")
            })]
        );
    }

    #[test]
    fn test_parse_choices() {
        let nodes = parse(r"${1|aa,b\,b,c\|c,,d\\|}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Tabstop(Tabstop {
                choices: Some(vec![
                    "aa".to_string(),
                    "b,b".to_string(),
                    "c|c".to_string(),
                    String::new(),
                    r"d\".to_string(),
                ]),
                ..tabstop("1")
            })]
        );
    }

    #[test]
    fn test_parse_choices_dropped_for_final_tabstop() {
        assert_eq!(parse("${0|a,b|}").unwrap(), vec![Node::Tabstop(tabstop("0"))]);
    }

    #[test]
    fn test_parse_transform_is_opaque() {
        let nodes = parse("${var/.*/${1:?${}:aa}/i}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Variable(Variable {
                transform: Some(Transform {
                    pattern: ".*".to_string(),
                    format: "${1:?${}:aa}".to_string(),
                    options: "i".to_string(),
                }),
                ..variable("var")
            })]
        );
    }

    #[test]
    fn test_parse_transform_escaped_slash() {
        let nodes = parse(r"${1/a\/b/${1:/upcase}\//g}").unwrap();
        let transform = nodes[0].as_tabstop().unwrap().transform.clone().unwrap();
        assert_eq!(transform.pattern, r"a\/b");
        assert_eq!(transform.format, r"${1:/upcase}\/");
        assert_eq!(transform.options, "g");
    }

    #[test]
    fn test_parse_transform_empty_sections() {
        let nodes = parse("${1///}").unwrap();
        let transform = nodes[0].as_tabstop().unwrap().transform.clone().unwrap();
        assert_eq!(
            transform,
            Transform {
                pattern: String::new(),
                format: String::new(),
                options: String::new(),
            }
        );
    }

    #[test]
    fn test_parse_error_unterminated_placeholder() {
        assert_matches!(
            parse("${1:"),
            Err(ParseError::UnexpectedEof {
                construct: "placeholder",
                ..
            })
        );
        assert_matches!(
            parse("${1:a ${2:b}"),
            Err(ParseError::UnexpectedEof {
                construct: "placeholder",
                ..
            })
        );
    }

    #[test]
    fn test_parse_error_unterminated_choices() {
        assert_matches!(
            parse("${1|a"),
            Err(ParseError::UnexpectedEof {
                construct: "choice list",
                ..
            })
        );
        assert_matches!(
            parse("${1|a|"),
            Err(ParseError::UnexpectedEof {
                construct: "choice list",
                ..
            })
        );
    }

    #[test]
    fn test_parse_error_choices_closed_with_brace() {
        assert_matches!(
            parse("${1|a}"),
            Err(ParseError::InvalidChoiceClose {
                position: 5,
                found: '}'
            })
        );
        assert_matches!(
            parse("${1|a|b"),
            Err(ParseError::InvalidChoiceClose { found: 'b', .. })
        );
    }

    #[test]
    fn test_parse_error_bad_variable_suffix() {
        assert_matches!(
            parse("${a }"),
            Err(ParseError::InvalidAfterVariableName {
                position: 3,
                found: ' '
            })
        );
        assert_matches!(
            parse("${a|b|}"),
            Err(ParseError::InvalidAfterVariableName { found: '|', .. })
        );
    }

    #[test]
    fn test_parse_error_bad_tabstop_suffix() {
        assert_matches!(
            parse("${1a}"),
            Err(ParseError::InvalidAfterTabstopId {
                position: 3,
                found: 'a'
            })
        );
    }

    #[test]
    fn test_parse_error_bad_brace_start() {
        assert_matches!(
            parse("${-}"),
            Err(ParseError::InvalidBraceStart {
                position: 2,
                found: '-'
            })
        );
        assert_matches!(
            parse("${"),
            Err(ParseError::UnexpectedEof {
                construct: "`${`",
                ..
            })
        );
    }

    #[test]
    fn test_parse_error_unterminated_transform() {
        assert_matches!(
            parse("${1/a/b"),
            Err(ParseError::UnexpectedEof {
                construct: "transform",
                expected: "`/`"
            })
        );
        assert_matches!(
            parse("${1/a/b/g"),
            Err(ParseError::UnexpectedEof {
                construct: "transform",
                expected: "`}`"
            })
        );
    }

    #[test]
    fn test_parse_unterminated_bare_forms_are_fine() {
        assert_eq!(parse("$1").unwrap(), vec![Node::Tabstop(tabstop("1"))]);
        assert_eq!(parse("$ab").unwrap(), vec![Node::Variable(variable("ab"))]);
    }

    #[test]
    fn test_parse_escape_inside_placeholder() {
        let nodes = parse(r"${1:a\}b}").unwrap();
        assert_eq!(
            nodes,
            vec![Node::Tabstop(Tabstop {
                placeholder: Some(vec![Node::text("a}b")]),
                ..tabstop("1")
            })]
        );
    }
}
