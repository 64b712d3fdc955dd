//! Materialized snippet slots
//!
//! Each node of an inserted snippet becomes a slot. Leaves carry a byte
//! length, groups (tabstops and variables still showing a placeholder) own
//! child slots. Offsets are never stored: they are recomputed from the
//! lengths, relative to the start of the session region, so the tree can
//! always be laid out consistently after arbitrary edits.

use crate::parser::{Node, Tabstop, TabstopId, Transform, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(usize);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    Text,
    Tabstop {
        id: TabstopId,
        choices: Option<Vec<String>>,
        transform: Option<Transform>,
    },
    Variable {
        name: String,
        transform: Option<Transform>,
    },
}

#[derive(Debug, Clone)]
pub struct Slot {
    pub kind: SlotKind,
    /// Byte length, meaningful for leaves only
    len: usize,
    children: Option<Vec<SlotId>>,
    parent: Option<SlotId>,
    detached: bool,
}

/// Relative half-open byte range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Edit expressed relative to the region: `start..end` is removed, then
/// `inserted` bytes are added at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelEdit {
    pub start: usize,
    pub end: usize,
    pub inserted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Touched {
    /// Slots whose content changed
    pub slots: Vec<SlotId>,
    /// Whether some slots were removed from the tree
    pub detached: bool,
}

#[derive(Debug, Clone, Default)]
pub struct SlotTree {
    slots: Vec<Slot>,
    roots: Vec<SlotId>,
}

fn reindent(text: &str, indent: &str) -> String {
    if indent.is_empty() {
        text.to_string()
    } else {
        text.replace('\n', &format!("\n{indent}"))
    }
}

impl SlotTree {
    /// Materialize a normalized snippet; returns the tree and the text to
    /// insert. Every newline is followed by `indent`.
    pub fn build(nodes: &[Node], indent: &str) -> (Self, String) {
        let mut tree = Self::default();
        let mut out = String::new();
        for node in nodes {
            let id = tree.add(node, None, indent, &mut out);
            tree.roots.push(id);
        }
        (tree, out)
    }

    fn add(
        &mut self,
        node: &Node,
        parent: Option<SlotId>,
        indent: &str,
        out: &mut String,
    ) -> SlotId {
        let (kind, text, placeholder) = match node {
            Node::Text { text } => (SlotKind::Text, Some(text), None),
            Node::Tabstop(Tabstop {
                id,
                text,
                placeholder,
                choices,
                transform,
            }) => (
                SlotKind::Tabstop {
                    id: id.clone(),
                    choices: choices.clone(),
                    transform: transform.clone(),
                },
                text.as_ref(),
                placeholder.as_ref(),
            ),
            Node::Variable(Variable {
                name,
                text,
                placeholder,
                transform,
            }) => (
                SlotKind::Variable {
                    name: name.clone(),
                    transform: transform.clone(),
                },
                text.as_ref(),
                placeholder.as_ref(),
            ),
        };

        let id = self.push(Slot {
            kind,
            len: 0,
            children: None,
            parent,
            detached: false,
        });

        match (text, placeholder) {
            (Some(text), _) => {
                let text = reindent(text, indent);
                out.push_str(&text);
                self.slots[id.0].len = text.len();
            }
            (None, Some(nodes)) => {
                let children = nodes
                    .iter()
                    .map(|child| self.add(child, Some(id), indent, out))
                    .collect();
                self.slots[id.0].children = Some(children);
            }
            (None, None) => {}
        }
        id
    }

    fn push(&mut self, slot: Slot) -> SlotId {
        self.slots.push(slot);
        SlotId(self.slots.len() - 1)
    }

    pub fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id.0]
    }

    pub fn is_group(&self, id: SlotId) -> bool {
        self.slots[id.0].children.is_some()
    }

    pub fn parent(&self, id: SlotId) -> Option<SlotId> {
        self.slots[id.0].parent
    }

    pub fn len_of(&self, id: SlotId) -> usize {
        let slot = &self.slots[id.0];
        match &slot.children {
            Some(children) => children.iter().map(|&c| self.len_of(c)).sum(),
            None => slot.len,
        }
    }

    pub fn total_len(&self) -> usize {
        self.roots.iter().map(|&r| self.len_of(r)).sum()
    }

    /// Attached slots in document (pre-)order
    pub fn doc_order(&self) -> Vec<SlotId> {
        let mut order = Vec::with_capacity(self.slots.len());
        let mut stack: Vec<SlotId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            if let Some(children) = &self.slots[id.0].children {
                stack.extend(children.iter().rev().copied());
            }
        }
        order
    }

    /// Span of every attached slot, indexed by slot
    pub fn layout(&self) -> Vec<Option<Span>> {
        let mut spans = vec![None; self.slots.len()];
        let mut offset = 0;
        for &root in &self.roots {
            offset = self.layout_into(root, offset, &mut spans);
        }
        spans
    }

    fn layout_into(&self, id: SlotId, start: usize, spans: &mut [Option<Span>]) -> usize {
        let end = match &self.slots[id.0].children {
            Some(children) => children
                .iter()
                .fold(start, |offset, &child| self.layout_into(child, offset, spans)),
            None => start + self.slots[id.0].len,
        };
        spans[id.0] = Some(Span { start, end });
        end
    }

    pub fn span(&self, id: SlotId) -> Option<Span> {
        self.layout()[id.0]
    }

    pub fn tabstop_id(&self, id: SlotId) -> Option<&TabstopId> {
        match &self.slots[id.0].kind {
            SlotKind::Tabstop { id, .. } => Some(id),
            _ => None,
        }
    }

    pub fn choices(&self, id: SlotId) -> Option<&[String]> {
        match &self.slots[id.0].kind {
            SlotKind::Tabstop { choices, .. } => choices.as_deref(),
            _ => None,
        }
    }

    /// Tabstop occurrences in document order
    pub fn tabstops(&self) -> Vec<(TabstopId, SlotId)> {
        self.doc_order()
            .into_iter()
            .filter_map(|slot| Some((self.tabstop_id(slot)?.clone(), slot)))
            .collect()
    }

    /// The slot itself and its ancestors, innermost first
    pub fn ancestors(&self, id: SlotId) -> impl Iterator<Item = SlotId> + '_ {
        std::iter::successors(Some(id), move |&s| self.slots[s.0].parent)
    }

    /// Turn a group into a leaf keeping its current length
    pub fn flatten(&mut self, id: SlotId) -> bool {
        if !self.is_group(id) {
            return false;
        }
        let len = self.len_of(id);
        let mut stack = self.slots[id.0].children.take().unwrap_or_default();
        while let Some(child) = stack.pop() {
            let slot = &mut self.slots[child.0];
            slot.detached = true;
            if let Some(children) = slot.children.take() {
                stack.extend(children);
            }
        }
        self.slots[id.0].len = len;
        true
    }

    pub fn is_detached(&self, id: SlotId) -> bool {
        self.slots[id.0].detached
    }

    /// Apply an edit to slot lengths.
    ///
    /// An edit fully inside `owner` (boundaries included) goes to it. Else an
    /// edit strictly inside some tabstop goes to the innermost such tabstop.
    /// Otherwise the removed range is taken from every overlapped leaf and
    /// the inserted text goes to the leaf around the insertion point: one
    /// strictly containing it, else a non-empty leaf ending there, else an
    /// empty one there, else one starting there.
    pub fn apply(&mut self, edit: RelEdit, owner: Option<SlotId>) -> Touched {
        let layout = self.layout();
        let order = self.doc_order();
        let contains = |id: SlotId, strict: bool| {
            layout[id.0].is_some_and(|span| {
                if strict {
                    span.start < edit.start && edit.end < span.end
                } else {
                    span.start <= edit.start && edit.end <= span.end
                }
            })
        };

        let owner = owner.filter(|&id| contains(id, false)).or_else(|| {
            order
                .iter()
                .copied()
                .filter(|&id| self.tabstop_id(id).is_some() && contains(id, true))
                .last()
        });

        if let Some(owner) = owner {
            let len = self.len_of(owner);
            let detached = self.flatten(owner);
            self.slots[owner.0].len = len - (edit.end - edit.start) + edit.inserted;
            return Touched {
                slots: vec![owner],
                detached,
            };
        }

        let leaves: Vec<SlotId> = order.into_iter().filter(|&id| !self.is_group(id)).collect();
        let mut touched = Touched::default();
        for &leaf in &leaves {
            let Some(span) = layout[leaf.0] else {
                continue;
            };
            let overlap = span
                .end
                .min(edit.end)
                .saturating_sub(span.start.max(edit.start));
            if overlap > 0 {
                self.slots[leaf.0].len -= overlap;
                touched.slots.push(leaf);
            }
        }

        if edit.inserted == 0 {
            return touched;
        }

        let layout = self.layout();
        let span_of = |id: &SlotId| layout[id.0].unwrap_or(Span { start: 0, end: 0 });
        let target = leaves
            .iter()
            .find(|id| {
                let span = span_of(id);
                span.start < edit.start && edit.start < span.end
            })
            .or_else(|| {
                leaves.iter().rev().find(|id| {
                    let span = span_of(id);
                    span.end == edit.start && !span.is_empty()
                })
            })
            .or_else(|| leaves.iter().rev().find(|id| span_of(id).end == edit.start))
            .or_else(|| leaves.iter().find(|id| span_of(id).start == edit.start))
            .or_else(|| leaves.last())
            .copied();

        if let Some(target) = target {
            self.slots[target.0].len += edit.inserted;
            if !touched.slots.contains(&target) {
                touched.slots.push(target);
            }
        }
        touched
    }

    /// Append an empty final tabstop if none is attached
    pub fn ensure_final(&mut self) -> bool {
        let has_final = self
            .doc_order()
            .into_iter()
            .any(|id| self.tabstop_id(id).is_some_and(TabstopId::is_final));
        if has_final {
            return false;
        }
        let id = self.push(Slot {
            kind: SlotKind::Tabstop {
                id: TabstopId::final_id(),
                choices: None,
                transform: None,
            },
            len: 0,
            children: None,
            parent: None,
            detached: false,
        });
        self.roots.push(id);
        true
    }

    /// Rebuild nodes from the region text; leaves of tabstops and variables
    /// come back as resolved `text`.
    pub fn to_nodes(&self, region_text: &str) -> Vec<Node> {
        let layout = self.layout();
        self.roots
            .iter()
            .map(|&root| self.to_node(root, region_text, &layout))
            .collect()
    }

    fn to_node(&self, id: SlotId, region_text: &str, layout: &[Option<Span>]) -> Node {
        let slot = &self.slots[id.0];
        let content = || {
            layout[id.0]
                .and_then(|span| region_text.get(span.start..span.end))
                .unwrap_or_default()
                .to_string()
        };
        let (text, placeholder) = match &slot.children {
            Some(children) => (
                None,
                Some(
                    children
                        .iter()
                        .map(|&child| self.to_node(child, region_text, layout))
                        .collect(),
                ),
            ),
            None => (Some(content()), None),
        };

        match &slot.kind {
            SlotKind::Text => Node::text(content()),
            SlotKind::Tabstop {
                id,
                choices,
                transform,
            } => Node::Tabstop(Tabstop {
                id: id.clone(),
                text,
                placeholder,
                choices: choices.clone(),
                transform: transform.clone(),
            }),
            SlotKind::Variable { name, transform } => Node::Variable(Variable {
                name: name.clone(),
                text,
                placeholder,
                transform: transform.clone(),
            }),
        }
    }
}
