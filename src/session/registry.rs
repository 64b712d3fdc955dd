//! Tabstop registry
//!
//! Distinct tabstop ids in jump order, with every occurrence of an id and a
//! wrapping doubly-linked next/prev map. The first occurrence of an id in
//! document order is its reference occurrence; later ones are linked and
//! only mirror its text.

use std::collections::HashMap;

use crate::parser::{Node, TabstopId};

/// One place an id occurs at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Occurrence<H> {
    pub handle: H,
    pub is_reference: bool,
}

/// All occurrences of one tabstop id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabstopEntry<H> {
    pub id: TabstopId,
    /// Document order; the first one is the reference
    pub occurrences: Vec<Occurrence<H>>,
    pub visited: bool,
}

impl<H> TabstopEntry<H> {
    pub fn reference(&self) -> &H {
        &self.occurrences[0].handle
    }

    pub fn linked(&self) -> impl Iterator<Item = &H> {
        self.occurrences.iter().skip(1).map(|o| &o.handle)
    }

    /// Whether the id occurs more than once
    pub fn is_linked(&self) -> bool {
        self.occurrences.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Link {
    prev: TabstopId,
    next: TabstopId,
}

/// Path of child indices from the root sequence into nested placeholders
pub type NodePath = Vec<usize>;

/// Jump order and occurrences of the tabstops of one expansion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry<H> {
    order: Vec<TabstopId>,
    entries: HashMap<TabstopId, TabstopEntry<H>>,
    links: HashMap<TabstopId, Link>,
}

impl<H> Default for Registry<H> {
    fn default() -> Self {
        Self {
            order: Vec::new(),
            entries: HashMap::new(),
            links: HashMap::new(),
        }
    }
}

/// Ascending id order with the final tabstop last
fn jump_order(a: &TabstopId, b: &TabstopId) -> std::cmp::Ordering {
    a.is_final().cmp(&b.is_final()).then_with(|| a.cmp(b))
}

impl<H> Registry<H> {
    /// Build from `(id, handle)` pairs given in document order
    pub fn from_occurrences(occurrences: impl IntoIterator<Item = (TabstopId, H)>) -> Self {
        let mut entries: HashMap<TabstopId, TabstopEntry<H>> = HashMap::new();
        for (id, handle) in occurrences {
            let entry = entries.entry(id.clone()).or_insert_with(|| TabstopEntry {
                id,
                occurrences: Vec::new(),
                visited: false,
            });
            let is_reference = entry.occurrences.is_empty();
            entry.occurrences.push(Occurrence {
                handle,
                is_reference,
            });
        }

        let mut order: Vec<TabstopId> = entries.keys().cloned().collect();
        order.sort_by(jump_order);

        let links = order
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let prev = order[(i + order.len() - 1) % order.len()].clone();
                let next = order[(i + 1) % order.len()].clone();
                (id.clone(), Link { prev, next })
            })
            .collect();

        Self {
            order,
            entries,
            links,
        }
    }

    /// Ids in jump order
    pub fn order(&self) -> &[TabstopId] {
        &self.order
    }

    pub fn first(&self) -> Option<&TabstopId> {
        self.order.first()
    }

    pub fn next(&self, id: &TabstopId) -> Option<&TabstopId> {
        self.links.get(id).map(|link| &link.next)
    }

    pub fn prev(&self, id: &TabstopId) -> Option<&TabstopId> {
        self.links.get(id).map(|link| &link.prev)
    }

    pub fn get(&self, id: &TabstopId) -> Option<&TabstopEntry<H>> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &TabstopId) -> Option<&mut TabstopEntry<H>> {
        self.entries.get_mut(id)
    }

    /// Entries in jump order
    pub fn iter(&self) -> impl Iterator<Item = &TabstopEntry<H>> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Whether there is anything besides the final tabstop
    pub fn has_user_tabstops(&self) -> bool {
        self.order.iter().any(|id| !id.is_final())
    }

    /// Copy `visited` flags of ids that still exist
    pub fn carry_visited<G>(&mut self, previous: &Registry<G>) {
        for entry in self.entries.values_mut() {
            entry.visited = previous.get(&entry.id).is_some_and(|e| e.visited);
        }
    }
}

impl Registry<NodePath> {
    /// Registry of a node tree, with occurrences addressed by [`NodePath`]
    pub fn from_nodes(nodes: &[Node]) -> Self {
        let mut occurrences = Vec::new();
        collect(nodes, &mut Vec::new(), &mut occurrences);
        Self::from_occurrences(occurrences)
    }
}

fn collect(nodes: &[Node], path: &mut NodePath, out: &mut Vec<(TabstopId, NodePath)>) {
    for (index, node) in nodes.iter().enumerate() {
        path.push(index);
        if let Node::Tabstop(tabstop) = node {
            out.push((tabstop.id.clone(), path.clone()));
        }
        if let Some(placeholder) = node.placeholder() {
            collect(placeholder, path, out);
        }
        path.pop();
    }
}
