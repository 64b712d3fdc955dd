//! Runtime state of one snippet expansion

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;
use tower_lsp::lsp_types::Range;
use tracing::debug;

use super::buffer::{Buffer, BufferId, Edit, MarkId};
use super::registry::Registry;
use super::tree::{RelEdit, SlotId, SlotTree, Span};
use crate::config::Indicators;
use crate::parser::{Node, TabstopId};

/// Identifier of a session, unique per engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// State of a tabstop's reference occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TabstopState {
    Unvisited,
    /// Editable, placeholder already consumed
    Current,
    /// Editable, placeholder wiped by the first keystroke
    CurrentReplace,
    Visited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightKind {
    Current,
    CurrentReplace,
    Mirror,
    Visited,
    Unvisited,
    Final,
}

/// One highlighted occurrence
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Highlight {
    pub range: Range,
    pub kind: HighlightKind,
    /// Virtual text shown on empty occurrences
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indicator: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabstopSnapshot {
    pub id: TabstopId,
    pub state: TabstopState,
    /// Text of the reference occurrence
    pub text: String,
    /// Ranges of all occurrences, reference first
    pub ranges: Vec<Range>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choices: Option<Vec<String>>,
}

/// Read-only view of a session handed out with events
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub buffer: BufferId,
    pub current_tabstop: TabstopId,
    pub suspended: bool,
    pub region: Option<Range>,
    /// Tabstops in jump order
    pub tabstops: Vec<TabstopSnapshot>,
}

/// Result of tracking one buffer edit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TrackOutcome {
    /// The edit changed the current tabstop
    pub hit_current: bool,
}

/// One snippet expansion bound to a buffer region
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    buffer: BufferId,
    start: MarkId,
    end: MarkId,
    tree: SlotTree,
    registry: Registry<SlotId>,
    current: TabstopId,
    replace_pending: bool,
    suspended: bool,
    /// Ids whose reference changed and whose linked occurrences may lag
    dirty: BTreeSet<TabstopId>,
    /// Bytes of the current reference to keep when wiping its placeholder
    wipe: Option<usize>,
}

impl Session {
    /// Bind a materialized tree to the text at `start` and focus the first
    /// tabstop. Linked occurrences are queued for mirroring right away.
    pub(crate) fn new(id: SessionId, buffer: &mut Buffer, start: usize, tree: SlotTree) -> Self {
        let end = start + tree.total_len();
        let registry = Registry::from_occurrences(tree.tabstops());
        let current = registry.first().cloned().unwrap_or_else(TabstopId::final_id);
        let dirty = registry
            .iter()
            .filter(|entry| entry.is_linked())
            .map(|entry| entry.id.clone())
            .collect();
        let mut session = Self {
            id,
            buffer: buffer.id(),
            start: buffer.set_mark(start, false),
            end: buffer.set_mark(end, true),
            tree,
            registry,
            current: current.clone(),
            replace_pending: false,
            suspended: false,
            dirty,
            wipe: None,
        };
        session.replace_pending = session.is_replaceable(&current);
        session
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn buffer(&self) -> BufferId {
        self.buffer
    }

    pub fn current_tabstop(&self) -> &TabstopId {
        &self.current
    }

    pub fn registry(&self) -> &Registry<SlotId> {
        &self.registry
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub(crate) fn set_suspended(&mut self, suspended: bool) {
        self.suspended = suspended;
    }

    pub fn state_of(&self, id: &TabstopId) -> Option<TabstopState> {
        let entry = self.registry.get(id)?;
        Some(if *id == self.current {
            if self.replace_pending {
                TabstopState::CurrentReplace
            } else {
                TabstopState::Current
            }
        } else if entry.visited {
            TabstopState::Visited
        } else {
            TabstopState::Unvisited
        })
    }

    fn reference(&self, id: &TabstopId) -> Option<SlotId> {
        self.registry.get(id).map(|entry| *entry.reference())
    }

    fn is_replaceable(&self, id: &TabstopId) -> bool {
        self.reference(id)
            .is_some_and(|slot| self.tree.is_group(slot) && self.tree.len_of(slot) > 0)
    }

    /// Absolute byte span of the session text
    pub(crate) fn region(&self, buffer: &Buffer) -> Option<Span> {
        let start = buffer.mark(self.start)?;
        let end = buffer.mark(self.end)?;
        (start <= end).then_some(Span { start, end })
    }

    fn absolute(&self, base: usize, slot: SlotId) -> Option<(usize, usize)> {
        self.tree
            .span(slot)
            .map(|span| (base + span.start, base + span.end))
    }

    /// Absolute span of the current tabstop's reference occurrence
    pub fn current_span(&self, buffer: &Buffer) -> Option<(usize, usize)> {
        let base = self.region(buffer)?.start;
        self.absolute(base, self.reference(&self.current)?)
    }

    /// Whether every tracked mark still resolves and agrees with the tree
    pub fn is_valid(&self, buffer: &Buffer) -> bool {
        self.region(buffer)
            .is_some_and(|region| region.len() == self.tree.total_len())
    }

    /// Account for `edit`, already applied to `buffer`. `old` is the region
    /// before the edit and `owner` the slot the edit was made for, if any.
    pub(crate) fn track(
        &mut self,
        buffer: &Buffer,
        edit: &Edit,
        old: Span,
        owner: Option<SlotId>,
    ) -> Option<TrackOutcome> {
        // Removals that only touch the region from outside leave it alone
        let removes = edit.start < edit.end;
        if edit.end < old.start
            || edit.start > old.end
            || (removes && (edit.end == old.start || edit.start == old.end))
        {
            return None;
        }
        let new = self.region(buffer)?;
        let removed_start = edit.start.max(old.start);
        let removed_end = edit.end.min(old.end);
        let kept = old.len() - (removed_end - removed_start);
        let inserted = new.len().checked_sub(kept)?;
        let rel = RelEdit {
            start: removed_start - old.start,
            end: removed_end - old.start,
            inserted,
        };

        let reference = self.reference(&self.current);
        let before = reference.and_then(|slot| self.tree.span(slot));
        let touched = self.tree.apply(rel, owner.or(reference));
        debug!(session = %self.id, ?rel, slots = touched.slots.len(), "tracked edit");

        let hit_current = reference.is_some_and(|reference| {
            touched
                .slots
                .iter()
                .any(|&slot| self.tree.ancestors(slot).any(|a| a == reference))
        });
        if hit_current && self.replace_pending {
            self.replace_pending = false;
            let owned = touched.slots == reference.into_iter().collect::<Vec<_>>();
            if owned && before.is_some_and(|span| span.start == rel.start) {
                self.wipe = Some(inserted);
            }
        }

        if touched.detached {
            self.rebuild(&touched.slots);
        }

        for &slot in &touched.slots {
            let ids: Vec<TabstopId> = self
                .tree
                .ancestors(slot)
                .filter_map(|a| {
                    let id = self.tree.tabstop_id(a)?;
                    let entry = self.registry.get(id)?;
                    (*entry.reference() == a && entry.is_linked()).then(|| id.clone())
                })
                .collect();
            self.dirty.extend(ids);
        }

        Some(TrackOutcome { hit_current })
    }

    fn rebuild(&mut self, touched: &[SlotId]) {
        self.tree.ensure_final();
        let mut registry = Registry::from_occurrences(self.tree.tabstops());
        registry.carry_visited(&self.registry);
        if registry.get(&self.current).is_none() {
            // swallowed by an enclosing tabstop
            let enclosing = touched
                .iter()
                .flat_map(|&slot| self.tree.ancestors(slot))
                .find_map(|slot| self.tree.tabstop_id(slot).cloned());
            self.current = enclosing
                .or_else(|| registry.first().cloned())
                .unwrap_or_else(TabstopId::final_id);
            self.replace_pending = false;
            self.wipe = None;
        }
        self.dirty.retain(|id| registry.get(id).is_some());
        self.registry = registry;
    }

    /// Next edit the session itself has to make: the placeholder wipe, then
    /// mirroring of linked occurrences. Suspended sessions hold back the
    /// mirroring.
    pub(crate) fn next_followup(&mut self, buffer: &Buffer) -> Option<(Edit, SlotId)> {
        let base = self.region(buffer)?.start;

        if let Some(keep) = self.wipe.take() {
            if let Some(reference) = self.reference(&self.current) {
                if let Some((start, end)) = self.absolute(base, reference) {
                    if start + keep < end {
                        return Some((Edit::delete(start + keep, end), reference));
                    }
                }
            }
        }

        if self.suspended {
            return None;
        }
        while let Some(id) = self.dirty.first().cloned() {
            if let Some(entry) = self.registry.get(&id) {
                let (start, end) = self.absolute(base, *entry.reference())?;
                let text = buffer.slice(start, end)?;
                for &linked in entry.linked() {
                    let (start, end) = self.absolute(base, linked)?;
                    if buffer.slice(start, end) != Some(text) {
                        return Some((
                            Edit {
                                start,
                                end,
                                text: text.to_string(),
                            },
                            linked,
                        ));
                    }
                }
            }
            self.dirty.remove(&id);
        }
        None
    }

    /// Whether follow-up edits are waiting
    pub fn has_pending(&self) -> bool {
        self.wipe.is_some() || !self.dirty.is_empty()
    }

    /// Target of a jump in `direction` from the current tabstop
    pub fn target(&self, direction: Direction) -> Option<TabstopId> {
        match direction {
            Direction::Next => self.registry.next(&self.current),
            Direction::Prev => self.registry.prev(&self.current),
        }
        .cloned()
    }

    /// Make `id` current and mark the previous tabstop visited
    pub(crate) fn focus(&mut self, id: TabstopId) {
        if let Some(entry) = self.registry.get_mut(&self.current) {
            entry.visited = true;
        }
        self.replace_pending = self.is_replaceable(&id);
        self.current = id;
        self.wipe = None;
    }

    /// Choices of the current tabstop and the text typed so far, if the
    /// placeholder was already consumed
    pub fn current_choices(&self, buffer: &Buffer) -> Option<(&[String], Option<String>)> {
        let choices = self.tree.choices(self.reference(&self.current)?)?;
        let typed = if self.replace_pending {
            None
        } else {
            let (start, end) = self.current_span(buffer)?;
            Some(buffer.slice(start, end)?.to_string())
        };
        Some((choices, typed))
    }

    /// Current content as a node tree
    pub fn nodes(&self, buffer: &Buffer) -> Option<Vec<Node>> {
        let region = self.region(buffer)?;
        Some(self.tree.to_nodes(buffer.slice(region.start, region.end)?))
    }

    pub fn highlights(&self, buffer: &Buffer, indicators: &Indicators) -> Vec<Highlight> {
        if self.suspended {
            return Vec::new();
        }
        let Some(region) = self.region(buffer) else {
            return Vec::new();
        };

        let mut highlights = Vec::new();
        for entry in self.registry.iter() {
            let current = entry.id == self.current;
            for occurrence in &entry.occurrences {
                let Some((start, end)) = self.absolute(region.start, occurrence.handle) else {
                    continue;
                };
                let kind = match (current, occurrence.is_reference) {
                    (true, true) if self.replace_pending => HighlightKind::CurrentReplace,
                    (true, true) => HighlightKind::Current,
                    (true, false) => HighlightKind::Mirror,
                    _ if entry.id.is_final() => HighlightKind::Final,
                    (false, false) => HighlightKind::Mirror,
                    _ if entry.visited => HighlightKind::Visited,
                    _ => HighlightKind::Unvisited,
                };
                let indicator = (start == end).then(|| {
                    if entry.id.is_final() {
                        indicators.empty_tabstop_final.clone()
                    } else {
                        indicators.empty_tabstop.clone()
                    }
                });
                highlights.push(Highlight {
                    range: buffer.range(start, end),
                    kind,
                    indicator,
                });
            }
        }
        highlights
    }

    pub fn snapshot(&self, buffer: &Buffer) -> SessionSnapshot {
        let region = self.region(buffer);
        let tabstops = self
            .registry
            .iter()
            .map(|entry| {
                let spans: Vec<(usize, usize)> = region
                    .map(|region| {
                        entry
                            .occurrences
                            .iter()
                            .filter_map(|o| self.absolute(region.start, o.handle))
                            .collect()
                    })
                    .unwrap_or_default();
                let text = spans
                    .first()
                    .and_then(|&(start, end)| buffer.slice(start, end))
                    .unwrap_or_default()
                    .to_string();
                TabstopSnapshot {
                    id: entry.id.clone(),
                    state: self.state_of(&entry.id).unwrap_or(TabstopState::Unvisited),
                    text,
                    ranges: spans
                        .iter()
                        .map(|&(start, end)| buffer.range(start, end))
                        .collect(),
                    choices: self.tree.choices(*entry.reference()).map(<[String]>::to_vec),
                }
            })
            .collect();

        SessionSnapshot {
            id: self.id,
            buffer: self.buffer,
            current_tabstop: self.current.clone(),
            suspended: self.suspended,
            region: region.map(|span| buffer.range(span.start, span.end)),
            tabstops,
        }
    }

    /// Drop the tracked marks
    pub(crate) fn release(&self, buffer: &mut Buffer) {
        buffer.remove_mark(self.start);
        buffer.remove_mark(self.end);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{normalize, parse, NormalizeOptions};
    use crate::session::buffer::BufferInfo;

    fn start(body: &str) -> (Buffer, Session) {
        let nodes = normalize(&parse(body).unwrap(), &NormalizeOptions::default());
        let (tree, text) = SlotTree::build(&nodes, "");
        let mut buffer = Buffer::new(BufferId::new(1), text, BufferInfo::default());
        let mut session = Session::new(SessionId::new(1), &mut buffer, 0, tree);
        sync(&mut buffer, &mut session);
        (buffer, session)
    }

    fn sync(buffer: &mut Buffer, session: &mut Session) {
        while let Some((edit, slot)) = session.next_followup(buffer) {
            apply(buffer, session, edit, Some(slot));
        }
    }

    fn apply(buffer: &mut Buffer, session: &mut Session, edit: Edit, owner: Option<SlotId>) {
        let old = session.region(buffer).unwrap();
        buffer.apply(&edit).unwrap();
        session.track(buffer, &edit, old, owner);
    }

    fn type_at(buffer: &mut Buffer, session: &mut Session, offset: usize, text: &str) {
        apply(buffer, session, Edit::insert(offset, text), None);
        sync(buffer, session);
    }

    fn id(raw: &str) -> TabstopId {
        TabstopId::from(raw)
    }

    #[test]
    fn test_linked_occurrences_mirror() {
        let (mut buffer, mut session) = start("$1_$1");
        type_at(&mut buffer, &mut session, 0, "x");
        assert_eq!(buffer.text(), "x_x");
        type_at(&mut buffer, &mut session, 1, "y");
        assert_eq!(buffer.text(), "xy_xy");
        assert!(session.is_valid(&buffer));
    }

    #[test]
    fn test_first_keystroke_replaces_placeholder() {
        let (mut buffer, mut session) = start("${1:aaa} $0");
        assert_eq!(session.state_of(&id("1")), Some(TabstopState::CurrentReplace));
        type_at(&mut buffer, &mut session, 0, "z");
        assert_eq!(buffer.text(), "z ");
        assert_eq!(session.state_of(&id("1")), Some(TabstopState::Current));
        type_at(&mut buffer, &mut session, 1, "w");
        assert_eq!(buffer.text(), "zw ");
    }

    #[test]
    fn test_edit_inside_placeholder_keeps_rest() {
        let (mut buffer, mut session) = start("${1:aaa}");
        type_at(&mut buffer, &mut session, 2, "Z");
        assert_eq!(buffer.text(), "aaZa");
        assert_eq!(session.state_of(&id("1")), Some(TabstopState::Current));
    }

    #[test]
    fn test_jump_targets_wrap() {
        let (_, mut session) = start("T1=$1 T2=$2 T0=$0");
        assert_eq!(session.current_tabstop(), &id("1"));
        let mut visited = Vec::new();
        for _ in 0..3 {
            let to = session.target(Direction::Next).unwrap();
            session.focus(to.clone());
            visited.push(to);
        }
        assert_eq!(visited, vec![id("2"), id("0"), id("1")]);
        assert_eq!(session.state_of(&id("2")), Some(TabstopState::Visited));
        assert_eq!(session.target(Direction::Prev), Some(id("0")));
    }

    #[test]
    fn test_typing_in_outer_placeholder_drops_inner_tabstop() {
        let (mut buffer, mut session) = start("${1:a ${2:b}} $2");
        assert_eq!(buffer.text(), "a b b");
        type_at(&mut buffer, &mut session, 0, "X");
        assert_eq!(buffer.text(), "X b");
        let order: Vec<_> = session.registry().order().to_vec();
        assert_eq!(order, vec![id("1"), id("2"), id("0")]);
        // the remaining `$2` has become its own reference
        let entry = session.registry().get(&id("2")).unwrap();
        assert!(!entry.is_linked());
    }

    #[test]
    fn test_final_tabstop_recreated_when_swallowed() {
        let (mut buffer, mut session) = start("${1:a $0}");
        type_at(&mut buffer, &mut session, 0, "Q");
        assert_eq!(buffer.text(), "Q");
        assert!(session.registry().get(&TabstopId::final_id()).is_some());
        assert!(session.is_valid(&buffer));
    }

    #[test]
    fn test_suspended_session_defers_mirroring() {
        let (mut buffer, mut session) = start("$1_$1");
        session.set_suspended(true);
        apply(&mut buffer, &mut session, Edit::insert(0, "x"), None);
        assert!(session.next_followup(&buffer).is_none());
        assert!(session.has_pending());

        session.set_suspended(false);
        sync(&mut buffer, &mut session);
        assert_eq!(buffer.text(), "x_x");
        assert!(!session.has_pending());
    }

    #[test]
    fn test_suspended_session_still_replaces_placeholder() {
        let (mut buffer, mut session) = start("${1:ab}_$1");
        assert_eq!(buffer.text(), "ab_ab");
        session.set_suspended(true);
        type_at(&mut buffer, &mut session, 0, "x");
        assert_eq!(buffer.text(), "x_ab");
        assert!(session.has_pending());

        session.set_suspended(false);
        sync(&mut buffer, &mut session);
        assert_eq!(buffer.text(), "x_x");
    }

    #[test]
    fn test_removal_before_region_leaves_session_alone() {
        let mut buffer = Buffer::new(BufferId::new(1), "ab", BufferInfo::default());
        let nodes = normalize(&parse("${1:xyz}-$1").unwrap(), &NormalizeOptions::default());
        let (tree, text) = SlotTree::build(&nodes, "");
        buffer.apply(&Edit::insert(2, text)).unwrap();
        let mut session = Session::new(SessionId::new(1), &mut buffer, 2, tree);
        sync(&mut buffer, &mut session);
        assert_eq!(buffer.text(), "abxyz-xyz");

        let edit = Edit {
            start: 0,
            end: 2,
            text: "Q".to_string(),
        };
        let old = session.region(&buffer).unwrap();
        buffer.apply(&edit).unwrap();
        assert!(session.track(&buffer, &edit, old, None).is_none());
        assert!(!session.has_pending());
        assert_eq!(session.state_of(&id("1")), Some(TabstopState::CurrentReplace));
        assert_eq!(session.region(&buffer), Some(Span { start: 1, end: 8 }));
        assert!(session.is_valid(&buffer));
    }

    #[test]
    fn test_highlights_and_indicators() {
        let (buffer, session) = start("${1:ab} $1 $2");
        assert_eq!(buffer.text(), "ab ab ");
        let indicators = Indicators::default();
        let highlights = session.highlights(&buffer, &indicators);
        let kinds: Vec<_> = highlights.iter().map(|h| h.kind).collect();
        assert_eq!(
            kinds,
            vec![
                HighlightKind::CurrentReplace,
                HighlightKind::Mirror,
                HighlightKind::Unvisited,
                HighlightKind::Final
            ]
        );
        assert_eq!(highlights[0].indicator, None);
        assert_eq!(highlights[2].indicator.as_deref(), Some("•"));
        assert_eq!(highlights[3].indicator.as_deref(), Some("∎"));
    }

    #[test]
    fn test_replace_all_breaks_validity() {
        let (mut buffer, session) = start("${1:a}");
        assert!(session.is_valid(&buffer));
        buffer.replace_all("something else");
        assert!(!session.is_valid(&buffer));
    }

    #[test]
    fn test_snapshot_and_nodes() {
        let (mut buffer, mut session) = start("${1|yes,no|} $1");
        type_at(&mut buffer, &mut session, 0, "n");
        assert_eq!(buffer.text(), "n n");
        let snapshot = session.snapshot(&buffer);
        assert_eq!(snapshot.current_tabstop, id("1"));
        assert_eq!(snapshot.tabstops[0].text, "n");
        assert_eq!(snapshot.tabstops[0].ranges.len(), 2);
        assert_eq!(
            snapshot.tabstops[0].choices,
            Some(vec!["yes".to_string(), "no".to_string()])
        );
        let (choices, typed) = session.current_choices(&buffer).unwrap();
        assert_eq!(choices.len(), 2);
        assert_eq!(typed.as_deref(), Some("n"));

        let nodes = session.nodes(&buffer).unwrap();
        assert_eq!(crate::parser::render(&nodes), "n n");
    }
}
