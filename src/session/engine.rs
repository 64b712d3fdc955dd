//! Snippet sessions across buffers
//!
//! The engine owns the buffers, one [`SessionStack`] per buffer and the
//! lifecycle event log. Exactly one session is active: the top of the stack
//! of the buffer a session was most recently started in. Every other
//! session is suspended; its text keeps being tracked but mirroring waits
//! until it is resumed.

use std::collections::HashMap;

use tower_lsp::lsp_types::{CompletionItem, Position, Range};
use tracing::{debug, info, warn};

use super::buffer::{Buffer, BufferId, BufferInfo, Edit, Mode};
use super::choices;
use super::events::{Event, EventLog};
use super::registry::Registry;
use super::stack::SessionStack;
use super::state::{Direction, Highlight, Session, SessionId, SessionSnapshot, TrackOutcome};
use super::tasks::{TaskKind, TaskQueue};
use super::tree::{SlotId, SlotTree};
use crate::config::{validate_lookup, EngineConfig, StartOptions};
use crate::error::EngineError;
use crate::parser::{normalize, parse, Body, Context, NormalizeOptions};

/// Upper bound of session edits caused by one host edit
const MAX_FOLLOWUPS: usize = 1_000;

/// Who an edit is made for
#[derive(Debug, Clone, Copy)]
enum Origin {
    Host,
    Session { session: SessionId, slot: SlotId },
}

#[derive(Debug, Default)]
pub struct Engine {
    config: EngineConfig,
    buffers: HashMap<BufferId, Buffer>,
    stacks: HashMap<BufferId, SessionStack>,
    /// Buffers with sessions, most recently started last
    recency: Vec<BufferId>,
    events: EventLog,
    tasks: TaskQueue,
    next_buffer: u64,
    next_session: u64,
}

fn context_for(buffer: &Buffer) -> Context {
    let (line_index, line, column) = buffer.line_at(buffer.cursor());
    Context {
        language_id: buffer.info().language_id.clone(),
        file_path: buffer.info().path.clone(),
        current_line: line.to_string(),
        cursor_column: column,
        line_index,
        ..Context::default()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn open_buffer(&mut self, text: impl Into<String>, info: BufferInfo) -> BufferId {
        self.next_buffer += 1;
        let id = BufferId::new(self.next_buffer);
        self.buffers.insert(id, Buffer::new(id, text, info));
        id
    }

    pub fn buffer(&self, id: BufferId) -> Option<&Buffer> {
        self.buffers.get(&id)
    }

    fn buffer_mut(&mut self, id: BufferId) -> Result<&mut Buffer, EngineError> {
        self.buffers
            .get_mut(&id)
            .ok_or(EngineError::UnknownBuffer(id))
    }

    /// Expand `body` at the cursor of `buffer_id`.
    ///
    /// Returns `None` when the snippet has no tabstop besides the final one:
    /// its text is inserted and no session is created.
    pub fn start(
        &mut self,
        buffer_id: BufferId,
        body: impl Into<Body>,
        options: &StartOptions,
    ) -> Result<Option<SessionId>, EngineError> {
        validate_lookup(&options.lookup)?;
        let parsed = parse(body)?;
        let buffer = self
            .buffers
            .get(&buffer_id)
            .ok_or(EngineError::UnknownBuffer(buffer_id))?;
        let context = match &options.context {
            Some(context) => context.clone(),
            None => context_for(buffer),
        };
        let mut lookup = self.config.lookup.clone();
        lookup.extend(options.lookup.clone());
        let nodes = normalize(
            &parsed,
            &NormalizeOptions {
                lookup: Some(&lookup),
                context: Some(&context),
            },
        );

        self.check_integrity(buffer_id);
        while let Some(id) = self
            .active_in(buffer_id)
            .filter(|s| s.current_tabstop().is_final())
            .map(Session::id)
        {
            self.stop_session(buffer_id, id);
            self.resume_active();
        }

        // Without user tabstops the text is inserted as if typed
        let interactive = Registry::from_nodes(&nodes).has_user_tabstops();
        let id = interactive.then(|| {
            self.next_session += 1;
            SessionId::new(self.next_session)
        });
        if let (Some(_), Some((active_buffer, active))) = (id, self.active()) {
            self.suspend(active_buffer, active);
        }

        let buffer = self.buffer_mut(buffer_id)?;
        let at = buffer.cursor();
        let (tree, text) = SlotTree::build(&nodes, buffer.indent_at(at));
        let anchor = buffer.set_mark(at, false);
        self.host_edit(buffer_id, Edit::insert(at, text))?;

        let buffer = self.buffer_mut(buffer_id)?;
        let start = buffer.mark(anchor).unwrap_or(at);
        buffer.remove_mark(anchor);

        let Some(id) = id else {
            let offset = tree
                .tabstops()
                .first()
                .and_then(|(_, slot)| tree.span(*slot))
                .map_or(tree.total_len(), |span| span.start);
            buffer.set_cursor(start + offset);
            debug!(buffer = %buffer_id, "inserted snippet without tabstops");
            return Ok(None);
        };

        let session = Session::new(id, buffer, start, tree);
        self.stacks.entry(buffer_id).or_default().push(session);
        self.recency.retain(|b| *b != buffer_id);
        self.recency.push(buffer_id);
        info!(session = %id, buffer = %buffer_id, "session started");

        self.sync(buffer_id);
        self.emit(id, Event::SessionStart);
        self.focus_cursor(buffer_id, id);
        self.tasks.push(id, TaskKind::ShowChoices);
        self.flush();
        Ok(Some(id))
    }

    /// Move to the next or previous tabstop of the active session
    pub fn jump(&mut self, direction: Direction) {
        let Some((buffer_id, id)) = self.active() else {
            return;
        };
        if !self.check_integrity(buffer_id) {
            self.flush();
            return;
        }
        let Some(session) = self.session(id) else {
            return;
        };
        let Some(to) = session.target(direction) else {
            return;
        };
        let from = session.current_tabstop().clone();

        if let Some(snapshot) = self.snapshot(id) {
            self.events.push(Event::SessionJumpPre {
                session: snapshot,
                tabstop_from: from.clone(),
                tabstop_to: to.clone(),
            });
        }
        if let Some(session) = self.session_mut(buffer_id, id) {
            session.focus(to.clone());
        }
        self.focus_cursor(buffer_id, id);
        debug!(session = %id, %from, %to, "jumped");
        if let Some(snapshot) = self.snapshot(id) {
            self.events.push(Event::SessionJump {
                session: snapshot,
                tabstop_from: from,
                tabstop_to: to,
            });
        }
        self.tasks.push(id, TaskKind::ShowChoices);
        self.flush();
    }

    /// Stop the active session and resume the one beneath it
    pub fn stop(&mut self) {
        let Some((buffer_id, id)) = self.active() else {
            return;
        };
        self.stop_session(buffer_id, id);
        self.resume_active();
        self.flush();
    }

    /// The active session
    pub fn current(&self) -> Option<&Session> {
        let (buffer_id, _) = self.active()?;
        self.stacks.get(&buffer_id)?.top()
    }

    /// Every session, buffer by buffer, outermost first
    pub fn all(&self) -> Vec<&Session> {
        self.recency
            .iter()
            .filter_map(|b| self.stacks.get(b))
            .flat_map(SessionStack::iter)
            .collect()
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.stacks.values().find_map(|stack| stack.get(id))
    }

    fn session_mut(&mut self, buffer_id: BufferId, id: SessionId) -> Option<&mut Session> {
        self.stacks.get_mut(&buffer_id)?.get_mut(id)
    }

    pub fn snapshot(&self, id: SessionId) -> Option<SessionSnapshot> {
        let buffer_id = self.locate(id)?;
        let session = self.stacks.get(&buffer_id)?.get(id)?;
        Some(session.snapshot(self.buffers.get(&buffer_id)?))
    }

    /// Replace `range` with `text` as the user would
    pub fn edit(
        &mut self,
        buffer_id: BufferId,
        range: Range,
        text: &str,
    ) -> Result<(), EngineError> {
        let buffer = self
            .buffers
            .get(&buffer_id)
            .ok_or(EngineError::UnknownBuffer(buffer_id))?;
        let (start, end) = buffer.range_to_offsets(range)?;
        self.host_edit(
            buffer_id,
            Edit {
                start,
                end,
                text: text.to_string(),
            },
        )
    }

    /// Insert `text` at the cursor
    pub fn type_text(&mut self, buffer_id: BufferId, text: &str) -> Result<(), EngineError> {
        let at = self.buffer_mut(buffer_id)?.cursor();
        self.host_edit(buffer_id, Edit::insert(at, text))
    }

    pub fn set_cursor(
        &mut self,
        buffer_id: BufferId,
        position: Position,
    ) -> Result<(), EngineError> {
        let buffer = self.buffer_mut(buffer_id)?;
        let offset = buffer
            .position_to_offset(position)
            .ok_or(EngineError::InvalidPosition {
                line: position.line,
                character: position.character,
            })?;
        buffer.set_cursor(offset);
        Ok(())
    }

    /// Leaving insert mode on the final tabstop ends the session
    pub fn set_mode(&mut self, buffer_id: BufferId, mode: Mode) -> Result<(), EngineError> {
        self.buffer_mut(buffer_id)?.set_mode(mode);
        if mode == Mode::Normal {
            let finished = self
                .active_in(buffer_id)
                .filter(|s| s.current_tabstop().is_final())
                .map(Session::id);
            if let Some(id) = finished {
                self.stop_session(buffer_id, id);
                self.resume_active();
                self.flush();
            }
        }
        Ok(())
    }

    /// Replace the whole text out of band; marks no longer resolve
    pub fn replace_all(&mut self, buffer_id: BufferId, text: &str) -> Result<(), EngineError> {
        self.buffer_mut(buffer_id)?.replace_all(text);
        self.check_integrity(buffer_id);
        self.flush();
        Ok(())
    }

    /// Stop every session of the buffer, innermost first, and forget it
    pub fn unload_buffer(&mut self, buffer_id: BufferId) -> Result<(), EngineError> {
        if !self.buffers.contains_key(&buffer_id) {
            return Err(EngineError::UnknownBuffer(buffer_id));
        }
        while let Some(id) = self.top_id(buffer_id) {
            self.stop_session(buffer_id, id);
            if let Some(next) = self.top_id(buffer_id) {
                self.resume_session(buffer_id, next);
            }
        }
        self.buffers.remove(&buffer_id);
        self.resume_active();
        self.flush();
        info!(buffer = %buffer_id, "buffer unloaded");
        Ok(())
    }

    /// Candidates of the active session's current choice tabstop
    pub fn choices(&self) -> Vec<CompletionItem> {
        let Some((buffer_id, id)) = self.active() else {
            return Vec::new();
        };
        let (Some(buffer), Some(session)) = (self.buffers.get(&buffer_id), self.session(id)) else {
            return Vec::new();
        };
        session
            .current_choices(buffer)
            .map(|(choices, typed)| choices::candidates(choices, typed.as_deref()))
            .unwrap_or_default()
    }

    /// Apply a choice of the current tabstop as typed input
    pub fn select_choice(&mut self, label: &str) -> Result<(), EngineError> {
        let Some((buffer_id, id)) = self.active() else {
            return Ok(());
        };
        let (Some(buffer), Some(session)) = (self.buffers.get(&buffer_id), self.session(id)) else {
            return Ok(());
        };
        let known = session
            .current_choices(buffer)
            .is_some_and(|(choices, _)| choices.iter().any(|c| c == label));
        let Some((start, end)) = session.current_span(buffer).filter(|_| known) else {
            return Ok(());
        };
        self.host_edit(
            buffer_id,
            Edit {
                start,
                end,
                text: label.to_string(),
            },
        )
    }

    /// Highlights of the session shown in `buffer_id`
    pub fn highlights(&self, buffer_id: BufferId) -> Vec<Highlight> {
        let (Some(buffer), Some(session)) = (
            self.buffers.get(&buffer_id),
            self.stacks.get(&buffer_id).and_then(SessionStack::top),
        ) else {
            return Vec::new();
        };
        session.highlights(buffer, &self.config.indicators)
    }

    pub fn events(&self) -> &[Event] {
        self.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        self.events.drain()
    }

    /// Stop every session and drop queued work; buffers are kept
    pub fn reset(&mut self) {
        while let Some((buffer_id, id)) = self.active() {
            self.stop_session(buffer_id, id);
        }
        self.stacks.clear();
        self.recency.clear();
        self.tasks.clear();
        info!("engine reset");
    }

    fn active(&self) -> Option<(BufferId, SessionId)> {
        let buffer_id = *self.recency.last()?;
        let session = self.stacks.get(&buffer_id)?.top()?;
        Some((buffer_id, session.id()))
    }

    /// Top session of the buffer unless it is suspended
    fn active_in(&self, buffer_id: BufferId) -> Option<&Session> {
        self.stacks
            .get(&buffer_id)?
            .top()
            .filter(|s| !s.is_suspended())
    }

    fn top_id(&self, buffer_id: BufferId) -> Option<SessionId> {
        self.stacks.get(&buffer_id)?.top().map(Session::id)
    }

    fn locate(&self, id: SessionId) -> Option<BufferId> {
        self.stacks
            .iter()
            .find(|(_, stack)| stack.get(id).is_some())
            .map(|(buffer_id, _)| *buffer_id)
    }

    fn emit(&mut self, id: SessionId, event: fn(SessionSnapshot) -> Event) {
        if let Some(snapshot) = self.snapshot(id) {
            self.events.push(event(snapshot));
        }
    }

    fn focus_cursor(&mut self, buffer_id: BufferId, id: SessionId) {
        let (Some(buffer), Some(stack)) = (
            self.buffers.get_mut(&buffer_id),
            self.stacks.get(&buffer_id),
        ) else {
            return;
        };
        if let Some((start, _)) = stack.get(id).and_then(|s| s.current_span(buffer)) {
            buffer.set_cursor(start);
        }
        buffer.set_mode(Mode::Insert);
    }

    fn suspend(&mut self, buffer_id: BufferId, id: SessionId) {
        let Some(session) = self.session_mut(buffer_id, id) else {
            return;
        };
        if session.is_suspended() {
            return;
        }
        session.set_suspended(true);
        self.emit(id, Event::SessionSuspend);
        info!(session = %id, "session suspended");
    }

    fn resume_session(&mut self, buffer_id: BufferId, id: SessionId) {
        let Some(session) = self.session_mut(buffer_id, id) else {
            return;
        };
        if !session.is_suspended() {
            return;
        }
        session.set_suspended(false);
        self.emit(id, Event::SessionResume);
        self.tasks.push(id, TaskKind::SyncLinked);
        info!(session = %id, "session resumed");
    }

    fn resume_active(&mut self) {
        if let Some((buffer_id, id)) = self.active() {
            self.resume_session(buffer_id, id);
        }
    }

    fn stop_session(&mut self, buffer_id: BufferId, id: SessionId) {
        self.emit(id, Event::SessionStop);
        let (Some(buffer), Some(stack)) = (
            self.buffers.get_mut(&buffer_id),
            self.stacks.get_mut(&buffer_id),
        ) else {
            return;
        };
        if let Some(session) = stack.remove(id) {
            session.release(buffer);
        }
        if stack.is_empty() {
            self.stacks.remove(&buffer_id);
            self.recency.retain(|b| *b != buffer_id);
        }
        self.tasks.cancel(id);
        info!(session = %id, buffer = %buffer_id, "session stopped");
    }

    /// Abort every session from the first one whose marks no longer agree
    /// with its text upwards. Returns whether all sessions were intact.
    fn check_integrity(&mut self, buffer_id: BufferId) -> bool {
        let (Some(buffer), Some(stack)) = (
            self.buffers.get(&buffer_id),
            self.stacks.get(&buffer_id),
        ) else {
            return true;
        };
        let broken: Vec<SessionId> = stack
            .iter()
            .skip_while(|s| s.is_valid(buffer))
            .map(Session::id)
            .collect();
        let Some(&first) = broken.first() else {
            return true;
        };

        warn!(buffer = %buffer_id, session = %first, aborted = broken.len(), "session corrupted");
        self.events.warn(format!(
            "snippet {first} in buffer {buffer_id} lost track of its text and was stopped"
        ));
        for id in broken.into_iter().rev() {
            self.stop_session(buffer_id, id);
        }
        self.resume_active();
        false
    }

    /// Apply an edit to the buffer and let every session of it track it
    fn apply_edit(
        &mut self,
        buffer_id: BufferId,
        edit: &Edit,
        origin: Origin,
    ) -> Result<Vec<(SessionId, TrackOutcome)>, EngineError> {
        let buffer = self
            .buffers
            .get_mut(&buffer_id)
            .ok_or(EngineError::UnknownBuffer(buffer_id))?;
        let mut stack = self.stacks.get_mut(&buffer_id);
        let regions: Vec<_> = stack
            .iter()
            .flat_map(|stack| stack.iter())
            .map(|session| session.region(buffer))
            .collect();

        buffer.apply(edit)?;

        let mut outcomes = Vec::new();
        let sessions = stack.iter_mut().flat_map(|stack| stack.iter_mut());
        for (session, old) in sessions.zip(regions) {
            let Some(old) = old else {
                continue;
            };
            let owner = match origin {
                Origin::Session { session: id, slot } if id == session.id() => Some(slot),
                _ => None,
            };
            if let Some(outcome) = session.track(buffer, edit, old, owner) {
                outcomes.push((session.id(), outcome));
            }
        }
        Ok(outcomes)
    }

    /// An edit made by the user
    fn host_edit(&mut self, buffer_id: BufferId, edit: Edit) -> Result<(), EngineError> {
        self.check_integrity(buffer_id);
        let cursor = edit.start + edit.text.len();
        let outcomes = self.apply_edit(buffer_id, &edit, Origin::Host)?;
        self.buffer_mut(buffer_id)?.set_cursor(cursor);

        let active = self
            .active_in(buffer_id)
            .map(|s| (s.id(), s.current_tabstop().is_final()));
        match active {
            Some((id, true)) => self.tasks.push(id, TaskKind::AutoStop),
            Some((id, false)) if outcomes.iter().any(|(s, o)| *s == id && o.hit_current) => {
                self.tasks.push(id, TaskKind::ShowChoices)
            }
            _ => {}
        }

        self.sync(buffer_id);
        self.check_integrity(buffer_id);
        self.flush();
        Ok(())
    }

    /// Run the follow-up edits of the buffer's top session until it settles
    fn sync(&mut self, buffer_id: BufferId) {
        for _ in 0..MAX_FOLLOWUPS {
            let (Some(buffer), Some(stack)) = (
                self.buffers.get(&buffer_id),
                self.stacks.get_mut(&buffer_id),
            ) else {
                return;
            };
            let Some(session) = stack.top_mut() else {
                return;
            };
            let Some((edit, slot)) = session.next_followup(buffer) else {
                return;
            };
            let origin = Origin::Session {
                session: session.id(),
                slot,
            };
            if let Err(err) = self.apply_edit(buffer_id, &edit, origin) {
                warn!(buffer = %buffer_id, %err, "follow-up edit failed");
                return;
            }
        }
        warn!(buffer = %buffer_id, "follow-up edits did not settle");
    }

    fn show_choices(&mut self, buffer_id: BufferId, id: SessionId) {
        let (Some(buffer), Some(session)) = (
            self.buffers.get(&buffer_id),
            self.stacks.get(&buffer_id).and_then(|stack| stack.get(id)),
        ) else {
            return;
        };
        let Some((choices, typed)) = session.current_choices(buffer) else {
            return;
        };
        let items = choices::candidates(choices, typed.as_deref());
        if items.is_empty() {
            return;
        }
        let position = match session.current_span(buffer) {
            Some((start, _)) => buffer.offset_to_position(start),
            None => buffer.cursor_position(),
        };
        self.events.push(Event::ShowChoices {
            session: id,
            position,
            items,
        });
    }

    /// Run queued tasks; tasks of stopped or inactive sessions are dropped
    fn flush(&mut self) {
        while let Some(task) = self.tasks.pop() {
            let Some((buffer_id, active)) = self.active() else {
                continue;
            };
            if active != task.session {
                debug!(session = %task.session, kind = ?task.kind, "dropped stale task");
                continue;
            }
            match task.kind {
                TaskKind::AutoStop => {
                    self.stop_session(buffer_id, active);
                    self.resume_active();
                }
                TaskKind::ShowChoices => self.show_choices(buffer_id, active),
                TaskKind::SyncLinked => {
                    self.sync(buffer_id);
                    self.check_integrity(buffer_id);
                }
            }
        }
    }
}
