//! Lifecycle events and warnings

use serde::Serialize;
use tower_lsp::lsp_types::{CompletionItem, MessageType, Position, ShowMessageParams};

use super::state::{SessionId, SessionSnapshot};
use crate::parser::TabstopId;

/// Notification produced by the engine, observed by UI integrations
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SessionStart(SessionSnapshot),
    SessionStop(SessionSnapshot),
    SessionSuspend(SessionSnapshot),
    SessionResume(SessionSnapshot),
    /// Emitted before the session changes
    SessionJumpPre {
        session: SessionSnapshot,
        tabstop_from: TabstopId,
        tabstop_to: TabstopId,
    },
    SessionJump {
        session: SessionSnapshot,
        tabstop_from: TabstopId,
        tabstop_to: TabstopId,
    },
    /// Candidates to offer at the current choice tabstop
    ShowChoices {
        session: SessionId,
        position: Position,
        items: Vec<CompletionItem>,
    },
    Warning(ShowMessageParams),
}

/// Fieldless discriminant of [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    SessionStart,
    SessionStop,
    SessionSuspend,
    SessionResume,
    SessionJumpPre,
    SessionJump,
    ShowChoices,
    Warning,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::SessionStart(_) => EventKind::SessionStart,
            Event::SessionStop(_) => EventKind::SessionStop,
            Event::SessionSuspend(_) => EventKind::SessionSuspend,
            Event::SessionResume(_) => EventKind::SessionResume,
            Event::SessionJumpPre { .. } => EventKind::SessionJumpPre,
            Event::SessionJump { .. } => EventKind::SessionJump,
            Event::ShowChoices { .. } => EventKind::ShowChoices,
            Event::Warning(_) => EventKind::Warning,
        }
    }

    /// Session the event is about, if any
    pub fn session(&self) -> Option<SessionId> {
        match self {
            Event::SessionStart(s)
            | Event::SessionStop(s)
            | Event::SessionSuspend(s)
            | Event::SessionResume(s)
            | Event::SessionJumpPre { session: s, .. }
            | Event::SessionJump { session: s, .. } => Some(s.id),
            Event::ShowChoices { session, .. } => Some(*session),
            Event::Warning(_) => None,
        }
    }
}

/// Collects events until the host drains them
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Add a warning shown to the user
    pub fn warn(&mut self, message: String) {
        self.events.push(Event::Warning(ShowMessageParams {
            typ: MessageType::WARNING,
            message,
        }));
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warning_has_warning_type() {
        let mut log = EventLog::new();
        log.warn("broken".to_string());
        match &log.events()[0] {
            Event::Warning(params) => {
                assert_eq!(params.typ, MessageType::WARNING);
                assert_eq!(params.message, "broken");
            }
            other => panic!("expected warning, got {:?}", other),
        }
        assert_eq!(log.events()[0].kind(), EventKind::Warning);
        assert_eq!(log.events()[0].session(), None);
    }

    #[test]
    fn test_drain_empties_log() {
        let mut log = EventLog::new();
        log.push(Event::ShowChoices {
            session: SessionId::new(3),
            position: Position::new(0, 0),
            items: Vec::new(),
        });
        let drained = log.drain();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].session(), Some(SessionId::new(3)));
        assert!(log.is_empty());
    }
}
