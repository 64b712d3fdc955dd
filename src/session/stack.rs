//! Nesting order of the sessions of one buffer

use super::state::{Session, SessionId};

/// Sessions of one buffer, outermost first
#[derive(Debug, Default)]
pub struct SessionStack {
    sessions: Vec<Session>,
}

impl SessionStack {
    pub fn push(&mut self, session: Session) {
        self.sessions.push(session);
    }

    pub fn top(&self) -> Option<&Session> {
        self.sessions.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut Session> {
        self.sessions.last_mut()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id() == id)
    }

    pub fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id() == id)
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id() == id)?;
        Some(self.sessions.remove(index))
    }

    /// Outermost first
    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Session> {
        self.sessions.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
