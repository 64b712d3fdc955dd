//! Work deferred until the current edit batch has settled
//!
//! Tasks are keyed by session. A task whose session has stopped, or is no
//! longer the active one, is dropped when it comes up.

use std::collections::VecDeque;

use super::state::SessionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Stop a session whose final tabstop was edited
    AutoStop,
    /// Offer the choices of the current tabstop
    ShowChoices,
    /// Mirror linked occurrences held back while suspended
    SyncLinked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    pub session: SessionId,
    pub kind: TaskKind,
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    tasks: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a task unless an identical one is already waiting
    pub fn push(&mut self, session: SessionId, kind: TaskKind) {
        let task = Task { session, kind };
        if !self.tasks.contains(&task) {
            self.tasks.push_back(task);
        }
    }

    pub fn pop(&mut self) -> Option<Task> {
        self.tasks.pop_front()
    }

    /// Forget everything queued for `session`
    pub fn cancel(&mut self, session: SessionId) {
        self.tasks.retain(|task| task.session != session);
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_without_duplicates() {
        let mut queue = TaskQueue::new();
        let a = SessionId::new(1);
        queue.push(a, TaskKind::ShowChoices);
        queue.push(a, TaskKind::AutoStop);
        queue.push(a, TaskKind::ShowChoices);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().map(|t| t.kind), Some(TaskKind::ShowChoices));
        assert_eq!(queue.pop().map(|t| t.kind), Some(TaskKind::AutoStop));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_cancel_by_session() {
        let mut queue = TaskQueue::new();
        let (a, b) = (SessionId::new(1), SessionId::new(2));
        queue.push(a, TaskKind::SyncLinked);
        queue.push(b, TaskKind::SyncLinked);
        queue.cancel(a);
        assert_eq!(queue.pop(), Some(Task { session: b, kind: TaskKind::SyncLinked }));
        assert!(queue.is_empty());
    }
}
