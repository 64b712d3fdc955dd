//! Snippet sessions: tracking an expanded snippet while it is being edited

pub mod buffer;
pub mod choices;
pub mod events;
mod engine;
pub mod registry;
mod stack;
mod state;
pub mod tasks;
pub mod tree;

pub use buffer::{Buffer, BufferId, BufferInfo, Edit, Mode};
pub use engine::Engine;
pub use events::{Event, EventKind, EventLog};
pub use registry::{NodePath, Registry, TabstopEntry};
pub use stack::SessionStack;
pub use state::{
    Direction, Highlight, HighlightKind, Session, SessionId, SessionSnapshot, TabstopSnapshot,
    TabstopState,
};
