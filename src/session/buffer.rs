//! In-memory text buffer with gravity-aware marks
//!
//! Offsets are byte offsets into the buffer text. Positions exchanged with
//! callers use [`Position`] with `character` counted in chars.

use std::fmt;
use std::path::PathBuf;

use tower_lsp::lsp_types::{Position, Range};

use crate::error::EngineError;

/// Identifier of a buffer owned by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct BufferId(u64);

impl BufferId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Editing mode reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Normal,
    Insert,
}

/// Metadata used to resolve context variables
#[derive(Debug, Clone, Default)]
pub struct BufferInfo {
    pub path: Option<PathBuf>,
    pub language_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkId(usize);

#[derive(Debug, Clone, Copy)]
struct Mark {
    offset: usize,
    /// Moves past text inserted exactly at the mark
    right_gravity: bool,
    valid: bool,
}

/// Replace `start..end` with `text`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

impl Edit {
    pub fn insert(at: usize, text: impl Into<String>) -> Self {
        Self {
            start: at,
            end: at,
            text: text.into(),
        }
    }

    pub fn delete(start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            text: String::new(),
        }
    }
}

/// New offset of a mark at `offset` after `edit`. Gravity only decides
/// for marks at a pure insertion point or inside the removed range; a mark
/// touching a removal from outside stays outside it.
fn shift(offset: usize, right_gravity: bool, edit: &Edit) -> usize {
    let inserted = edit.text.len();
    let removes = edit.start < edit.end;
    if offset > edit.end || (removes && offset == edit.end) {
        offset - (edit.end - edit.start) + inserted
    } else if offset < edit.start || (removes && offset == edit.start) {
        offset
    } else if right_gravity {
        edit.start + inserted
    } else {
        edit.start
    }
}

/// A text buffer as seen by the snippet engine
#[derive(Debug, Clone)]
pub struct Buffer {
    id: BufferId,
    text: String,
    cursor: usize,
    mode: Mode,
    marks: Vec<Option<Mark>>,
    info: BufferInfo,
}

impl Buffer {
    pub fn new(id: BufferId, text: impl Into<String>, info: BufferInfo) -> Self {
        Self {
            id,
            text: text.into(),
            cursor: 0,
            mode: Mode::Normal,
            marks: Vec::new(),
            info,
        }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn info(&self) -> &BufferInfo {
        &self.info
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Cursor byte offset
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cursor_position(&self) -> Position {
        self.offset_to_position(self.cursor)
    }

    pub(crate) fn set_cursor(&mut self, offset: usize) {
        let mut offset = offset.min(self.text.len());
        while !self.text.is_char_boundary(offset) {
            offset -= 1;
        }
        self.cursor = offset;
    }

    /// Text in `start..end` if that is a valid range
    pub fn slice(&self, start: usize, end: usize) -> Option<&str> {
        self.text.get(start..end)
    }

    pub(crate) fn apply(&mut self, edit: &Edit) -> Result<(), EngineError> {
        if edit.start > edit.end || self.text.get(edit.start..edit.end).is_none() {
            return Err(EngineError::InvalidRange {
                start: edit.start,
                end: edit.end,
            });
        }
        self.text.replace_range(edit.start..edit.end, &edit.text);
        for mark in self.marks.iter_mut().flatten() {
            mark.offset = shift(mark.offset, mark.right_gravity, edit);
        }
        self.cursor = shift(self.cursor, false, edit);
        Ok(())
    }

    /// Replace the whole text; every mark becomes invalid
    pub(crate) fn replace_all(&mut self, text: impl Into<String>) {
        self.text = text.into();
        for mark in self.marks.iter_mut().flatten() {
            mark.valid = false;
        }
        self.set_cursor(self.cursor);
    }

    pub(crate) fn set_mark(&mut self, offset: usize, right_gravity: bool) -> MarkId {
        self.marks.push(Some(Mark {
            offset,
            right_gravity,
            valid: true,
        }));
        MarkId(self.marks.len() - 1)
    }

    /// Offset of a mark, if it still resolves inside the buffer
    pub(crate) fn mark(&self, id: MarkId) -> Option<usize> {
        let mark = self.marks.get(id.0).copied().flatten()?;
        (mark.valid && self.text.is_char_boundary(mark.offset)).then_some(mark.offset)
    }

    pub(crate) fn remove_mark(&mut self, id: MarkId) {
        if let Some(slot) = self.marks.get_mut(id.0) {
            *slot = None;
        }
    }

    /// Convert a byte offset to a line/character position
    pub fn offset_to_position(&self, offset: usize) -> Position {
        let mut line = 0u32;
        let mut character = 0u32;

        for (i, ch) in self.text.char_indices() {
            if i >= offset {
                break;
            }
            if ch == '\n' {
                line += 1;
                character = 0;
            } else {
                character += 1;
            }
        }

        Position { line, character }
    }

    pub fn range(&self, start: usize, end: usize) -> Range {
        Range {
            start: self.offset_to_position(start),
            end: self.offset_to_position(end),
        }
    }

    /// Convert a line/character position to a byte offset
    pub fn position_to_offset(&self, position: Position) -> Option<usize> {
        let line_start = self.line_start(position.line as usize)?;
        let line = self.text[line_start..].split('\n').next().unwrap_or("");
        let character = position.character as usize;
        if character == line.chars().count() {
            return Some(line_start + line.len());
        }
        line.char_indices()
            .nth(character)
            .map(|(offset, _)| line_start + offset)
    }

    pub(crate) fn range_to_offsets(&self, range: Range) -> Result<(usize, usize), EngineError> {
        let resolve = |position: Position| {
            self.position_to_offset(position)
                .ok_or(EngineError::InvalidPosition {
                    line: position.line,
                    character: position.character,
                })
        };
        let (start, end) = (resolve(range.start)?, resolve(range.end)?);
        if start > end {
            return Err(EngineError::InvalidRange { start, end });
        }
        Ok((start, end))
    }

    fn line_start(&self, line: usize) -> Option<usize> {
        if line == 0 {
            return Some(0);
        }
        self.text
            .match_indices('\n')
            .nth(line - 1)
            .map(|(offset, _)| offset + 1)
    }

    /// Line containing `offset`: `(line index, line text, column in chars)`
    pub fn line_at(&self, offset: usize) -> (usize, &str, usize) {
        let offset = offset.min(self.text.len());
        let start = self.text[..offset].rfind('\n').map_or(0, |i| i + 1);
        let end = self.text[offset..]
            .find('\n')
            .map_or(self.text.len(), |i| offset + i);
        let index = self.text[..start].matches('\n').count();
        let column = self.text[start..offset].chars().count();
        (index, &self.text[start..end], column)
    }

    /// Leading whitespace of the line containing `offset`
    pub fn indent_at(&self, offset: usize) -> &str {
        let (_, line, _) = self.line_at(offset);
        let end = line
            .find(|c: char| !c.is_whitespace())
            .unwrap_or(line.len());
        &line[..end]
    }
}
