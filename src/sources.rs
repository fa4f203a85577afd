use crate::error::{IoError, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt, fs,
    path::Path,
    sync::{Arc, RwLock},
};

/// A location in a source buffer.
///
/// Lines and columns are 1-based; `offset` is the byte offset into the
/// buffer. Spans are end-exclusive.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Position {
    /// Name of the buffer this position points into.
    pub filename: Arc<String>,
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(filename: impl Into<String>, line: usize, column: usize, offset: usize) -> Self {
        Self { filename: Arc::new(filename.into()), line, column, offset }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.filename.as_str(), self.offset).cmp(&(other.filename.as_str(), other.offset))
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.filename, self.line, self.column)
    }
}

/// A half-open `[start, end)` range of a source buffer.
#[derive(Clone, Debug, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// The buffer name both endpoints point into.
    pub fn filename(&self) -> &str {
        &self.start.filename
    }

    /// Joins two spans into the smallest span covering both.
    pub fn to(&self, end: &Span) -> Span {
        Span { start: self.start.clone(), end: end.end.clone() }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.start)
    }
}

/// Buffered content of a single source file.
///
/// The content is behind an `Arc` because buffers are cloned out of the
/// registry while diagnostics for several modules render in parallel.
#[derive(Clone, Debug)]
pub struct SourceBuffer {
    content: Arc<String>,
    /// Byte offset of the start of each line.
    lines: Arc<Vec<usize>>,
}

impl SourceBuffer {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into();
        let mut lines = vec![0];
        for (idx, b) in content.bytes().enumerate() {
            if b == b'\n' {
                lines.push(idx + 1);
            }
        }
        Self { content: Arc::new(content), lines: Arc::new(lines) }
    }

    /// Reads the file's content, normalizing line endings so positions are
    /// deterministic across platforms.
    pub fn read(file: impl AsRef<Path>) -> Result<Self> {
        let file = file.as_ref();
        trace!(file = %file.display(), "reading source");
        let mut content = fs::read_to_string(file).map_err(|err| IoError::new(err, file))?;
        if content.contains('\r') {
            content = content.replace("\r\n", "\n");
        }
        Ok(Self::new(content))
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Converts a 1-based line/column pair into a byte offset.
    ///
    /// Returns `None` when the line does not exist in this buffer.
    pub fn offset_of(&self, line: usize, column: usize) -> Option<usize> {
        let start = *self.lines.get(line.checked_sub(1)?)?;
        Some(start + column.saturating_sub(1))
    }

    /// The 1-based line containing `offset`.
    pub fn line_of(&self, offset: usize) -> usize {
        match self.lines.binary_search(&offset) {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        }
    }

    /// The full text of a 1-based line, without its trailing newline.
    pub fn line_text(&self, line: usize) -> Option<&str> {
        let start = *self.lines.get(line.checked_sub(1)?)?;
        let end = self.lines.get(line).map_or(self.content.len(), |e| *e);
        Some(self.content[start..end].trim_end_matches('\n'))
    }

    /// Extracts the text a span points at.
    pub fn slice(&self, span: &Span) -> &str {
        let start = span.start.offset.min(self.content.len());
        let end = span.end.offset.clamp(start, self.content.len());
        &self.content[start..end]
    }
}

/// Name → buffer registry used to render diagnostics.
///
/// A registry instance travels with the ambient [`Context`](crate::Context);
/// it is never process-wide. `set`/`get` take a lock because multiple imports
/// parse in parallel.
#[derive(Clone, Debug, Default)]
pub struct SourceRegistry {
    buffers: Arc<RwLock<HashMap<String, SourceBuffer>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, name: impl Into<String>, buffer: SourceBuffer) {
        self.buffers.write().expect("source registry poisoned").insert(name.into(), buffer);
    }

    pub fn get(&self, name: &str) -> Option<SourceBuffer> {
        self.buffers.read().expect("source registry poisoned").get(name).cloned()
    }

    /// All registered buffer names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> =
            self.buffers.read().expect("source registry poisoned").keys().cloned().collect();
        names.sort();
        names
    }
}
