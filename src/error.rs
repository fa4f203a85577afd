use crate::{diagnostics::DiagnosticSet, sources::Span};
use std::{
    io,
    path::{Path, PathBuf},
};

pub type Result<T> = std::result::Result<T, Error>;

/// Various error types the pipeline can produce.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Diagnostics accumulated by a checker or linter pass.
    #[error("{0}")]
    Diagnostics(DiagnosticSet),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error(transparent)]
    Serde(#[from] serde_json::Error),
    /// The operation's context was cancelled.
    #[error("context cancelled")]
    Cancelled,
    #[error("{0}")]
    Message(String),
}

impl Error {
    pub fn msg(msg: impl std::fmt::Display) -> Self {
        Error::Message(msg.to_string())
    }

    pub fn io(err: io::Error, path: impl AsRef<Path>) -> Self {
        IoError::new(err, path).into()
    }

    /// The diagnostics carried by this error, if it is a diagnostic
    /// aggregate.
    pub fn diagnostics(&self) -> Option<&DiagnosticSet> {
        match self {
            Error::Diagnostics(set) => Some(set),
            _ => None,
        }
    }

    /// Every span this error carries, for editor tooling.
    pub fn spans(&self) -> Vec<&Span> {
        match self {
            Error::Diagnostics(set) => set.iter().flat_map(|d| d.spans()).collect(),
            _ => Vec::new(),
        }
    }

    /// Exit code for a CLI host: 1 for diagnostics, 2 for internal errors.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Diagnostics(_) => 1,
            _ => 2,
        }
    }
}

/// An IO error together with the path it occurred on.
#[derive(Debug, thiserror::Error)]
#[error("\"{}\": {io}", self.path.display())]
pub struct IoError {
    io: io::Error,
    path: PathBuf,
}

impl IoError {
    pub fn new(io: io::Error, path: impl AsRef<Path>) -> Self {
        Self { io, path: path.as_ref().to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn io(&self) -> &io::Error {
        &self.io
    }

    /// Whether the underlying error is a not-found.
    pub fn is_not_found(&self) -> bool {
        self.io.kind() == io::ErrorKind::NotFound
    }
}

impl From<IoError> for io::Error {
    fn from(err: IoError) -> Self {
        err.io
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Diagnostic;

    #[test]
    fn exit_codes() {
        let mut set = DiagnosticSet::new();
        set.push(Diagnostic::UndefinedIdent {
            span: Span::default(),
            name: "x".into(),
            suggestion: None,
        });
        assert_eq!(Error::Diagnostics(set).exit_code(), 1);
        assert_eq!(Error::msg("boom").exit_code(), 2);
    }

    #[test]
    fn io_error_carries_path() {
        let err = IoError::new(io::Error::new(io::ErrorKind::NotFound, "gone"), "/x/y.hlb");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("/x/y.hlb"));
    }
}
