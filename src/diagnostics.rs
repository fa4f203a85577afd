//! Semantic diagnostics: rich error values carrying spans, expected/found
//! kinds and "defined at" pointers, aggregated per checker pass.

use crate::{
    kind::{Kind, KindSet},
    sources::{SourceRegistry, Span},
};
use std::fmt;
use yansi::{Color, Paint, Style};

/// How severe a diagnostic is; deprecations render as warnings, everything
/// else as errors.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    #[default]
    Error,
    Warning,
}

impl Severity {
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error)
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }

    pub const fn color(&self) -> Color {
        match self {
            Self::Error => Color::Red,
            Self::Warning => Color::Yellow,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One diagnostic, tagged by kind so downstream tools can react.
#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    BadParse { span: Span, lexeme: String },
    DuplicateDecl { span: Span, name: String, defined_at: Option<Span> },
    DuplicateField { span: Span, name: String },
    UndefinedIdent { span: Span, name: String, suggestion: Option<String> },
    ImportWithoutReference { span: Span, name: String, defined_at: Option<Span> },
    NotExported { span: Span, name: String, import: String },
    WrongKind { span: Span, expected: KindSet, found: Kind, defined_at: Option<Span> },
    WrongArgCount { span: Span, name: String, expected: usize, actual: usize },
    /// A function with parameters passed as a value argument.
    FuncArgInCallPosition { span: Span, name: String },
    NoBindEffects { span: Span, name: String },
    NoBindClosure { span: Span, name: String },
    BadBindSource { span: Span, name: String, source: String },
    ImportPathNotExist { span: Span, path: String },
    ModuleNotVendored { span: Span, digest: String, target: String },
    /// Linter deprecation; non-fatal, emitted alongside a rewrite.
    Deprecated { span: Span, message: String },
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self {
            Self::Deprecated { .. } => Severity::Warning,
            _ => Severity::Error,
        }
    }

    /// The primary span the diagnostic points at.
    pub fn span(&self) -> &Span {
        match self {
            Self::BadParse { span, .. }
            | Self::DuplicateDecl { span, .. }
            | Self::DuplicateField { span, .. }
            | Self::UndefinedIdent { span, .. }
            | Self::ImportWithoutReference { span, .. }
            | Self::NotExported { span, .. }
            | Self::WrongKind { span, .. }
            | Self::WrongArgCount { span, .. }
            | Self::FuncArgInCallPosition { span, .. }
            | Self::NoBindEffects { span, .. }
            | Self::NoBindClosure { span, .. }
            | Self::BadBindSource { span, .. }
            | Self::ImportPathNotExist { span, .. }
            | Self::ModuleNotVendored { span, .. }
            | Self::Deprecated { span, .. } => span,
        }
    }

    /// The span of the declaration the diagnostic refers back to, if any.
    pub fn defined_at(&self) -> Option<&Span> {
        match self {
            Self::DuplicateDecl { defined_at, .. }
            | Self::ImportWithoutReference { defined_at, .. }
            | Self::WrongKind { defined_at, .. } => defined_at.as_ref(),
            _ => None,
        }
    }

    /// All spans this diagnostic carries, primary first; the accessor editor
    /// tooling consumes.
    pub fn spans(&self) -> Vec<&Span> {
        let mut spans = vec![self.span()];
        spans.extend(self.defined_at());
        spans
    }

    /// Renders the diagnostic with source excerpts pulled from the registry.
    pub fn render(&self, registry: &SourceRegistry) -> String {
        let mut out = String::new();
        let severity = self.severity();
        out.push_str(&paint(severity.as_str(), severity.color().style().bold()));
        out.push_str(&paint(&format!(": {self}"), Color::White.style().bold()));
        out.push('\n');
        render_frame(&mut out, registry, self.span(), None);
        if let Some(defined_at) = self.defined_at() {
            render_frame(&mut out, registry, defined_at, Some("defined here"));
        }
        out
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadParse { lexeme, .. } => write!(f, "unable to parse {lexeme:?}"),
            Self::DuplicateDecl { name, .. } => write!(f, "duplicate declaration {name}"),
            Self::DuplicateField { name, .. } => write!(f, "duplicate field {name}"),
            Self::UndefinedIdent { name, suggestion, .. } => match suggestion {
                Some(candidate) => {
                    write!(f, "undefined identifier {name}, did you mean {candidate}?")
                }
                None => write!(f, "undefined identifier {name}"),
            },
            Self::ImportWithoutReference { name, .. } => {
                write!(f, "use of module {name} without reference")
            }
            Self::NotExported { name, import, .. } => {
                write!(f, "{name} is not exported by module {import}")
            }
            Self::WrongKind { expected, found, .. } => {
                write!(f, "expected kind {expected}, found {found}")
            }
            Self::WrongArgCount { name, expected, actual, .. } => {
                write!(f, "{name} expects {expected} args, found {actual}")
            }
            Self::FuncArgInCallPosition { name, .. } => {
                write!(f, "func {name} must be used in a block literal")
            }
            Self::NoBindEffects { name, .. } => write!(f, "{name} does not bind side effects"),
            Self::NoBindClosure { name, .. } => {
                write!(f, "cannot bind {name} outside of a function body")
            }
            Self::BadBindSource { name, source, .. } => {
                write!(f, "{name} does not bind the side effect {source}")
            }
            Self::ImportPathNotExist { path, .. } => {
                write!(f, "import path {path:?} does not exist")
            }
            Self::ModuleNotVendored { digest, target, .. } => write!(
                f,
                "missing module {digest} from vendor, run `hlb mod vendor --target {target}` to vendor module"
            ),
            Self::Deprecated { message, .. } => f.write_str(message),
        }
    }
}

impl std::error::Error for Diagnostic {}

/// An aggregate of diagnostics from one pass, sorted by file and position
/// with one diagnostic per distinct location.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DiagnosticSet {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: DiagnosticSet) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity().is_error())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.diagnostics.iter()
    }

    /// Sorts by (file, offset) and keeps one diagnostic per location.
    pub fn normalize(&mut self) {
        self.diagnostics.sort_by(|a, b| a.span().start.cmp(&b.span().start));
        self.diagnostics.dedup_by(|a, b| a.span().start == b.span().start);
    }

    /// `Ok(())` when empty, the aggregate error otherwise.
    pub fn into_result(mut self) -> Result<(), crate::error::Error> {
        self.normalize();
        if self.diagnostics.is_empty() {
            Ok(())
        } else {
            Err(crate::error::Error::Diagnostics(self))
        }
    }

    pub fn render(&self, registry: &SourceRegistry) -> String {
        let mut out = String::new();
        for diagnostic in &self.diagnostics {
            out.push_str(&diagnostic.render(registry));
        }
        out
    }
}

impl IntoIterator for DiagnosticSet {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.diagnostics.into_iter()
    }
}

impl fmt::Display for DiagnosticSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, diagnostic) in self.diagnostics.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{}: {}: {}", diagnostic.span(), diagnostic.severity(), diagnostic)?;
        }
        Ok(())
    }
}

impl std::error::Error for DiagnosticSet {}

fn paint(text: &str, style: Style) -> String {
    Paint::new(text).with_style(style).to_string()
}

/// ```text
///  --> build.hlb:3:9
///   |
/// 3 |     image ref
///   |           ^^^
/// ```
fn render_frame(out: &mut String, registry: &SourceRegistry, span: &Span, note: Option<&str>) {
    use fmt::Write as _;
    let line_no = span.start.line.to_string();
    let gutter = " ".repeat(line_no.len());

    out.push_str(&paint(&format!("{gutter}--> "), Color::Blue.style()));
    let _ = writeln!(out, "{span}");

    let Some(buffer) = registry.get(span.filename()) else { return };
    let Some(text) = buffer.line_text(span.start.line) else { return };
    let text = text.replace('\t', " ");

    out.push_str(&paint(&format!("{gutter} |"), Color::Blue.style()));
    out.push('\n');
    out.push_str(&paint(&format!("{line_no} |"), Color::Blue.style()));
    let _ = writeln!(out, " {text}");

    let caret_start = span.start.column.saturating_sub(1);
    let caret_len = if span.end.line == span.start.line {
        (span.end.column.saturating_sub(span.start.column)).max(1)
    } else {
        text.len().saturating_sub(caret_start).max(1)
    };
    out.push_str(&paint(&format!("{gutter} |"), Color::Blue.style()));
    out.push(' ');
    out.push_str(&" ".repeat(caret_start));
    let mut carets = "^".repeat(caret_len);
    if let Some(note) = note {
        carets.push(' ');
        carets.push_str(note);
    }
    out.push_str(&paint(&carets, Color::Yellow.style().bold()));
    out.push('\n');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{Position, SourceBuffer};
    use pretty_assertions::assert_eq;

    fn span(file: &str, line: usize, column: usize, offset: usize, len: usize) -> Span {
        Span::new(
            Position::new(file, line, column, offset),
            Position::new(file, line, column + len, offset + len),
        )
    }

    #[test]
    fn sorted_and_deduplicated() {
        let mut set = DiagnosticSet::new();
        set.push(Diagnostic::UndefinedIdent {
            span: span("b.hlb", 2, 1, 10, 3),
            name: "x".into(),
            suggestion: None,
        });
        set.push(Diagnostic::UndefinedIdent {
            span: span("a.hlb", 1, 1, 0, 3),
            name: "y".into(),
            suggestion: None,
        });
        set.push(Diagnostic::DuplicateDecl {
            span: span("a.hlb", 1, 1, 0, 3),
            name: "y".into(),
            defined_at: None,
        });
        set.normalize();
        assert_eq!(set.len(), 2);
        assert_eq!(set.iter().next().unwrap().span().filename(), "a.hlb");
    }

    #[test]
    fn severities() {
        let deprecation = Diagnostic::Deprecated {
            span: span("a.hlb", 1, 1, 0, 1),
            message: "group is deprecated, use pipeline".into(),
        };
        assert_eq!(deprecation.severity(), Severity::Warning);
        let parse = Diagnostic::BadParse { span: span("a.hlb", 1, 1, 0, 1), lexeme: "(".into() };
        assert_eq!(parse.severity(), Severity::Error);

        let mut set = DiagnosticSet::new();
        set.push(deprecation);
        assert!(!set.has_errors());
        set.push(parse);
        assert!(set.has_errors());
    }

    #[test]
    fn spans_accessor_includes_defined_at() {
        let diagnostic = Diagnostic::DuplicateDecl {
            span: span("a.hlb", 3, 4, 20, 9),
            name: "duplicate".into(),
            defined_at: Some(span("a.hlb", 1, 4, 3, 9)),
        };
        assert_eq!(diagnostic.spans().len(), 2);
    }

    #[test]
    fn renders_frame_with_carets() {
        Paint::disable();
        let registry = SourceRegistry::new();
        registry.set("t.hlb", SourceBuffer::new("fs default() {\n\timage\n}\n"));
        let diagnostic = Diagnostic::WrongArgCount {
            span: span("t.hlb", 2, 2, 16, 5),
            name: "image".into(),
            expected: 1,
            actual: 0,
        };
        let rendered = diagnostic.render(&registry);
        assert!(rendered.contains("error: image expects 1 args, found 0"));
        assert!(rendered.contains("--> t.hlb:2:2"));
        assert!(rendered.contains("^^^^^"));
    }
}
