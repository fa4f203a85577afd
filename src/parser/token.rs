use crate::sources::Span;
use std::fmt;

/// A lexical token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    /// The token's text as written. For string/heredoc text this is the raw
    /// fragment including escape sequences.
    pub text: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Keyword(Keyword),
    /// Base-10 integer literal.
    Int,
    /// Integer literal in another base (`0x`, `0o`, `0b`).
    Numeric,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Comma,
    Dot,
    /// `::` separating a kind's primary and secondary.
    ColonColon,
    Semi,
    Newline,
    Comment,
    /// Opening `"`.
    StringStart,
    /// A run of literal text inside a string or heredoc.
    StringText,
    /// Closing `"`.
    StringEnd,
    /// A complete `` `...` `` literal.
    RawString,
    /// `<<MARKER`, `<<-MARKER`, `<<~MARKER` or a backticked raw marker.
    HeredocStart,
    /// The closing marker line of a heredoc.
    HeredocEnd,
    /// `${` inside a string or heredoc.
    InterpStart,
    /// The `}` closing an interpolation.
    InterpEnd,
    /// A character the lexer has no rule for.
    Unknown,
    Eof,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Keyword {
    Import,
    Export,
    From,
    Binds,
    With,
    As,
    Variadic,
    True,
    False,
}

impl Keyword {
    pub fn from_ident(text: &str) -> Option<Self> {
        Some(match text {
            "import" => Self::Import,
            "export" => Self::Export,
            "from" => Self::From,
            "binds" => Self::Binds,
            "with" => Self::With,
            "as" => Self::As,
            "variadic" => Self::Variadic,
            "true" => Self::True,
            "false" => Self::False,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Export => "export",
            Self::From => "from",
            Self::Binds => "binds",
            Self::With => "with",
            Self::As => "as",
            Self::Variadic => "variadic",
            Self::True => "true",
            Self::False => "false",
        }
    }
}

impl TokenKind {
    /// Human-readable description for parse errors.
    pub fn describe(&self) -> &'static str {
        match self {
            Self::Ident => "identifier",
            Self::Keyword(kw) => kw.as_str(),
            Self::Int | Self::Numeric => "integer",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::ColonColon => "::",
            Self::Semi => ";",
            Self::Newline => "newline",
            Self::Comment => "comment",
            Self::StringStart | Self::StringText | Self::StringEnd => "string",
            Self::RawString => "raw string",
            Self::HeredocStart => "heredoc",
            Self::HeredocEnd => "heredoc end",
            Self::InterpStart => "${",
            Self::InterpEnd => "}",
            Self::Unknown => "unknown token",
            Self::Eof => "end of file",
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Newline => f.write_str("\\n"),
            TokenKind::Eof => f.write_str("<eof>"),
            _ => f.write_str(&self.text),
        }
    }
}
