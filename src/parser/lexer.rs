//! Stateful lexer for hlb source.
//!
//! The lexer keeps a stack of lexing contexts. Strings, heredocs and
//! interpolations push sub-states; braces and parentheses push bracket states
//! so nested delimiters resolve unambiguously. Heredoc bodies begin after the
//! newline terminating the line that announced them, so announced heredocs
//! queue up until that newline is reached.

use super::token::{Keyword, Token, TokenKind};
use crate::sources::{Position, Span};
use std::{collections::VecDeque, sync::Arc};

#[derive(Clone, Debug, PartialEq, Eq)]
enum State {
    Root,
    String,
    Heredoc,
    Interpolated,
    Block,
    Paren,
    Reference,
}

#[derive(Clone, Debug)]
struct PendingHeredoc {
    marker: String,
    raw: bool,
}

pub struct Lexer<'a> {
    src: &'a str,
    filename: Arc<String>,
    pos: usize,
    line: usize,
    column: usize,
    states: Vec<State>,
    /// Heredocs announced on the current line, activated at its newline.
    pending: VecDeque<PendingHeredoc>,
    /// The heredoc currently being captured.
    active: Option<PendingHeredoc>,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str, filename: impl Into<String>) -> Self {
        Self {
            src,
            filename: Arc::new(filename.into()),
            pos: 0,
            line: 1,
            column: 1,
            states: vec![State::Root],
            pending: VecDeque::new(),
            active: None,
        }
    }

    /// Lexes the whole input. The token stream always ends with a newline
    /// followed by EOF, even when the input lacks a terminal newline.
    pub fn tokenize(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        while self.pos < self.src.len() {
            let before = self.pos;
            self.next_token(&mut tokens);
            if self.pos == before {
                // no rule consumed anything; skip one char to guarantee progress
                let start = self.position();
                let ch = self.bump().unwrap();
                self.emit(&mut tokens, TokenKind::Unknown, start, ch.to_string());
            }
        }
        if !matches!(tokens.last().map(|t| t.kind), Some(TokenKind::Newline)) {
            let here = self.position();
            tokens.push(Token {
                kind: TokenKind::Newline,
                span: Span::new(here.clone(), here),
                text: "\n".to_string(),
            });
        }
        let here = self.position();
        tokens.push(Token { kind: TokenKind::Eof, span: Span::new(here.clone(), here), text: String::new() });
        tokens
    }

    fn state(&self) -> &State {
        self.states.last().unwrap_or(&State::Root)
    }

    fn next_token(&mut self, tokens: &mut Vec<Token>) {
        match self.state() {
            State::String => self.lex_string(tokens),
            State::Heredoc => self.lex_heredoc(tokens),
            _ => self.lex_normal(tokens),
        }
    }

    fn lex_normal(&mut self, tokens: &mut Vec<Token>) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
        let start = self.position();
        let Some(ch) = self.peek() else { return };

        match ch {
            '\n' => {
                self.bump();
                self.emit(tokens, TokenKind::Newline, start, "\n".to_string());
                if let Some(pending) = self.pending.pop_front() {
                    self.active = Some(pending);
                    self.states.push(State::Heredoc);
                }
            }
            '#' => {
                let text = self.take_while(|c| c != '\n');
                self.emit(tokens, TokenKind::Comment, start, text);
            }
            '"' => {
                self.bump();
                self.emit(tokens, TokenKind::StringStart, start, "\"".to_string());
                self.states.push(State::String);
            }
            '`' => self.lex_raw_string(tokens, start),
            '<' if self.peek_at(1) == Some('<') => self.lex_heredoc_start(tokens, start),
            '{' => {
                self.bump();
                self.states.push(State::Block);
                self.emit(tokens, TokenKind::LBrace, start, "{".to_string());
            }
            '}' => {
                self.bump();
                match self.state() {
                    State::Interpolated => {
                        self.states.pop();
                        self.emit(tokens, TokenKind::InterpEnd, start, "}".to_string());
                    }
                    _ => {
                        if *self.state() == State::Block {
                            self.states.pop();
                        }
                        self.emit(tokens, TokenKind::RBrace, start, "}".to_string());
                    }
                }
            }
            '(' => {
                self.bump();
                self.states.push(State::Paren);
                self.emit(tokens, TokenKind::LParen, start, "(".to_string());
            }
            ')' => {
                self.bump();
                if *self.state() == State::Paren {
                    self.states.pop();
                }
                self.emit(tokens, TokenKind::RParen, start, ")".to_string());
            }
            ',' => {
                self.bump();
                self.emit(tokens, TokenKind::Comma, start, ",".to_string());
            }
            ';' => {
                self.bump();
                self.emit(tokens, TokenKind::Semi, start, ";".to_string());
            }
            ':' if self.peek_at(1) == Some(':') => {
                self.bump();
                self.bump();
                self.emit(tokens, TokenKind::ColonColon, start, "::".to_string());
            }
            '.' => {
                self.bump();
                self.states.push(State::Reference);
                self.emit(tokens, TokenKind::Dot, start, ".".to_string());
            }
            c if c.is_ascii_digit() => {
                let text = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                let kind = if text.starts_with("0x")
                    || text.starts_with("0X")
                    || text.starts_with("0o")
                    || text.starts_with("0O")
                    || text.starts_with("0b")
                    || text.starts_with("0B")
                {
                    TokenKind::Numeric
                } else {
                    TokenKind::Int
                };
                self.emit(tokens, kind, start, text);
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let text = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
                if *self.state() == State::Reference {
                    self.states.pop();
                }
                let kind = match Keyword::from_ident(&text) {
                    Some(kw) => TokenKind::Keyword(kw),
                    None => TokenKind::Ident,
                };
                self.emit(tokens, kind, start, text);
            }
            other => {
                self.bump();
                self.emit(tokens, TokenKind::Unknown, start, other.to_string());
            }
        }
    }

    fn lex_raw_string(&mut self, tokens: &mut Vec<Token>, start: Position) {
        self.bump(); // opening backtick
        let mut value = String::new();
        loop {
            match self.peek() {
                Some('`') => {
                    self.bump();
                    break;
                }
                Some('\n') | None => break, // unterminated; parser reports
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
        self.emit(tokens, TokenKind::RawString, start, value);
    }

    /// `<<IDENT`, `<<-IDENT`, `<<~IDENT` or the raw form with a backticked
    /// marker. The body starts after the next newline.
    fn lex_heredoc_start(&mut self, tokens: &mut Vec<Token>, start: Position) {
        self.bump();
        self.bump();
        let mut text = String::from("<<");
        if matches!(self.peek(), Some('-') | Some('~')) {
            text.push(self.bump().unwrap());
        }
        let raw = self.peek() == Some('`');
        if raw {
            self.bump();
        }
        let marker = self.take_while(|c| c.is_ascii_alphanumeric() || c == '_');
        if raw {
            text.push('`');
            text.push_str(&marker);
            if self.peek() == Some('`') {
                self.bump();
                text.push('`');
            }
        } else {
            text.push_str(&marker);
        }
        self.pending.push_back(PendingHeredoc { marker, raw });
        self.emit(tokens, TokenKind::HeredocStart, start, text);
    }

    /// One step of heredoc capture: the end marker line, a text run up to an
    /// interpolation, or a full line.
    fn lex_heredoc(&mut self, tokens: &mut Vec<Token>) {
        let start = self.position();
        let Some(active) = self.active.clone() else {
            self.states.pop();
            return;
        };

        if self.column == 1 {
            let rest = &self.src[self.pos..];
            let line = rest.split('\n').next().unwrap_or("");
            if line.trim() == active.marker {
                let text = self.take_while(|c| c != '\n');
                if self.peek() == Some('\n') {
                    self.bump();
                }
                self.states.pop();
                self.active = None;
                if let Some(next) = self.pending.pop_front() {
                    self.active = Some(next);
                    self.states.push(State::Heredoc);
                }
                self.emit(tokens, TokenKind::HeredocEnd, start, text);
                return;
            }
        }

        let mut text = String::new();
        loop {
            match self.peek() {
                None => break,
                Some('\n') => {
                    self.bump();
                    text.push('\n');
                    break;
                }
                Some('$') if !active.raw && self.peek_at(1) == Some('{') => {
                    if text.is_empty() {
                        self.bump();
                        self.bump();
                        self.states.push(State::Interpolated);
                        self.emit(tokens, TokenKind::InterpStart, start, "${".to_string());
                        return;
                    }
                    break;
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        if text.is_empty() {
            // EOF inside an unterminated heredoc
            self.states.pop();
            self.active = None;
        } else {
            self.emit(tokens, TokenKind::StringText, start, text);
        }
    }

    fn lex_string(&mut self, tokens: &mut Vec<Token>) {
        let start = self.position();
        let mut text = String::new();
        loop {
            match self.peek() {
                Some('"') => {
                    if text.is_empty() {
                        self.bump();
                        self.states.pop();
                        self.emit(tokens, TokenKind::StringEnd, start, "\"".to_string());
                        return;
                    }
                    break;
                }
                Some('$') if self.peek_at(1) == Some('{') => {
                    if text.is_empty() {
                        self.bump();
                        self.bump();
                        self.states.push(State::Interpolated);
                        self.emit(tokens, TokenKind::InterpStart, start, "${".to_string());
                        return;
                    }
                    break;
                }
                Some('\\') => {
                    text.push('\\');
                    self.bump();
                    if let Some(escaped) = self.bump() {
                        text.push(escaped);
                    }
                }
                Some('\n') | None => {
                    // unterminated; close the string and let the parser report
                    self.states.pop();
                    if !text.is_empty() {
                        self.emit(tokens, TokenKind::StringText, start.clone(), text);
                    }
                    let here = self.position();
                    self.emit(tokens, TokenKind::StringEnd, here, String::new());
                    return;
                }
                Some(c) => {
                    text.push(c);
                    self.bump();
                }
            }
        }
        self.emit(tokens, TokenKind::StringText, start, text);
    }

    fn emit(&self, tokens: &mut Vec<Token>, kind: TokenKind, start: Position, text: String) {
        tokens.push(Token { kind, span: Span::new(start, self.position()), text });
    }

    fn position(&self) -> Position {
        Position {
            filename: self.filename.clone(),
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if !pred(c) {
                break;
            }
            self.bump();
        }
        self.src[start..self.pos].to_string()
    }
}

/// Applies escape sequences to the raw text of a string fragment.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('$') => out.push('$'),
            Some('`') => out.push('`'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src, "<test>").tokenize().into_iter().map(|t| t.kind).collect()
    }

    fn texts(src: &str) -> Vec<(TokenKind, String)> {
        Lexer::new(src, "<test>").tokenize().into_iter().map(|t| (t.kind, t.text)).collect()
    }

    #[test]
    fn lexes_basic_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("fs default() {\n}\n"),
            vec![Ident, Ident, LParen, RParen, LBrace, Newline, RBrace, Newline, Eof]
        );
    }

    #[test]
    fn missing_terminal_newline_is_tolerated() {
        use TokenKind::*;
        assert_eq!(kinds("export build"), vec![Keyword(super::Keyword::Export), Ident, Newline, Eof]);
    }

    #[test]
    fn string_with_interpolation() {
        use TokenKind::*;
        assert_eq!(
            kinds("\"a${x}b\"\n"),
            vec![
                StringStart, StringText, InterpStart, Ident, InterpEnd, StringText, StringEnd,
                Newline, Eof
            ]
        );
    }

    #[test]
    fn escaped_quote_does_not_terminate() {
        let tokens = texts(r#""a\"b""#);
        assert_eq!(tokens[1], (TokenKind::StringText, "a\\\"b".to_string()));
        assert_eq!(unescape("a\\\"b"), "a\"b");
    }

    #[test]
    fn raw_string_has_no_escapes() {
        let tokens = texts("`a\\nb`\n");
        assert_eq!(tokens[0], (TokenKind::RawString, "a\\nb".to_string()));
    }

    #[test]
    fn heredoc_body_follows_line() {
        use TokenKind::*;
        let src = "run <<EOF \"after\"\nline one\nline two\nEOF\n";
        assert_eq!(
            kinds(src),
            vec![
                Ident, HeredocStart, StringStart, StringText, StringEnd, Newline, StringText,
                StringText, HeredocEnd, Newline, Eof
            ]
        );
        let tokens = texts(src);
        assert_eq!(tokens[6].1, "line one\n");
        assert_eq!(tokens[7].1, "line two\n");
        assert_eq!(tokens[8].1, "EOF");
    }

    #[test]
    fn heredoc_operators() {
        let tokens = texts("run <<-EOF\nEOF\n");
        assert_eq!(tokens[1], (TokenKind::HeredocStart, "<<-EOF".to_string()));
        let tokens = texts("run <<~EOF\nEOF\n");
        assert_eq!(tokens[1], (TokenKind::HeredocStart, "<<~EOF".to_string()));
    }

    #[test]
    fn raw_heredoc_ignores_interpolation() {
        use TokenKind::*;
        let src = "run <<`EOF`\n${not interp}\nEOF\n";
        assert_eq!(
            kinds(src),
            vec![Ident, HeredocStart, Newline, StringText, HeredocEnd, Newline, Eof]
        );
    }

    #[test]
    fn heredoc_interpolation() {
        use TokenKind::*;
        let src = "run <<EOF\nhello ${name}\nEOF\n";
        assert_eq!(
            kinds(src),
            vec![
                Ident, HeredocStart, Newline, StringText, InterpStart, Ident, InterpEnd,
                StringText, HeredocEnd, Newline, Eof
            ]
        );
    }

    #[test]
    fn selector_tokens() {
        use TokenKind::*;
        assert_eq!(kinds("foo.bar\n"), vec![Ident, Dot, Ident, Newline, Eof]);
    }

    #[test]
    fn numeric_bases() {
        let tokens = texts("644 0o755 0x1f\n");
        assert_eq!(tokens[0].0, TokenKind::Int);
        assert_eq!(tokens[1].0, TokenKind::Numeric);
        assert_eq!(tokens[2].0, TokenKind::Numeric);
    }

    #[test]
    fn comment_runs_to_end_of_line() {
        let tokens = texts("# a comment\nimage\n");
        assert_eq!(tokens[0], (TokenKind::Comment, "# a comment".to_string()));
    }

    #[test]
    fn positions_are_tracked() {
        let tokens = Lexer::new("fs x()\n", "<test>").tokenize();
        assert_eq!(tokens[1].span.start.line, 1);
        assert_eq!(tokens[1].span.start.column, 4);
        assert_eq!(tokens[1].span.start.offset, 3);
        assert_eq!(tokens[1].span.end.offset, 4);
        for t in &tokens {
            assert!(t.span.start.offset <= t.span.end.offset);
        }
    }
}
