//! Recursive-descent parser building the hlb concrete syntax tree.
//!
//! A parse error inside a declaration yields a [`BadDecl`] carrying the
//! offending lexeme and skips to the end of that declaration; subsequent
//! declarations are still attempted so the checker can report several errors
//! in one pass.

use crate::{
    ast::*,
    error::{IoError, Result},
    kind::Kind,
    sources::{SourceBuffer, Span},
    Context,
};
use std::{io::Read, path::Path};

mod lexer;
pub mod token;

use lexer::{unescape, Lexer};
use token::{Keyword, Token, TokenKind};

/// Options for [`parse`].
#[derive(Clone, Debug, Default)]
pub struct ParseOptions {
    /// Buffer name registered for diagnostics; defaults to `<stdin>`.
    pub filename: Option<String>,
}

impl ParseOptions {
    pub fn with_filename(filename: impl Into<String>) -> Self {
        Self { filename: Some(filename.into()) }
    }
}

/// Parses a module from a reader, registering its buffer with the ambient
/// context so diagnostics can extract source text later.
#[instrument(skip_all, fields(filename = ?opts.filename))]
pub fn parse(ctx: &Context, mut reader: impl Read, opts: ParseOptions) -> Result<Module> {
    let mut src = String::new();
    reader
        .read_to_string(&mut src)
        .map_err(|err| IoError::new(err, Path::new(opts.filename.as_deref().unwrap_or("<stdin>"))))?;
    parse_str(ctx, &src, opts)
}

/// Parses a module from a string.
pub fn parse_str(ctx: &Context, src: &str, opts: ParseOptions) -> Result<Module> {
    let filename = opts.filename.unwrap_or_else(|| "<stdin>".to_string());
    let src = if src.contains('\r') { src.replace("\r\n", "\n") } else { src.to_string() };
    ctx.sources().set(filename.clone(), SourceBuffer::new(src.clone()));

    let tokens = Lexer::new(&src, filename.clone()).tokenize();
    trace!(filename = %filename, tokens = tokens.len(), "lexed token stream");
    Ok(Parser::new(tokens).module())
}

struct ParseError {
    span: Span,
    lexeme: String,
}

type PResult<T> = std::result::Result<T, ParseError>;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    // token plumbing

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_kind(&self) -> TokenKind {
        self.peek().kind
    }

    fn peek_at(&self, n: usize) -> &Token {
        &self.tokens[(self.pos + n).min(self.tokens.len() - 1)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == kind
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.next())
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.next())
        } else {
            Err(self.error_here())
        }
    }

    fn error_here(&self) -> ParseError {
        let token = self.peek();
        ParseError { span: token.span.clone(), lexeme: token.to_string() }
    }

    /// Skips blank lines, returning how many newlines were consumed.
    fn skip_newlines(&mut self) -> usize {
        let mut n = 0;
        while self.eat(TokenKind::Newline).is_some() {
            n += 1;
        }
        n
    }

    // module assembly

    fn module(mut self) -> Module {
        let start = self.peek().span.start.clone();
        let mut doc = None;
        let mut decls = Vec::new();

        self.skip_newlines();
        // a comment group opening the file followed by a blank line documents
        // the module itself
        if self.at(TokenKind::Comment) {
            let group = self.comment_group();
            if self.skip_newlines() > 0 || self.at(TokenKind::Eof) {
                doc = Some(group);
            } else {
                let decl = self.decl(Some(group));
                decls.push(decl);
            }
        }

        loop {
            self.skip_newlines();
            if self.at(TokenKind::Eof) {
                break;
            }
            let attached = if self.at(TokenKind::Comment) {
                let group = self.comment_group();
                if self.skip_newlines() > 0 || self.at(TokenKind::Eof) {
                    decls.push(Decl::Doc(group));
                    continue;
                }
                Some(group)
            } else {
                None
            };
            decls.push(self.decl(attached));
        }

        let end = self.peek().span.end.clone();
        Module { span: Span::new(start, end), doc, decls, ..Default::default() }
    }

    /// A run of comment lines with no blank line between them.
    fn comment_group(&mut self) -> CommentGroup {
        let mut comments = Vec::new();
        let mut span: Option<Span> = None;
        while self.at(TokenKind::Comment) {
            let token = self.next();
            span = Some(match span {
                Some(s) => s.to(&token.span),
                None => token.span.clone(),
            });
            comments.push(Comment { span: token.span, text: token.text });
            // exactly one newline continues the group; a blank line ends it
            if self.at(TokenKind::Newline) && self.peek_at(1).kind == TokenKind::Comment {
                self.next();
            } else {
                break;
            }
        }
        CommentGroup { span: span.unwrap_or_default(), comments }
    }

    fn decl(&mut self, doc: Option<CommentGroup>) -> Decl {
        let result = match self.peek_kind() {
            TokenKind::Keyword(Keyword::Import) => self.import_decl(doc.clone()).map(Decl::Import),
            TokenKind::Keyword(Keyword::Export) => self.export_decl(doc.clone()).map(Decl::Export),
            TokenKind::Ident => self.func_decl(doc.clone()).map(Decl::Func),
            _ => Err(self.error_here()),
        };
        match result {
            Ok(decl) => decl,
            Err(err) => {
                self.recover();
                Decl::Bad(BadDecl { span: err.span, lexeme: err.lexeme })
            }
        }
    }

    /// Skips to the end of the broken declaration: past balanced braces, then
    /// to the next newline.
    fn recover(&mut self) {
        let mut depth = 0usize;
        loop {
            match self.peek_kind() {
                TokenKind::Eof => return,
                TokenKind::LBrace => {
                    depth += 1;
                    self.next();
                }
                TokenKind::RBrace => {
                    self.next();
                    if depth <= 1 {
                        return;
                    }
                    depth -= 1;
                }
                TokenKind::Newline if depth == 0 => {
                    self.next();
                    return;
                }
                _ => {
                    self.next();
                }
            }
        }
    }

    fn import_decl(&mut self, doc: Option<CommentGroup>) -> PResult<ImportDecl> {
        let import = self.expect(TokenKind::Keyword(Keyword::Import))?;
        let name = self.ident()?;
        let deprecated_form = self.eat(TokenKind::Keyword(Keyword::From)).is_none();
        let expr = self.expr_allow_call()?;
        let span = import.span.to(expr.span());
        self.terminator()?;
        Ok(ImportDecl { span, doc, name, expr, deprecated_form })
    }

    fn export_decl(&mut self, doc: Option<CommentGroup>) -> PResult<ExportDecl> {
        let export = self.expect(TokenKind::Keyword(Keyword::Export))?;
        let name = self.ident()?;
        let span = export.span.to(&name.span);
        self.terminator()?;
        Ok(ExportDecl { span, doc, name })
    }

    fn func_decl(&mut self, doc: Option<CommentGroup>) -> PResult<FuncDecl> {
        let kind = self.type_expr()?;
        let name = self.ident()?;
        let params = self.field_list()?;
        let effects = if self.at(TokenKind::Keyword(Keyword::Binds)) {
            let binds = self.next();
            let fields = self.field_list()?;
            Some(EffectsClause { span: binds.span.to(&fields.span), fields })
        } else {
            None
        };
        let body = self.block()?;
        let span = kind.span.to(&body.span);
        Ok(FuncDecl {
            span,
            doc,
            kind,
            name,
            params,
            effects,
            body: Some(body),
            scope: Default::default(),
        })
    }

    fn type_expr(&mut self) -> PResult<TypeExpr> {
        let primary = self.expect(TokenKind::Ident)?;
        if self.at(TokenKind::ColonColon) {
            self.next();
            let secondary = self.expect(TokenKind::Ident)?;
            let span = primary.span.to(&secondary.span);
            Ok(TypeExpr { span, kind: Kind::new(format!("{}::{}", primary.text, secondary.text)) })
        } else {
            Ok(TypeExpr { span: primary.span.clone(), kind: Kind::new(primary.text) })
        }
    }

    fn ident(&mut self) -> PResult<Ident> {
        let token = self.expect(TokenKind::Ident)?;
        Ok(Ident { span: token.span, text: token.text })
    }

    fn field_list(&mut self) -> PResult<FieldList> {
        let open = self.expect(TokenKind::LParen)?;
        let mut fields = Vec::new();
        loop {
            self.skip_newlines();
            if self.at(TokenKind::RParen) {
                break;
            }
            if !fields.is_empty() {
                self.expect(TokenKind::Comma)?;
                self.skip_newlines();
            }
            fields.push(self.field()?);
        }
        let close = self.expect(TokenKind::RParen)?;
        // variadic is only legal on the last field
        if fields.iter().rev().skip(1).any(|f: &Field| f.modifier.is_some()) {
            return Err(ParseError { span: open.span.to(&close.span), lexeme: "variadic".to_string() });
        }
        Ok(FieldList { span: open.span.to(&close.span), fields })
    }

    fn field(&mut self) -> PResult<Field> {
        let modifier = self.eat(TokenKind::Keyword(Keyword::Variadic)).map(|token| Modifier {
            span: token.span,
            keyword: ModifierKind::Variadic,
        });
        let kind = self.type_expr()?;
        let name = self.ident()?;
        let start = modifier.as_ref().map(|m| m.span.clone()).unwrap_or_else(|| kind.span.clone());
        let span = start.to(&name.span);
        Ok(Field { span, modifier, kind, name })
    }

    fn block(&mut self) -> PResult<Block> {
        let open = self.expect(TokenKind::LBrace)?;
        let mut stmts = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::RBrace => break,
                TokenKind::Eof => return Err(self.error_here()),
                TokenKind::Newline => {
                    let token = self.next();
                    stmts.push(Stmt::Newline(Newline { span: token.span }));
                }
                TokenKind::Semi => {
                    self.next();
                }
                TokenKind::Comment => {
                    let token = self.next();
                    stmts.push(Stmt::Comment(Comment { span: token.span, text: token.text }));
                }
                _ => stmts.push(self.stmt()?),
            }
        }
        let close = self.expect(TokenKind::RBrace)?;
        Ok(Block { span: open.span.to(&close.span), stmts })
    }

    /// One statement. A leading identifier commits to a call; anything else
    /// is an expression statement.
    fn stmt(&mut self) -> PResult<Stmt> {
        if self.at(TokenKind::Ident) && !self.starts_func_lit() {
            return self.call_stmt();
        }
        let mut expr = self.unary_expr()?;
        let span = expr.span().clone();
        let pending = matches!(&expr, Expr::Basic(BasicLit::Heredoc(_)));
        self.stmt_terminator()?;
        if pending {
            self.heredoc_body(&mut expr)?;
        }
        Ok(Stmt::Expr(ExprStmt { span, expr }))
    }

    fn call_stmt(&mut self) -> PResult<Stmt> {
        let name = self.ident_expr()?;
        let mut span = name.span.clone();
        let mut args = Vec::new();
        let mut pending = Vec::new();

        while self.starts_expr() {
            let expr = self.unary_expr()?;
            span = span.to(expr.span());
            if matches!(&expr, Expr::Basic(BasicLit::Heredoc(_))) {
                pending.push(args.len());
            }
            args.push(expr);
        }

        let with = if self.at(TokenKind::Keyword(Keyword::With)) {
            let kw = self.next();
            let expr = self.expr_allow_call()?;
            span = span.to(expr.span());
            Some(WithClause { span: kw.span.to(expr.span()), expr })
        } else {
            None
        };

        let bind = if self.at(TokenKind::Keyword(Keyword::As)) {
            let clause = self.bind_clause()?;
            span = span.to(&clause.span);
            Some(clause)
        } else {
            None
        };

        self.stmt_terminator()?;
        for idx in pending {
            self.heredoc_body(&mut args[idx])?;
        }

        Ok(Stmt::Call(CallStmt { span, name, args, with, bind, callee: Default::default() }))
    }

    fn bind_clause(&mut self) -> PResult<BindClause> {
        let kw = self.expect(TokenKind::Keyword(Keyword::As))?;
        if self.at(TokenKind::LParen) {
            self.next();
            let mut list = Vec::new();
            loop {
                self.skip_newlines();
                if self.at(TokenKind::RParen) {
                    break;
                }
                if !list.is_empty() {
                    self.eat(TokenKind::Comma);
                    self.skip_newlines();
                    if self.at(TokenKind::RParen) {
                        break;
                    }
                }
                let source = self.ident()?;
                let target = self.ident()?;
                let span = source.span.to(&target.span);
                list.push(BindPair { span, source, target });
            }
            let close = self.expect(TokenKind::RParen)?;
            Ok(BindClause {
                span: kw.span.to(&close.span),
                ident: None,
                list,
                closure: Default::default(),
                effects: Default::default(),
            })
        } else {
            let target = self.ident()?;
            Ok(BindClause {
                span: kw.span.to(&target.span),
                ident: Some(target),
                list: Vec::new(),
                closure: Default::default(),
                effects: Default::default(),
            })
        }
    }

    /// Statements end at a newline, semicolon, or the closing brace of the
    /// enclosing block.
    fn stmt_terminator(&mut self) -> PResult<()> {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Semi => {
                self.next();
                Ok(())
            }
            TokenKind::RBrace | TokenKind::Eof => Ok(()),
            TokenKind::Comment => Ok(()),
            _ => Err(self.error_here()),
        }
    }

    /// Declarations end at a newline (or EOF).
    fn terminator(&mut self) -> PResult<()> {
        match self.peek_kind() {
            TokenKind::Newline | TokenKind::Semi => {
                self.next();
                Ok(())
            }
            TokenKind::Eof | TokenKind::Comment => Ok(()),
            _ => Err(self.error_here()),
        }
    }

    /// Whether the upcoming tokens begin an expression usable as a call
    /// argument.
    fn starts_expr(&self) -> bool {
        matches!(
            self.peek_kind(),
            TokenKind::Ident
                | TokenKind::Int
                | TokenKind::Numeric
                | TokenKind::StringStart
                | TokenKind::RawString
                | TokenKind::HeredocStart
                | TokenKind::Keyword(Keyword::True)
                | TokenKind::Keyword(Keyword::False)
        )
    }

    /// Whether the upcoming tokens begin a function literal: a primary kind
    /// identifier followed by `{` or `::`.
    fn starts_func_lit(&self) -> bool {
        if !self.at(TokenKind::Ident) {
            return false;
        }
        let token = self.peek();
        let is_kind = Kind::new(token.text.clone()).is_primary() || token.text == Kind::GROUP;
        is_kind
            && matches!(self.peek_at(1).kind, TokenKind::LBrace | TokenKind::ColonColon)
    }

    /// An expression that may be a call with arguments (import expressions
    /// and `with` clauses).
    fn expr_allow_call(&mut self) -> PResult<Expr> {
        if self.at(TokenKind::Ident) && !self.starts_func_lit() {
            let name = self.ident_expr()?;
            if self.starts_expr() {
                let mut span = name.span.clone();
                let mut args = Vec::new();
                while self.starts_expr() {
                    let expr = self.unary_expr()?;
                    span = span.to(expr.span());
                    args.push(expr);
                }
                return Ok(Expr::Call(CallExpr { span, name, args, callee: Default::default() }));
            }
            return Ok(Expr::Ident(name));
        }
        self.unary_expr()
    }

    /// A single expression: literal, identifier, or function literal.
    fn unary_expr(&mut self) -> PResult<Expr> {
        match self.peek_kind() {
            TokenKind::StringStart => self.string_lit().map(|l| Expr::Basic(BasicLit::Str(l))),
            TokenKind::RawString => {
                let token = self.next();
                Ok(Expr::Basic(BasicLit::RawStr(RawStringLit { span: token.span, value: token.text })))
            }
            TokenKind::HeredocStart => self.heredoc_start().map(|h| Expr::Basic(BasicLit::Heredoc(h))),
            TokenKind::Int => {
                let token = self.next();
                let value = token.text.parse::<i64>().map_err(|_| ParseError {
                    span: token.span.clone(),
                    lexeme: token.text.clone(),
                })?;
                Ok(Expr::Basic(BasicLit::Decimal(DecimalLit { span: token.span, value })))
            }
            TokenKind::Numeric => {
                let token = self.next();
                let digits = &token.text[2..];
                let radix = match &token.text[..2] {
                    "0x" | "0X" => 16,
                    "0o" | "0O" => 8,
                    _ => 2,
                };
                let value = i64::from_str_radix(digits, radix).map_err(|_| ParseError {
                    span: token.span.clone(),
                    lexeme: token.text.clone(),
                })?;
                Ok(Expr::Basic(BasicLit::Numeric(NumericLit {
                    span: token.span,
                    value,
                    text: token.text,
                })))
            }
            TokenKind::Keyword(Keyword::True) | TokenKind::Keyword(Keyword::False) => {
                let token = self.next();
                Ok(Expr::Basic(BasicLit::Bool(BoolLit {
                    span: token.span,
                    value: token.text == "true",
                })))
            }
            TokenKind::Ident if self.starts_func_lit() => {
                let kind = self.type_expr()?;
                let body = self.block()?;
                let span = kind.span.to(&body.span);
                Ok(Expr::FuncLit(FuncLit { span, kind, body }))
            }
            TokenKind::Ident => Ok(Expr::Ident(self.ident_expr()?)),
            _ => Err(self.error_here()),
        }
    }

    fn ident_expr(&mut self) -> PResult<IdentExpr> {
        let ident = self.ident()?;
        if self.at(TokenKind::Dot) {
            self.next();
            let reference = self.ident()?;
            let span = ident.span.to(&reference.span);
            Ok(IdentExpr { span, ident, reference: Some(reference) })
        } else {
            Ok(IdentExpr { span: ident.span.clone(), ident, reference: None })
        }
    }

    fn string_lit(&mut self) -> PResult<StringLit> {
        let open = self.expect(TokenKind::StringStart)?;
        let mut fragments = Vec::new();
        loop {
            match self.peek_kind() {
                TokenKind::StringText => {
                    let token = self.next();
                    fragments.push(StringFragment::Text {
                        span: token.span,
                        value: unescape(&token.text),
                        raw: token.text,
                    });
                }
                TokenKind::InterpStart => {
                    let start = self.next();
                    let expr = self.expr_allow_call()?;
                    let end = self.expect(TokenKind::InterpEnd)?;
                    fragments.push(StringFragment::Interp {
                        span: start.span.to(&end.span),
                        expr: Box::new(expr),
                    });
                }
                TokenKind::StringEnd => break,
                _ => return Err(self.error_here()),
            }
        }
        let close = self.expect(TokenKind::StringEnd)?;
        if close.text.is_empty() {
            // the lexer closed an unterminated string for us
            return Err(ParseError { span: open.span.to(&close.span), lexeme: "\"".to_string() });
        }
        Ok(StringLit { span: open.span.to(&close.span), fragments })
    }

    /// The announcing `<<MARKER` token; the body arrives after the statement
    /// terminator and is filled in by [`Parser::heredoc_body`].
    fn heredoc_start(&mut self) -> PResult<Heredoc> {
        let token = self.expect(TokenKind::HeredocStart)?;
        let rest = &token.text[2..];
        let (op, rest) = match rest.as_bytes().first() {
            Some(b'-') => (HeredocOp::Dedent, &rest[1..]),
            Some(b'~') => (HeredocOp::Fold, &rest[1..]),
            _ => (HeredocOp::Preserve, rest),
        };
        let raw = rest.starts_with('`');
        let marker = rest.trim_matches('`').to_string();
        Ok(Heredoc { span: token.span, op, marker, raw, fragments: Vec::new() })
    }

    /// Consumes a heredoc body (text runs, interpolations, end marker) and
    /// attaches the fragments to the announced heredoc inside `expr`.
    fn heredoc_body(&mut self, expr: &mut Expr) -> PResult<()> {
        let Expr::Basic(BasicLit::Heredoc(heredoc)) = expr else {
            return Err(self.error_here());
        };
        loop {
            match self.peek_kind() {
                TokenKind::StringText => {
                    let token = self.next();
                    heredoc.fragments.push(StringFragment::Text {
                        span: token.span,
                        value: token.text.clone(),
                        raw: token.text,
                    });
                }
                TokenKind::InterpStart => {
                    let start = self.next();
                    let inner = self.expr_allow_call()?;
                    let end = self.expect(TokenKind::InterpEnd)?;
                    heredoc.fragments.push(StringFragment::Interp {
                        span: start.span.to(&end.span),
                        expr: Box::new(inner),
                    });
                }
                TokenKind::HeredocEnd => {
                    let token = self.next();
                    heredoc.span = heredoc.span.to(&token.span);
                    return Ok(());
                }
                _ => return Err(self.error_here()),
            }
        }
    }
}
