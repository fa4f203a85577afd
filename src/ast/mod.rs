//! Concrete syntax tree for hlb modules.
//!
//! Nodes are created by the parser and never replaced. A small set of slots
//! is filled in afterwards: the linter rewrites deprecated sub-nodes in
//! place, the checker fills scopes, closures and callee pointers, and the
//! resolver attaches loaded modules to import objects. Slots written after
//! parse use write-once cells so they may be filled from resolver tasks.

use crate::{
    builtin::{Builtin, FieldSig},
    kind::Kind,
    scope::Scope,
    sources::Span,
};
use std::{
    fmt,
    sync::{Arc, OnceLock},
};

pub mod unparse;
pub mod walk;

/// Index of a declaration within its [`Module`].
pub type DeclIndex = usize;

/// Root of a compilation unit: one source file.
#[derive(Debug, Default)]
pub struct Module {
    pub span: Span,
    /// Comment group opening the module, if any.
    pub doc: Option<CommentGroup>,
    pub decls: Vec<Decl>,
    /// Root scope; filled by the semantic pass. Its outer chain terminates at
    /// the shared builtin scope.
    pub(crate) scope: OnceLock<Arc<Scope>>,
    /// Directory the module was loaded from, used to resolve relative
    /// imports. Local parses set it from the parse options; the resolver sets
    /// it for imported modules.
    pub(crate) dir: OnceLock<Arc<dyn crate::resolver::Directory>>,
}

impl Module {
    /// The root scope. Panics when called before the semantic pass ran.
    pub fn scope(&self) -> &Arc<Scope> {
        self.scope.get().expect("semantic pass has not run")
    }

    pub fn scope_opt(&self) -> Option<&Arc<Scope>> {
        self.scope.get()
    }

    pub fn directory(&self) -> Option<&Arc<dyn crate::resolver::Directory>> {
        self.dir.get()
    }

    pub fn set_directory(&self, dir: Arc<dyn crate::resolver::Directory>) {
        let _ = self.dir.set(dir);
    }

    /// Source file name the module was parsed from.
    pub fn filename(&self) -> &str {
        self.span.filename()
    }

    pub fn imports(&self) -> impl Iterator<Item = (DeclIndex, &ImportDecl)> {
        self.decls.iter().enumerate().filter_map(|(idx, decl)| match decl {
            Decl::Import(import) => Some((idx, import)),
            _ => None,
        })
    }

    pub fn funcs(&self) -> impl Iterator<Item = (DeclIndex, &FuncDecl)> {
        self.decls.iter().enumerate().filter_map(|(idx, decl)| match decl {
            Decl::Func(func) => Some((idx, func)),
            _ => None,
        })
    }

    pub fn import(&self, index: DeclIndex) -> Option<&ImportDecl> {
        match self.decls.get(index) {
            Some(Decl::Import(import)) => Some(import),
            _ => None,
        }
    }

    pub fn func(&self, index: DeclIndex) -> Option<&FuncDecl> {
        match self.decls.get(index)? {
            Decl::Func(func) => Some(func),
            _ => None,
        }
    }
}

/// A top-level declaration.
#[derive(Debug)]
pub enum Decl {
    Import(ImportDecl),
    Export(ExportDecl),
    Func(FuncDecl),
    /// A standalone comment group not attached to any declaration.
    Doc(CommentGroup),
    /// A declaration that failed to parse; carries the offending lexeme.
    Bad(BadDecl),
}

impl Decl {
    pub fn span(&self) -> &Span {
        match self {
            Decl::Import(d) => &d.span,
            Decl::Export(d) => &d.span,
            Decl::Func(d) => &d.span,
            Decl::Doc(d) => &d.span,
            Decl::Bad(d) => &d.span,
        }
    }

    /// The declared name, for declarations that bind one.
    pub fn name(&self) -> Option<&Ident> {
        match self {
            Decl::Import(d) => Some(&d.name),
            Decl::Func(d) => Some(&d.name),
            Decl::Export(_) | Decl::Doc(_) | Decl::Bad(_) => None,
        }
    }
}

/// `import name from <expr>`.
///
/// The expression evaluates at resolve time to either a string (local path)
/// or a filesystem (remote content-addressed module).
#[derive(Debug)]
pub struct ImportDecl {
    pub span: Span,
    pub doc: Option<CommentGroup>,
    pub name: Ident,
    pub expr: Expr,
    /// Whether the declaration was written without `from`. The linter
    /// rewrites this to the modern form.
    pub deprecated_form: bool,
}

/// `export name`.
#[derive(Debug)]
pub struct ExportDecl {
    pub span: Span,
    pub doc: Option<CommentGroup>,
    pub name: Ident,
}

/// `kind name(params) [binds (effects)] block`.
///
/// The body is absent for builtin prototypes.
#[derive(Debug)]
pub struct FuncDecl {
    pub span: Span,
    pub doc: Option<CommentGroup>,
    pub kind: TypeExpr,
    pub name: Ident,
    pub params: FieldList,
    pub effects: Option<EffectsClause>,
    pub body: Option<Block>,
    /// Function scope; filled by the semantic pass, outer is the module
    /// scope.
    pub(crate) scope: OnceLock<Arc<Scope>>,
}

impl FuncDecl {
    pub fn scope(&self) -> Option<&Arc<Scope>> {
        self.scope.get()
    }
}

/// A malformed declaration. Subsequent declarations are still parsed so the
/// checker can report multiple errors.
#[derive(Debug)]
pub struct BadDecl {
    pub span: Span,
    pub lexeme: String,
}

/// A type annotation, e.g. `fs` or `option::run`.
#[derive(Debug, Clone)]
pub struct TypeExpr {
    pub span: Span,
    pub kind: Kind,
}

/// An identifier token.
#[derive(Debug, Clone)]
pub struct Ident {
    pub span: Span,
    pub text: String,
}

impl Ident {
    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// `binds (kind name, ...)` on a function declaration.
#[derive(Debug)]
pub struct EffectsClause {
    pub span: Span,
    pub fields: FieldList,
}

/// A parenthesized, comma-separated field list.
#[derive(Debug, Default)]
pub struct FieldList {
    pub span: Span,
    pub fields: Vec<Field>,
}

impl FieldList {
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    /// Whether the last field is variadic.
    pub fn variadic(&self) -> Option<&Field> {
        self.fields.last().filter(|f| f.modifier.is_some())
    }
}

/// `[variadic] kind name` inside a field list.
#[derive(Debug, Clone)]
pub struct Field {
    pub span: Span,
    pub modifier: Option<Modifier>,
    pub kind: TypeExpr,
    pub name: Ident,
}

/// Field modifier; `variadic` is legal only on the last field of a list.
#[derive(Debug, Clone)]
pub struct Modifier {
    pub span: Span,
    pub keyword: ModifierKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierKind {
    Variadic,
}

/// `{ stmts }`.
#[derive(Debug, Default)]
pub struct Block {
    pub span: Span,
    pub stmts: Vec<Stmt>,
}

impl Block {
    /// Statements that carry semantics (skipping comments and blank lines).
    pub fn effective_stmts(&self) -> impl Iterator<Item = &Stmt> {
        self.stmts.iter().filter(|stmt| !matches!(stmt, Stmt::Comment(_) | Stmt::Newline(_)))
    }

    pub fn call_stmts(&self) -> impl Iterator<Item = &CallStmt> {
        self.stmts.iter().filter_map(|stmt| match stmt {
            Stmt::Call(call) => Some(call),
            _ => None,
        })
    }
}

/// A statement inside a block.
#[derive(Debug)]
pub enum Stmt {
    Call(CallStmt),
    Expr(ExprStmt),
    Comment(Comment),
    Newline(Newline),
}

impl Stmt {
    pub fn span(&self) -> &Span {
        match self {
            Stmt::Call(s) => &s.span,
            Stmt::Expr(s) => &s.span,
            Stmt::Comment(s) => &s.span,
            Stmt::Newline(s) => &s.span,
        }
    }
}

/// `name arg... [with expr] [as bind]`.
#[derive(Debug)]
pub struct CallStmt {
    pub span: Span,
    pub name: IdentExpr,
    pub args: Vec<Expr>,
    pub with: Option<WithClause>,
    pub bind: Option<BindClause>,
    /// Resolved callee; filled by the checker.
    pub(crate) callee: OnceLock<Callee>,
}

impl CallStmt {
    pub fn callee(&self) -> Option<&Callee> {
        self.callee.get()
    }
}

/// An expression in statement position, e.g. a literal body of a `string`
/// function.
#[derive(Debug)]
pub struct ExprStmt {
    pub span: Span,
    pub expr: Expr,
}

/// `with <expr>`; the expression must type-check to `option::<callee>`.
#[derive(Debug)]
pub struct WithClause {
    pub span: Span,
    pub expr: Expr,
}

/// `as target` or `as (source target, ...)`.
///
/// `closure` and `effects` are populated by the checker: `closure` is the
/// enclosing function declaration, `effects` the side-effect field list of
/// the called builtin.
#[derive(Debug)]
pub struct BindClause {
    pub span: Span,
    pub ident: Option<Ident>,
    pub list: Vec<BindPair>,
    pub(crate) closure: OnceLock<DeclIndex>,
    pub(crate) effects: OnceLock<Arc<Vec<FieldSig>>>,
}

impl BindClause {
    pub fn closure(&self) -> Option<DeclIndex> {
        self.closure.get().copied()
    }

    pub fn effects(&self) -> Option<&Arc<Vec<FieldSig>>> {
        self.effects.get()
    }

    /// Every (source, target) binding this clause introduces. A default
    /// `as x` bind yields a `None` source.
    pub fn targets(&self) -> Vec<(Option<&Ident>, &Ident)> {
        match &self.ident {
            Some(target) => vec![(None, target)],
            None => self.list.iter().map(|pair| (Some(&pair.source), &pair.target)).collect(),
        }
    }
}

/// `source target` inside a parenthesized bind list.
#[derive(Debug)]
pub struct BindPair {
    pub span: Span,
    pub source: Ident,
    pub target: Ident,
}

/// An expression.
#[derive(Debug)]
pub enum Expr {
    FuncLit(FuncLit),
    Basic(BasicLit),
    Call(CallExpr),
    Ident(IdentExpr),
}

impl Expr {
    pub fn span(&self) -> &Span {
        match self {
            Expr::FuncLit(e) => &e.span,
            Expr::Basic(e) => e.span(),
            Expr::Call(e) => &e.span,
            Expr::Ident(e) => &e.span,
        }
    }
}

/// `kind { stmts }`.
#[derive(Debug)]
pub struct FuncLit {
    pub span: Span,
    pub kind: TypeExpr,
    pub body: Block,
}

/// `name arg...` in expression position (e.g. an import expression).
#[derive(Debug)]
pub struct CallExpr {
    pub span: Span,
    pub name: IdentExpr,
    pub args: Vec<Expr>,
    pub(crate) callee: OnceLock<Callee>,
}

impl CallExpr {
    pub fn callee(&self) -> Option<&Callee> {
        self.callee.get()
    }
}

/// `ident` or `ident.reference`.
#[derive(Debug, Clone)]
pub struct IdentExpr {
    pub span: Span,
    pub ident: Ident,
    /// The selector after a dot, referring into an imported module.
    pub reference: Option<Ident>,
}

impl IdentExpr {
    pub fn text(&self) -> &str {
        &self.ident.text
    }
}

/// A literal.
#[derive(Debug)]
pub enum BasicLit {
    Str(StringLit),
    RawStr(RawStringLit),
    Heredoc(Heredoc),
    Decimal(DecimalLit),
    Numeric(NumericLit),
    Bool(BoolLit),
}

impl BasicLit {
    pub fn span(&self) -> &Span {
        match self {
            BasicLit::Str(l) => &l.span,
            BasicLit::RawStr(l) => &l.span,
            BasicLit::Heredoc(l) => &l.span,
            BasicLit::Decimal(l) => &l.span,
            BasicLit::Numeric(l) => &l.span,
            BasicLit::Bool(l) => &l.span,
        }
    }

    /// The kind a literal checks against.
    pub fn kind(&self) -> Kind {
        match self {
            BasicLit::Str(_) | BasicLit::RawStr(_) | BasicLit::Heredoc(_) => Kind::string(),
            BasicLit::Decimal(_) | BasicLit::Numeric(_) => Kind::int(),
            BasicLit::Bool(_) => Kind::bool(),
        }
    }
}

/// `"..."` with interpolation.
#[derive(Debug)]
pub struct StringLit {
    pub span: Span,
    pub fragments: Vec<StringFragment>,
}

impl StringLit {
    /// The literal's value with escapes applied; `None` when any fragment is
    /// an interpolation (the value is only known at evaluation time).
    pub fn value(&self) -> Option<String> {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                StringFragment::Text { value, .. } => out.push_str(value),
                StringFragment::Interp { .. } => return None,
            }
        }
        Some(out)
    }
}

/// `` `...` ``; no escapes, no interpolation.
#[derive(Debug)]
pub struct RawStringLit {
    pub span: Span,
    pub value: String,
}

/// A piece of a string or heredoc body.
#[derive(Debug)]
pub enum StringFragment {
    Text {
        span: Span,
        /// Unescaped value.
        value: String,
        /// The text exactly as written, used by the unparser.
        raw: String,
    },
    /// `${expr}`.
    Interp { span: Span, expr: Box<Expr> },
}

/// How a heredoc post-processes its captured lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeredocOp {
    /// `<<`: preserve whitespace literally.
    Preserve,
    /// `<<-`: strip the common leading indentation.
    Dedent,
    /// `<<~`: trim each line and join with single spaces.
    Fold,
}

/// `<<MARKER ... MARKER`, captured line by line.
#[derive(Debug)]
pub struct Heredoc {
    pub span: Span,
    pub op: HeredocOp,
    pub marker: String,
    /// Raw heredocs (backticked marker) admit no interpolation.
    pub raw: bool,
    pub fragments: Vec<StringFragment>,
}

impl Heredoc {
    /// The heredoc body exactly as captured, without post-processing.
    /// `None` when a fragment is an interpolation.
    pub fn literal_body(&self) -> Option<String> {
        let mut out = String::new();
        for fragment in &self.fragments {
            match fragment {
                StringFragment::Text { value, .. } => out.push_str(value),
                StringFragment::Interp { .. } => return None,
            }
        }
        Some(out)
    }

    /// Applies the operator's post-processing to the captured body.
    pub fn processed_body(&self) -> Option<String> {
        Some(process_heredoc(&self.literal_body()?, self.op))
    }
}

/// Applies heredoc post-processing to a literally captured body.
pub fn process_heredoc(body: &str, op: HeredocOp) -> String {
    match op {
        HeredocOp::Preserve => body.to_string(),
        HeredocOp::Dedent => {
            let indent = body
                .lines()
                .filter(|line| !line.trim().is_empty())
                .map(|line| line.len() - line.trim_start().len())
                .min()
                .unwrap_or(0);
            let mut out = String::new();
            for line in body.lines() {
                if line.len() >= indent {
                    out.push_str(&line[indent..]);
                } else {
                    out.push_str(line.trim_start());
                }
                out.push('\n');
            }
            if !body.ends_with('\n') {
                out.pop();
            }
            out
        }
        HeredocOp::Fold => {
            body.lines().map(str::trim).filter(|line| !line.is_empty()).collect::<Vec<_>>().join(" ")
        }
    }
}

/// A base-10 integer literal.
#[derive(Debug)]
pub struct DecimalLit {
    pub span: Span,
    pub value: i64,
}

/// An integer literal in another base (`0x`, `0o`, `0b`); keeps its original
/// spelling for round trips.
#[derive(Debug)]
pub struct NumericLit {
    pub span: Span,
    pub value: i64,
    pub text: String,
}

/// `true` or `false`.
#[derive(Debug)]
pub struct BoolLit {
    pub span: Span,
    pub value: bool,
}

/// `# ...` up to the end of line; `text` excludes the newline but includes
/// the leading `#`.
#[derive(Debug, Clone)]
pub struct Comment {
    pub span: Span,
    pub text: String,
}

/// Consecutive comments with nothing between them.
#[derive(Debug, Clone, Default)]
pub struct CommentGroup {
    pub span: Span,
    pub comments: Vec<Comment>,
}

impl CommentGroup {
    pub fn is_empty(&self) -> bool {
        self.comments.is_empty()
    }
}

/// A newline token, preserved for round-trip fidelity inside blocks.
#[derive(Debug)]
pub struct Newline {
    pub span: Span,
}

/// What a call resolved to.
#[derive(Clone)]
pub enum Callee {
    Builtin(&'static Builtin),
    /// A function declared in the same module.
    Decl(DeclIndex),
    /// A parameter or bind target referenced in call position.
    Field(String),
    /// A function reached through an import selector.
    Imported { module: Arc<Module>, index: DeclIndex },
}

impl fmt::Debug for Callee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Callee::Builtin(b) => write!(f, "Builtin({})", b.name),
            Callee::Decl(idx) => write!(f, "Decl({idx})"),
            Callee::Field(name) => write!(f, "Field({name})"),
            Callee::Imported { index, .. } => write!(f, "Imported({index})"),
        }
    }
}
