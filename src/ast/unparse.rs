//! Canonical formatting of the concrete syntax tree.
//!
//! Unparsing normalizes layout: declarations separated by one blank line,
//! multi-line bodies indented with one tab, one-line bodies kept inline.
//! Heredoc bodies must survive verbatim, so their lines are emitted behind a
//! sentinel byte that block indentation skips over; [`unparse`] strips the
//! sentinels during final assembly.

use super::*;
use std::fmt::{self, Write as _};

/// Sentinel prefixing heredoc body lines so nested block indentation leaves
/// them alone. Never present in user-visible output.
const HEREDOC_SENTINEL: char = '\u{0}';

/// Renders a module to its canonical source text.
pub fn unparse(module: &Module) -> String {
    let mut out = String::new();
    if let Some(doc) = &module.doc {
        write_comment_group(&mut out, doc);
        out.push('\n');
    }
    let mut first = true;
    for decl in &module.decls {
        let text = decl_text(decl);
        if text.is_empty() {
            continue;
        }
        if !first {
            out.push('\n');
        }
        first = false;
        out.push_str(&text);
        out.push('\n');
    }
    out.replace(HEREDOC_SENTINEL, "")
}

fn decl_text(decl: &Decl) -> String {
    let mut out = String::new();
    match decl {
        Decl::Import(import) => {
            write_doc(&mut out, &import.doc);
            if import.deprecated_form {
                let _ = write!(out, "import {} {}", import.name.text, expr_text(&import.expr));
            } else {
                let _ = write!(out, "import {} from {}", import.name.text, expr_text(&import.expr));
            }
            push_heredoc_bodies(&mut out, std::slice::from_ref(&import.expr));
        }
        Decl::Export(export) => {
            write_doc(&mut out, &export.doc);
            let _ = write!(out, "export {}", export.name.text);
        }
        Decl::Func(func) => {
            write_doc(&mut out, &func.doc);
            let _ = write!(out, "{} {}{}", func.kind.kind, func.name.text, field_list_text(&func.params));
            if let Some(effects) = &func.effects {
                let _ = write!(out, " binds {}", field_list_text(&effects.fields));
            }
            if let Some(body) = &func.body {
                out.push(' ');
                out.push_str(&block_text(body));
            }
        }
        Decl::Doc(group) => write_comment_group(&mut out, group),
        Decl::Bad(bad) => out.push_str(&bad.lexeme),
    }
    // comment groups end with their own newline
    while out.ends_with('\n') {
        out.pop();
    }
    out
}

fn write_doc(out: &mut String, doc: &Option<CommentGroup>) {
    if let Some(group) = doc {
        write_comment_group(out, group);
    }
}

fn write_comment_group(out: &mut String, group: &CommentGroup) {
    for comment in &group.comments {
        out.push_str(&comment.text);
        out.push('\n');
    }
}

fn field_list_text(list: &FieldList) -> String {
    let fields: Vec<String> = list.iter().map(field_text).collect();
    format!("({})", fields.join(", "))
}

fn field_text(field: &Field) -> String {
    match &field.modifier {
        Some(_) => format!("variadic {} {}", field.kind.kind, field.name.text),
        None => format!("{} {}", field.kind.kind, field.name.text),
    }
}

/// Renders a block. Bodies whose source had no newlines stay inline as
/// `{ a; b }`; anything else renders one statement per line behind a tab.
pub fn block_text(block: &Block) -> String {
    let has_newlines = block.stmts.iter().any(|stmt| matches!(stmt, Stmt::Newline(_)));
    let effective: Vec<&Stmt> = block
        .stmts
        .iter()
        .filter(|stmt| !matches!(stmt, Stmt::Newline(_)))
        .collect();

    if effective.is_empty() {
        return "{}".to_string();
    }

    let inline = !has_newlines
        && effective.iter().all(|stmt| match stmt {
            Stmt::Call(call) => !stmt_has_heredoc(call),
            Stmt::Expr(expr) => !matches!(&expr.expr, Expr::Basic(BasicLit::Heredoc(_))),
            Stmt::Comment(_) | Stmt::Newline(_) => false,
        });

    if inline {
        let rendered: Vec<String> = effective.iter().map(|stmt| stmt_text(stmt)).collect();
        return format!("{{ {} }}", rendered.join("; "));
    }

    let mut out = String::from("{\n");
    let mut previous_blank = true;
    for stmt in &block.stmts {
        if let Stmt::Newline(_) = stmt {
            continue;
        }
        if !previous_blank && blank_line_before(block, stmt) {
            out.push('\n');
        }
        previous_blank = false;
        let text = stmt_text(stmt);
        for line in text.split('\n') {
            if line.starts_with(HEREDOC_SENTINEL) {
                out.push_str(line);
            } else {
                out.push('\t');
                out.push_str(line);
            }
            out.push('\n');
        }
    }
    out.push('}');
    out
}

/// Whether the source separated `stmt` from the previous statement with a
/// blank line; a single blank line is preserved.
fn blank_line_before(block: &Block, stmt: &Stmt) -> bool {
    let mut newlines = 0;
    for candidate in &block.stmts {
        if std::ptr::eq(candidate, stmt) {
            return newlines > 1;
        }
        if matches!(candidate, Stmt::Newline(_)) {
            newlines += 1;
        } else {
            newlines = 0;
        }
    }
    false
}

fn stmt_has_heredoc(call: &CallStmt) -> bool {
    call.args.iter().any(|arg| matches!(arg, Expr::Basic(BasicLit::Heredoc(_))))
}

fn stmt_text(stmt: &Stmt) -> String {
    match stmt {
        Stmt::Call(call) => call_text(call),
        Stmt::Expr(expr) => {
            let mut out = expr_text(&expr.expr);
            push_heredoc_bodies(&mut out, std::slice::from_ref(&expr.expr));
            out
        }
        Stmt::Comment(comment) => comment.text.clone(),
        Stmt::Newline(_) => String::new(),
    }
}

fn call_text(call: &CallStmt) -> String {
    let mut out = ident_expr_text(&call.name);
    for arg in &call.args {
        out.push(' ');
        out.push_str(&expr_text(arg));
    }
    if let Some(with) = &call.with {
        let _ = write!(out, " with {}", expr_text(&with.expr));
    }
    if let Some(bind) = &call.bind {
        out.push_str(&bind_text(bind));
    }
    push_heredoc_bodies(&mut out, &call.args);
    out
}

fn bind_text(bind: &BindClause) -> String {
    match &bind.ident {
        Some(target) => format!(" as {}", target.text),
        None => {
            let pairs: Vec<String> = bind
                .list
                .iter()
                .map(|pair| format!("{} {}", pair.source.text, pair.target.text))
                .collect();
            format!(" as ({})", pairs.join(", "))
        }
    }
}

fn ident_expr_text(ident: &IdentExpr) -> String {
    match &ident.reference {
        Some(reference) => format!("{}.{}", ident.ident.text, reference.text),
        None => ident.ident.text.clone(),
    }
}

fn expr_text(expr: &Expr) -> String {
    match expr {
        Expr::FuncLit(lit) => format!("{} {}", lit.kind.kind, block_text(&lit.body)),
        Expr::Basic(lit) => basic_lit_text(lit),
        Expr::Call(call) => {
            let mut out = ident_expr_text(&call.name);
            for arg in &call.args {
                out.push(' ');
                out.push_str(&expr_text(arg));
            }
            out
        }
        Expr::Ident(ident) => ident_expr_text(ident),
    }
}

fn basic_lit_text(lit: &BasicLit) -> String {
    match lit {
        BasicLit::Str(string) => {
            let mut out = String::from("\"");
            for fragment in &string.fragments {
                out.push_str(&fragment_text(fragment));
            }
            out.push('"');
            out
        }
        BasicLit::RawStr(raw) => format!("`{}`", raw.value),
        BasicLit::Heredoc(heredoc) => heredoc_start_text(heredoc),
        BasicLit::Decimal(decimal) => decimal.value.to_string(),
        BasicLit::Numeric(numeric) => numeric.text.clone(),
        BasicLit::Bool(b) => b.value.to_string(),
    }
}

fn fragment_text(fragment: &StringFragment) -> String {
    match fragment {
        StringFragment::Text { raw, .. } => raw.clone(),
        StringFragment::Interp { expr, .. } => format!("${{{}}}", expr_text(expr)),
    }
}

fn heredoc_start_text(heredoc: &Heredoc) -> String {
    let op = match heredoc.op {
        HeredocOp::Preserve => "",
        HeredocOp::Dedent => "-",
        HeredocOp::Fold => "~",
    };
    if heredoc.raw {
        format!("<<{op}`{}`", heredoc.marker)
    } else {
        format!("<<{op}{}", heredoc.marker)
    }
}

/// Appends the bodies of any heredocs among `exprs`, each line guarded by the
/// sentinel so enclosing blocks do not indent it.
fn push_heredoc_bodies(out: &mut String, exprs: &[Expr]) {
    for expr in exprs {
        let Expr::Basic(BasicLit::Heredoc(heredoc)) = expr else { continue };
        let mut body = String::new();
        for fragment in &heredoc.fragments {
            body.push_str(&fragment_text(fragment));
        }
        out.push('\n');
        for line in body.split_inclusive('\n') {
            out.push(HEREDOC_SENTINEL);
            out.push_str(line.trim_end_matches('\n'));
            out.push('\n');
        }
        out.push(HEREDOC_SENTINEL);
        out.push_str(&heredoc.marker);
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&unparse(self))
    }
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&decl_text(self).replace(HEREDOC_SENTINEL, ""))
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stmt_text(self).replace(HEREDOC_SENTINEL, ""))
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&expr_text(self))
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&block_text(self).replace(HEREDOC_SENTINEL, ""))
    }
}
