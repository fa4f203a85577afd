//! Traversal helpers over the closed statement/expression variants.

use super::*;

/// Visits every call statement in the module, including calls nested in
/// function literals and `with` clauses, in source order.
pub fn module_calls<'a>(module: &'a Module, f: &mut impl FnMut(&'a CallStmt)) {
    for decl in &module.decls {
        if let Decl::Func(func) = decl {
            if let Some(body) = &func.body {
                block_calls(body, f);
            }
        }
    }
}

pub fn block_calls<'a>(block: &'a Block, f: &mut impl FnMut(&'a CallStmt)) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Call(call) => {
                f(call);
                for arg in &call.args {
                    expr_calls(arg, f);
                }
                if let Some(with) = &call.with {
                    expr_calls(&with.expr, f);
                }
            }
            Stmt::Expr(expr) => expr_calls(&expr.expr, f),
            Stmt::Comment(_) | Stmt::Newline(_) => {}
        }
    }
}

fn expr_calls<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a CallStmt)) {
    match expr {
        Expr::FuncLit(lit) => block_calls(&lit.body, f),
        Expr::Basic(lit) => basic_exprs(lit, &mut |inner| expr_calls(inner, f)),
        Expr::Call(call) => {
            for arg in &call.args {
                expr_calls(arg, f);
            }
        }
        Expr::Ident(_) => {}
    }
}

/// Visits every expression in the module in source order, outermost first.
pub fn module_exprs<'a>(module: &'a Module, f: &mut impl FnMut(&'a Expr)) {
    for decl in &module.decls {
        match decl {
            Decl::Import(import) => each_expr(&import.expr, f),
            Decl::Func(func) => {
                if let Some(body) = &func.body {
                    block_exprs(body, f);
                }
            }
            _ => {}
        }
    }
}

pub fn block_exprs<'a>(block: &'a Block, f: &mut impl FnMut(&'a Expr)) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Call(call) => {
                for arg in &call.args {
                    each_expr(arg, f);
                }
                if let Some(with) = &call.with {
                    each_expr(&with.expr, f);
                }
            }
            Stmt::Expr(expr) => each_expr(&expr.expr, f),
            Stmt::Comment(_) | Stmt::Newline(_) => {}
        }
    }
}

fn each_expr<'a>(expr: &'a Expr, f: &mut impl FnMut(&'a Expr)) {
    f(expr);
    match expr {
        Expr::FuncLit(lit) => block_exprs(&lit.body, f),
        Expr::Basic(lit) => basic_exprs(lit, &mut |inner| each_expr(inner, f)),
        Expr::Call(call) => {
            for arg in &call.args {
                each_expr(arg, f);
            }
        }
        Expr::Ident(_) => {}
    }
}

fn basic_exprs<'a>(lit: &'a BasicLit, f: &mut impl FnMut(&'a Expr)) {
    let fragments = match lit {
        BasicLit::Str(string) => &string.fragments,
        BasicLit::Heredoc(heredoc) => &heredoc.fragments,
        _ => return,
    };
    for fragment in fragments {
        if let StringFragment::Interp { expr, .. } = fragment {
            f(expr);
        }
    }
}

/// Mutable visit over every call statement; used by the linter's rename
/// rewrites.
pub fn module_calls_mut(module: &mut Module, f: &mut impl FnMut(&mut CallStmt)) {
    for decl in &mut module.decls {
        if let Decl::Func(func) = decl {
            if let Some(body) = &mut func.body {
                block_calls_mut(body, f);
            }
        }
    }
}

fn block_calls_mut(block: &mut Block, f: &mut impl FnMut(&mut CallStmt)) {
    for stmt in &mut block.stmts {
        match stmt {
            Stmt::Call(call) => {
                f(call);
                for arg in &mut call.args {
                    expr_calls_mut(arg, f);
                }
                if let Some(with) = &mut call.with {
                    expr_calls_mut(&mut with.expr, f);
                }
            }
            Stmt::Expr(expr) => expr_calls_mut(&mut expr.expr, f),
            Stmt::Comment(_) | Stmt::Newline(_) => {}
        }
    }
}

fn expr_calls_mut(expr: &mut Expr, f: &mut impl FnMut(&mut CallStmt)) {
    match expr {
        Expr::FuncLit(lit) => block_calls_mut(&mut lit.body, f),
        Expr::Basic(lit) => basic_exprs_mut(lit, &mut |inner| expr_calls_mut(inner, f)),
        Expr::Call(call) => {
            for arg in &mut call.args {
                expr_calls_mut(arg, f);
            }
        }
        Expr::Ident(_) => {}
    }
}

/// Mutable visit over every type annotation: declaration types, field types
/// and function-literal types; used by the linter's kind rewrite.
pub fn module_types_mut(module: &mut Module, f: &mut impl FnMut(&mut TypeExpr)) {
    for decl in &mut module.decls {
        match decl {
            Decl::Import(import) => expr_types_mut(&mut import.expr, f),
            Decl::Func(func) => {
                f(&mut func.kind);
                for field in &mut func.params.fields {
                    f(&mut field.kind);
                }
                if let Some(effects) = &mut func.effects {
                    for field in &mut effects.fields.fields {
                        f(&mut field.kind);
                    }
                }
                if let Some(body) = &mut func.body {
                    block_types_mut(body, f);
                }
            }
            _ => {}
        }
    }
}

fn block_types_mut(block: &mut Block, f: &mut impl FnMut(&mut TypeExpr)) {
    for stmt in &mut block.stmts {
        match stmt {
            Stmt::Call(call) => {
                for arg in &mut call.args {
                    expr_types_mut(arg, f);
                }
                if let Some(with) = &mut call.with {
                    expr_types_mut(&mut with.expr, f);
                }
            }
            Stmt::Expr(expr) => expr_types_mut(&mut expr.expr, f),
            Stmt::Comment(_) | Stmt::Newline(_) => {}
        }
    }
}

fn expr_types_mut(expr: &mut Expr, f: &mut impl FnMut(&mut TypeExpr)) {
    match expr {
        Expr::FuncLit(lit) => {
            f(&mut lit.kind);
            block_types_mut(&mut lit.body, f);
        }
        Expr::Basic(lit) => basic_exprs_mut(lit, &mut |inner| expr_types_mut(inner, f)),
        Expr::Call(call) => {
            for arg in &mut call.args {
                expr_types_mut(arg, f);
            }
        }
        Expr::Ident(_) => {}
    }
}

fn basic_exprs_mut(lit: &mut BasicLit, f: &mut impl FnMut(&mut Expr)) {
    let fragments = match lit {
        BasicLit::Str(string) => &mut string.fragments,
        BasicLit::Heredoc(heredoc) => &mut heredoc.fragments,
        _ => return,
    };
    for fragment in fragments {
        if let StringFragment::Interp { expr, .. } = fragment {
            f(expr);
        }
    }
}
