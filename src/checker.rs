//! Two-wave semantic analysis.
//!
//! Wave 1 ([`semantic_pass`]) builds scopes and detects duplicates; wave 2
//! ([`check`]) type-checks calls, arguments, `with` clauses and binds.
//! Selector references into imported modules are resolved separately by
//! [`check_references`] once the resolver has attached the imported module.

use crate::{
    ast::{self, walk, Callee, Module},
    builtin,
    diagnostics::{Diagnostic, DiagnosticSet},
    error::{Error, Result},
    kind::{Kind, KindSet},
    scope::{Object, ObjectKind, ObjectNode, Scope, ScopeLevel},
    sources::Span,
};
use std::sync::Arc;

/// Wave 1: scope construction and duplicate detection.
///
/// Running it twice is harmless; scopes are write-once and diagnostics are
/// recomputed from scratch.
#[instrument(skip_all, fields(module = module.filename()))]
pub fn semantic_pass(module: &Module) -> Result<()> {
    let mut diags = DiagnosticSet::new();

    let scope = Scope::new(ScopeLevel::Module, Some(builtin::root_scope()));
    let _ = module.scope.set(scope.clone());
    let scope = module.scope().clone();

    // top-level declarations, in source order
    for (index, decl) in module.decls.iter().enumerate() {
        match decl {
            ast::Decl::Bad(bad) => {
                diags.push(Diagnostic::BadParse { span: bad.span.clone(), lexeme: bad.lexeme.clone() });
            }
            ast::Decl::Import(import) => {
                declare(module, &scope, &import.name, Kind::none(), index, &mut diags);
            }
            ast::Decl::Func(func) => {
                declare(module, &scope, &func.name, func.kind.kind.clone(), index, &mut diags);
            }
            ast::Decl::Export(_) | ast::Decl::Doc(_) => {}
        }
    }

    // function scopes: parameters and declared effects
    for (index, func) in module.funcs() {
        let func_scope = Scope::new(ScopeLevel::Function, Some(scope.clone()));
        let _ = func.scope.set(func_scope);
        let func_scope = func.scope().unwrap();

        let mut fields: Vec<&ast::Field> = func.params.iter().collect();
        if let Some(effects) = &func.effects {
            fields.extend(effects.fields.iter());
        }
        for field in fields {
            if let Some(existing) = func_scope.lookup_local(&field.name.text) {
                match &existing.node {
                    // a repeated pass re-encounters its own insertion
                    ObjectNode::Field { span } if *span == field.span => {}
                    _ => diags.push(Diagnostic::DuplicateField {
                        span: field.name.span.clone(),
                        name: field.name.text.clone(),
                    }),
                }
                continue;
            }
            func_scope.insert(Arc::new(Object::new(
                ObjectKind::Field,
                field.name.text.clone(),
                field.kind.kind.clone(),
                ObjectNode::Field { span: field.span.clone() },
            )));
        }

        // register bind targets at module scope and attach lexical closures
        if let Some(body) = &func.body {
            walk::block_calls(body, &mut |call| {
                let Some(bind) = &call.bind else { return };
                let _ = bind.closure.set(index);
                for (source, target) in bind.targets() {
                    let kind = bind_target_kind(&call.name.ident.text, source);
                    if let Some(existing) = scope.lookup_local(&target.text) {
                        match &existing.node {
                            ObjectNode::Field { span } if *span == target.span => {}
                            _ => {
                                diags.push(Diagnostic::DuplicateDecl {
                                    span: target.span.clone(),
                                    name: target.text.clone(),
                                    defined_at: existing.defined_at(module),
                                });
                                continue;
                            }
                        }
                    }
                    scope.insert(Arc::new(Object::new(
                        ObjectKind::Field,
                        target.text.clone(),
                        kind,
                        ObjectNode::Field { span: target.span.clone() },
                    )));
                }
            });
        }
    }

    diags.into_result()
}

fn declare(
    module: &Module,
    scope: &Arc<Scope>,
    name: &ast::Ident,
    kind: Kind,
    index: usize,
    diags: &mut DiagnosticSet,
) {
    // shadowing a builtin is legal; redefining a module-level name is not.
    // a repeated pass re-encounters its own insertion, which is not a
    // duplicate either.
    if let Some(existing) = scope.lookup_local(&name.text) {
        match &existing.node {
            ObjectNode::Decl(i) if *i == index => {}
            _ => {
                diags.push(Diagnostic::DuplicateDecl {
                    span: name.span.clone(),
                    name: name.text.clone(),
                    defined_at: existing.defined_at(module),
                });
            }
        }
        return;
    }
    scope.insert(Arc::new(Object::new(ObjectKind::Decl, name.text.clone(), kind, ObjectNode::Decl(index))));
}

/// The kind a bind target takes: the bound effect's declared kind.
fn bind_target_kind(callee: &str, source: Option<&ast::Ident>) -> Kind {
    let Some(effects) = builtin::lookup(callee).and_then(|b| b.effects().cloned()) else {
        return Kind::none();
    };
    match source {
        Some(source) => effects
            .iter()
            .find(|field| field.name == source.text)
            .map(|field| field.kind.clone())
            .unwrap_or_else(Kind::none),
        None => effects.first().map(|field| field.kind.clone()).unwrap_or_else(Kind::none),
    }
}

/// Wave 2: type checking. Requires [`semantic_pass`] to have run.
#[instrument(skip_all, fields(module = module.filename()))]
pub fn check(module: &Module) -> Result<()> {
    let mut diags = DiagnosticSet::new();
    let scope = module.scope().clone();

    for decl in &module.decls {
        match decl {
            ast::Decl::Import(import) => {
                // the import expression evaluates to a local path or a
                // filesystem
                let found = expr_kind(&scope, &import.expr, module);
                if let Some(found) = found {
                    if !found.equals(&Kind::string()) && !found.equals(&Kind::fs()) {
                        diags.push(Diagnostic::WrongKind {
                            span: import.expr.span().clone(),
                            expected: [Kind::string(), Kind::fs()].into_iter().collect(),
                            found,
                            defined_at: None,
                        });
                        continue;
                    }
                }
                match &import.expr {
                    ast::Expr::FuncLit(lit) => {
                        check_block(module, &scope, &lit.body, &lit.kind.kind, &mut diags)
                    }
                    ast::Expr::Call(call) => {
                        check_call_expr(module, &scope, call, &mut diags);
                    }
                    ast::Expr::Ident(ident) if ident.reference.is_none() => {
                        if scope.lookup(&ident.ident.text).is_none() {
                            diags.push(undefined(&scope, &ident.ident, None));
                        }
                    }
                    _ => {}
                }
            }
            ast::Decl::Export(export) => match scope.lookup(&export.name.text) {
                Some(object) if object.kind != ObjectKind::Builtin => object.set_exported(),
                _ => diags.push(Diagnostic::UndefinedIdent {
                    span: export.name.span.clone(),
                    name: export.name.text.clone(),
                    suggestion: scope.suggestion(&export.name.text, None),
                }),
            },
            ast::Decl::Func(func) => {
                if !primary_kinds().contains(&func.kind.kind) {
                    diags.push(Diagnostic::WrongKind {
                        span: func.kind.span.clone(),
                        expected: primary_kinds(),
                        found: func.kind.kind.clone(),
                        defined_at: None,
                    });
                    continue;
                }
                let func_scope = func.scope().expect("semantic pass ran").clone();
                if let Some(body) = &func.body {
                    check_block(module, &func_scope, body, &func.kind.kind, &mut diags);
                }
            }
            ast::Decl::Doc(_) | ast::Decl::Bad(_) => {}
        }
    }

    diags.into_result()
}

fn primary_kinds() -> KindSet {
    [Kind::string(), Kind::int(), Kind::bool(), Kind::fs(), Kind::pipeline(), Kind::option()]
        .into_iter()
        .collect()
}

/// The kind an expression produces, when it can be determined without
/// emitting diagnostics; `None` for unresolved names and deferred selectors.
fn expr_kind(scope: &Arc<Scope>, expr: &ast::Expr, module: &Module) -> Option<Kind> {
    match expr {
        ast::Expr::Basic(lit) => Some(lit.kind()),
        ast::Expr::FuncLit(lit) => Some(lit.kind.kind.clone()),
        ast::Expr::Ident(ident) => {
            if ident.reference.is_some() {
                return None;
            }
            Some(scope.lookup(&ident.ident.text)?.value_kind.clone())
        }
        ast::Expr::Call(call) => {
            if call.name.reference.is_some() {
                return None;
            }
            let object = scope.lookup(&call.name.ident.text)?;
            match &object.node {
                ObjectNode::Builtin(builtin) => builtin.sigs.first().map(|sig| sig.kind.clone()),
                ObjectNode::Decl(index) => module.func(*index).map(|f| f.kind.kind.clone()),
                ObjectNode::Field { .. } => Some(object.value_kind.clone()),
            }
        }
    }
}

/// Checks a block against the kind it must produce. Empty blocks are always
/// legal; option blocks additionally admit bare identifiers and literals
/// without sub-kind refinement.
fn check_block(module: &Module, scope: &Arc<Scope>, block: &ast::Block, kind: &Kind, diags: &mut DiagnosticSet) {
    for stmt in block.effective_stmts() {
        match stmt {
            ast::Stmt::Call(call) => check_call(module, scope, call, kind, diags),
            ast::Stmt::Expr(expr) => {
                check_expr(module, scope, &expr.expr, kind, diags);
            }
            ast::Stmt::Comment(_) | ast::Stmt::Newline(_) => {}
        }
    }
}

/// Checks one call statement in a block of kind `expected`.
fn check_call(
    module: &Module,
    scope: &Arc<Scope>,
    call: &ast::CallStmt,
    expected: &Kind,
    diags: &mut DiagnosticSet,
) {
    let name = &call.name.ident;

    // selector calls are verified here and resolved by check_references once
    // the import is loaded
    if let Some(reference) = &call.name.reference {
        match scope.lookup(&name.text) {
            None => diags.push(undefined(scope, name, None)),
            Some(object) => {
                if !is_import(module, &object) {
                    diags.push(Diagnostic::UndefinedIdent {
                        span: call.name.span.clone(),
                        name: format!("{}.{}", name.text, reference.text),
                        suggestion: None,
                    });
                }
            }
        }
        check_with(module, scope, call, &reference.text, diags);
        return;
    }

    let Some(object) = scope.lookup(&name.text) else {
        let filter: KindSet = [expected.clone()].into_iter().collect();
        diags.push(undefined(scope, name, Some(&filter)));
        return;
    };

    match (&object.kind, &object.node) {
        (ObjectKind::Builtin, ObjectNode::Builtin(builtin)) => {
            let Some(sig) = builtin.sig_for(expected) else {
                diags.push(Diagnostic::WrongKind {
                    span: call.name.span.clone(),
                    expected: builtin.kinds(),
                    found: expected.clone(),
                    defined_at: None,
                });
                return;
            };
            let _ = call.callee.set(Callee::Builtin(*builtin));
            let params: Vec<(Kind, bool)> =
                sig.params.iter().map(|p| (p.kind.clone(), p.variadic)).collect();
            check_args(module, scope, &call.name.span, &name.text, &params, &call.args, diags);
            check_with(module, scope, call, &name.text, diags);
            check_bind(call, &name.text, Some(sig), diags);
        }
        (_, ObjectNode::Decl(index)) => {
            if let Some(import) = module.import(*index) {
                // an import used as a call without a selector
                diags.push(Diagnostic::ImportWithoutReference {
                    span: call.name.span.clone(),
                    name: name.text.clone(),
                    defined_at: Some(import.span.clone()),
                });
                return;
            }
            let Some(func) = module.func(*index) else { return };
            if !func.kind.kind.equals(expected) {
                diags.push(Diagnostic::WrongKind {
                    span: call.name.span.clone(),
                    expected: [expected.clone()].into_iter().collect(),
                    found: func.kind.kind.clone(),
                    defined_at: Some(func.name.span.clone()),
                });
                return;
            }
            let _ = call.callee.set(Callee::Decl(*index));
            let params: Vec<(Kind, bool)> = func
                .params
                .iter()
                .map(|p| (p.kind.kind.clone(), p.modifier.is_some()))
                .collect();
            check_args(module, scope, &call.name.span, &name.text, &params, &call.args, diags);
            check_with(module, scope, call, &name.text, diags);
            check_bind(call, &name.text, None, diags);
        }
        (ObjectKind::Field, node) => {
            // a parameter or bind target used as a statement
            if !object.value_kind.equals(expected) {
                let defined_at = match node {
                    ObjectNode::Field { span } => Some(span.clone()),
                    _ => None,
                };
                diags.push(Diagnostic::WrongKind {
                    span: call.name.span.clone(),
                    expected: [expected.clone()].into_iter().collect(),
                    found: object.value_kind.clone(),
                    defined_at,
                });
                return;
            }
            if !call.args.is_empty() {
                diags.push(Diagnostic::WrongArgCount {
                    span: call.name.span.clone(),
                    name: name.text.clone(),
                    expected: 0,
                    actual: call.args.len(),
                });
                return;
            }
            let _ = call.callee.set(Callee::Field(name.text.clone()));
            check_bind(call, &name.text, None, diags);
        }
        _ => {}
    }
}

fn is_import(module: &Module, object: &Object) -> bool {
    matches!(&object.node, ObjectNode::Decl(index) if module.import(*index).is_some())
}

fn undefined(scope: &Arc<Scope>, name: &ast::Ident, filter: Option<&KindSet>) -> Diagnostic {
    Diagnostic::UndefinedIdent {
        span: name.span.clone(),
        name: name.text.clone(),
        suggestion: scope.suggestion(&name.text, filter),
    }
}

/// Arity and per-argument kind checks. A trailing variadic parameter matches
/// any number of trailing arguments of its kind.
fn check_args(
    module: &Module,
    scope: &Arc<Scope>,
    span: &Span,
    name: &str,
    params: &[(Kind, bool)],
    args: &[ast::Expr],
    diags: &mut DiagnosticSet,
) {
    let variadic = params.last().is_some_and(|(_, v)| *v);
    let required = if variadic { params.len() - 1 } else { params.len() };
    if (variadic && args.len() < required) || (!variadic && args.len() != required) {
        diags.push(Diagnostic::WrongArgCount {
            span: span.clone(),
            name: name.to_string(),
            expected: required,
            actual: args.len(),
        });
        return;
    }
    for (idx, arg) in args.iter().enumerate() {
        let param = if idx < params.len() { &params[idx].0 } else { &params[params.len() - 1].0 };
        check_expr(module, scope, arg, param, diags);
    }
}

/// Checks a single expression against an expected kind.
fn check_expr(
    module: &Module,
    scope: &Arc<Scope>,
    expr: &ast::Expr,
    expected: &Kind,
    diags: &mut DiagnosticSet,
) {
    match expr {
        ast::Expr::Basic(lit) => {
            if !lit.kind().equals(expected) && !expected.is_option() {
                diags.push(Diagnostic::WrongKind {
                    span: lit.span().clone(),
                    expected: [expected.clone()].into_iter().collect(),
                    found: lit.kind(),
                    defined_at: None,
                });
                return;
            }
            check_interpolations(scope, lit, diags);
        }
        ast::Expr::Ident(ident) => {
            if ident.reference.is_some() {
                // selector value; the target is validated by check_references
                if scope.lookup(&ident.ident.text).is_none() {
                    diags.push(undefined(scope, &ident.ident, None));
                }
                return;
            }
            let filter: KindSet = [expected.clone()].into_iter().collect();
            let Some(object) = scope.lookup(&ident.ident.text) else {
                diags.push(undefined(scope, &ident.ident, Some(&filter)));
                return;
            };
            if !object.value_kind.equals(expected) {
                diags.push(Diagnostic::WrongKind {
                    span: ident.span.clone(),
                    expected: filter,
                    found: object.value_kind.clone(),
                    defined_at: object.defined_at(module),
                });
                return;
            }
            // passing a nullary callable is allowed; anything with parameters
            // must be applied inside a block literal
            if let ObjectNode::Decl(index) = &object.node {
                if let Some(func) = module.func(*index) {
                    if !func.params.is_empty() {
                        diags.push(Diagnostic::FuncArgInCallPosition {
                            span: ident.span.clone(),
                            name: ident.ident.text.clone(),
                        });
                    }
                }
            }
        }
        ast::Expr::FuncLit(lit) => {
            if !lit.kind.kind.equals(expected) {
                diags.push(Diagnostic::WrongKind {
                    span: lit.kind.span.clone(),
                    expected: [expected.clone()].into_iter().collect(),
                    found: lit.kind.kind.clone(),
                    defined_at: None,
                });
                return;
            }
            // a bare `option` literal refines to the expected secondary
            let block_kind =
                if lit.kind.kind.is_option() && lit.kind.kind.secondary().is_none() {
                    expected.clone()
                } else {
                    lit.kind.kind.clone()
                };
            check_block(module, scope, &lit.body, &block_kind, diags);
        }
        ast::Expr::Call(call) => {
            if let Some(found) = check_call_expr(module, scope, call, diags) {
                if !found.equals(expected) {
                    diags.push(Diagnostic::WrongKind {
                        span: call.span.clone(),
                        expected: [expected.clone()].into_iter().collect(),
                        found,
                        defined_at: None,
                    });
                }
            }
        }
    }
}

/// Plain identifiers inside string interpolation must resolve to something.
fn check_interpolations(scope: &Arc<Scope>, lit: &ast::BasicLit, diags: &mut DiagnosticSet) {
    let fragments = match lit {
        ast::BasicLit::Str(string) => &string.fragments,
        ast::BasicLit::Heredoc(heredoc) => &heredoc.fragments,
        _ => return,
    };
    for fragment in fragments {
        if let ast::StringFragment::Interp { expr, .. } = fragment {
            if let ast::Expr::Ident(ident) = expr.as_ref() {
                if ident.reference.is_none() && scope.lookup(&ident.ident.text).is_none() {
                    diags.push(undefined(scope, &ident.ident, None));
                }
            }
        }
    }
}

/// Checks a call in expression position (import expressions, `with` values)
/// and returns the kind it produces when resolvable.
fn check_call_expr(
    module: &Module,
    scope: &Arc<Scope>,
    call: &ast::CallExpr,
    diags: &mut DiagnosticSet,
) -> Option<Kind> {
    let name = &call.name.ident;
    if call.name.reference.is_some() {
        // resolved later, against the imported module's scope
        if scope.lookup(&name.text).is_none() {
            diags.push(undefined(scope, name, None));
        }
        return None;
    }
    let Some(object) = scope.lookup(&name.text) else {
        diags.push(undefined(scope, name, None));
        return None;
    };
    match &object.node {
        ObjectNode::Builtin(builtin) => {
            let sig = builtin.sigs.first()?;
            let _ = call.callee.set(Callee::Builtin(*builtin));
            let params: Vec<(Kind, bool)> =
                sig.params.iter().map(|p| (p.kind.clone(), p.variadic)).collect();
            check_args(module, scope, &call.span, &name.text, &params, &call.args, diags);
            Some(sig.kind.clone())
        }
        ObjectNode::Decl(index) => {
            if let Some(import) = module.import(*index) {
                diags.push(Diagnostic::ImportWithoutReference {
                    span: call.span.clone(),
                    name: name.text.clone(),
                    defined_at: Some(import.span.clone()),
                });
                return None;
            }
            let func = module.func(*index)?;
            let _ = call.callee.set(Callee::Decl(*index));
            let params: Vec<(Kind, bool)> =
                func.params.iter().map(|p| (p.kind.kind.clone(), p.modifier.is_some())).collect();
            check_args(module, scope, &call.span, &name.text, &params, &call.args, diags);
            Some(func.kind.kind.clone())
        }
        ObjectNode::Field { .. } => {
            if !call.args.is_empty() {
                diags.push(Diagnostic::WrongArgCount {
                    span: call.span.clone(),
                    name: name.text.clone(),
                    expected: 0,
                    actual: call.args.len(),
                });
            }
            Some(object.value_kind.clone())
        }
    }
}

/// A `with` expression must produce `option::<callee>`.
fn check_with(
    module: &Module,
    scope: &Arc<Scope>,
    call: &ast::CallStmt,
    callee_name: &str,
    diags: &mut DiagnosticSet,
) {
    let Some(with) = &call.with else { return };
    check_expr(module, scope, &with.expr, &Kind::option_of(callee_name), diags);
}

/// Bind checks: a builtin with side effects must be called, each listed
/// source must name one of its effects, and the bind must sit inside a
/// function body.
fn check_bind(
    call: &ast::CallStmt,
    callee_name: &str,
    sig: Option<&builtin::BuiltinSig>,
    diags: &mut DiagnosticSet,
) {
    let Some(bind) = &call.bind else { return };

    if bind.closure().is_none() {
        diags.push(Diagnostic::NoBindClosure {
            span: bind.span.clone(),
            name: callee_name.to_string(),
        });
    }

    let effects = sig.map(|sig| sig.effects.clone()).filter(|effects| !effects.is_empty());
    let Some(effects) = effects else {
        diags.push(Diagnostic::NoBindEffects {
            span: bind.span.clone(),
            name: callee_name.to_string(),
        });
        return;
    };

    for pair in &bind.list {
        if !effects.iter().any(|field| field.name == pair.source.text) {
            diags.push(Diagnostic::BadBindSource {
                span: pair.source.span.clone(),
                name: callee_name.to_string(),
                source: pair.source.text.clone(),
            });
        }
    }

    let _ = bind.effects.set(effects);
}

/// Resolves every `import.selector` reference to `import_name` against the
/// imported module's scope. Runs after the resolver attached the module.
#[instrument(skip_all, fields(module = module.filename(), import = import_name))]
pub fn check_references(module: &Module, import_name: &str) -> Result<()> {
    let mut diags = DiagnosticSet::new();
    let scope = module.scope().clone();

    let Some(object) = scope.lookup(import_name) else {
        return Ok(());
    };
    let Some(imported) = object.module() else {
        return Err(Error::msg(format!("module for import {import_name} has not been resolved")));
    };

    walk::module_calls(module, &mut |call| {
        let Some(reference) = &call.name.reference else { return };
        if call.name.ident.text != import_name {
            return;
        }
        if let Some((index, func)) =
            resolve_selector(&imported, import_name, reference, &mut diags)
        {
            let _ = call.callee.set(Callee::Imported { module: imported.clone(), index });
            let params: Vec<(Kind, bool)> =
                func.params.iter().map(|p| (p.kind.kind.clone(), p.modifier.is_some())).collect();
            // argument identifiers resolve in the calling module's scope
            check_args(module, &scope, &call.name.span, &reference.text, &params, &call.args, &mut diags);
        }
    });

    walk::module_exprs(module, &mut |expr| {
        let ast::Expr::Call(call) = expr else { return };
        let Some(reference) = &call.name.reference else { return };
        if call.name.ident.text != import_name {
            return;
        }
        if let Some((index, func)) =
            resolve_selector(&imported, import_name, reference, &mut diags)
        {
            let _ = call.callee.set(Callee::Imported { module: imported.clone(), index });
            let params: Vec<(Kind, bool)> =
                func.params.iter().map(|p| (p.kind.kind.clone(), p.modifier.is_some())).collect();
            check_args(module, &scope, &call.span, &reference.text, &params, &call.args, &mut diags);
        }
    });

    diags.into_result()
}

fn resolve_selector<'a>(
    imported: &'a Arc<Module>,
    import_name: &str,
    reference: &ast::Ident,
    diags: &mut DiagnosticSet,
) -> Option<(usize, &'a ast::FuncDecl)> {
    let Some(target) = imported.scope().lookup(&reference.text) else {
        diags.push(Diagnostic::UndefinedIdent {
            span: reference.span.clone(),
            name: reference.text.clone(),
            suggestion: imported.scope().suggestion(&reference.text, None),
        });
        return None;
    };
    if !target.exported() {
        diags.push(Diagnostic::NotExported {
            span: reference.span.clone(),
            name: reference.text.clone(),
            import: import_name.to_string(),
        });
        return None;
    }
    match &target.node {
        ObjectNode::Decl(index) => imported.func(*index).map(|func| (*index, func)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{parser, Context};

    fn check_src(src: &str) -> std::result::Result<(), DiagnosticSet> {
        let ctx = Context::default();
        let module = parser::parse_str(&ctx, src, Default::default()).unwrap();
        let run = |result: Result<()>| match result {
            Ok(()) => Ok(()),
            Err(Error::Diagnostics(set)) => Err(set),
            Err(err) => panic!("unexpected error: {err}"),
        };
        run(semantic_pass(&module))?;
        run(check(&module))
    }

    #[test]
    fn multiple_sources_check_clean() {
        check_src("fs default() { image \"alpine\"; image \"busybox\" }").unwrap();
    }

    #[test]
    fn wrong_arity_on_builtin() {
        let diags = check_src("fs default() { image }").unwrap_err();
        assert_eq!(diags.len(), 1);
        assert!(matches!(
            diags.iter().next().unwrap(),
            Diagnostic::WrongArgCount { expected: 1, actual: 0, .. }
        ));
    }

    #[test]
    fn empty_non_option_body_is_legal() {
        check_src("fs noop() {}").unwrap();
    }

    #[test]
    fn duplicate_declarations() {
        let diags =
            check_src("fs duplicate(string ref) {}\n\nfs duplicate(string ref) { image ref }")
                .unwrap_err();
        let Diagnostic::DuplicateDecl { defined_at, .. } = diags.iter().next().unwrap() else {
            panic!("expected duplicate decl, got {diags}");
        };
        assert!(defined_at.is_some());
    }

    #[test]
    fn import_called_without_reference() {
        let diags =
            check_src("import foo from \"./foo.hlb\"\n\nfs default() { foo }").unwrap_err();
        let Diagnostic::ImportWithoutReference { defined_at, .. } = diags.iter().next().unwrap()
        else {
            panic!("expected import-without-reference, got {diags}");
        };
        assert!(defined_at.is_some());
    }

    #[test]
    fn bind_without_effects() {
        let diags = check_src("fs default() { run \"cmd\" as nothing }").unwrap_err();
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::NoBindEffects { name, .. } if name == "run")));
    }

    #[test]
    fn bind_registers_module_level_target() {
        check_src(
            "fs default() {\n\trun \"make\" with option::run {\n\t\tmount fs { scratch; } \"/src\" as src\n\t}\n}\n\nfs uses() { src }",
        )
        .unwrap();
    }

    #[test]
    fn bind_bad_source() {
        let diags = check_src(
            "fs default() {\n\trun \"make\" with option::run {\n\t\tmount fs { scratch; } \"/src\" as (missing dest)\n\t}\n}",
        )
        .unwrap_err();
        assert!(diags
            .iter()
            .any(|d| matches!(d, Diagnostic::BadBindSource { source, .. } if source == "missing")));
    }

    #[test]
    fn undefined_identifier_with_suggestion() {
        let diags = check_src("fs default() { imgae \"alpine\" }").unwrap_err();
        let Diagnostic::UndefinedIdent { suggestion, .. } = diags.iter().next().unwrap() else {
            panic!("expected undefined ident, got {diags}");
        };
        assert_eq!(suggestion.as_deref(), Some("image"));
    }

    #[test]
    fn builtin_in_wrong_block_kind() {
        let diags = check_src("string greeting() { image \"alpine\" }").unwrap_err();
        let Diagnostic::WrongKind { expected, found, .. } = diags.iter().next().unwrap() else {
            panic!("expected wrong kind, got {diags}");
        };
        assert_eq!(found, &Kind::string());
        assert!(expected.contains(&Kind::fs()));
    }

    #[test]
    fn user_function_call_checks_args() {
        check_src(
            "fs base(string ref) { image ref }\n\nfs default() { base \"alpine\" }",
        )
        .unwrap();
        let diags =
            check_src("fs base(string ref) { image ref }\n\nfs default() { base 42 }").unwrap_err();
        assert!(matches!(diags.iter().next().unwrap(), Diagnostic::WrongKind { .. }));
    }

    #[test]
    fn func_with_params_as_value_is_rejected() {
        let diags = check_src(
            "fs base(string ref) { image ref }\n\nfs default() { copy base \"/a\" \"/b\" }",
        )
        .unwrap_err();
        assert!(matches!(diags.iter().next().unwrap(), Diagnostic::FuncArgInCallPosition { .. }));
    }

    #[test]
    fn nullary_func_as_value_is_allowed() {
        check_src("fs base() { image \"alpine\" }\n\nfs default() { copy base \"/a\" \"/b\" }")
            .unwrap();
    }

    #[test]
    fn with_clause_kind_must_match_callee() {
        check_src("fs default() { image \"alpine\" with option::image { resolve; } }").unwrap();
        let diags = check_src("fs default() { image \"alpine\" with option::run { ssh; } }")
            .unwrap_err();
        assert!(matches!(diags.iter().next().unwrap(), Diagnostic::WrongKind { .. }));
    }

    #[test]
    fn bare_option_literal_refines_to_callee() {
        check_src("fs default() { image \"alpine\" with option { resolve; } }").unwrap();
    }

    #[test]
    fn variadic_accepts_any_trailing_count() {
        check_src("fs default() { run \"a\" \"b\" \"c\" }").unwrap();
        check_src("fs default() { run }").unwrap();
        let diags = check_src(
            "fs default() { copy scratchy }",
        )
        .unwrap_err();
        assert!(!diags.is_empty());
    }

    #[test]
    fn check_is_idempotent() {
        let ctx = Context::default();
        let module = parser::parse_str(
            &ctx,
            "fs default() { image }",
            Default::default(),
        )
        .unwrap();
        semantic_pass(&module).unwrap();
        let first = match check(&module) {
            Err(Error::Diagnostics(set)) => set,
            other => panic!("expected diagnostics, got {other:?}"),
        };
        let second = match check(&module) {
            Err(Error::Diagnostics(set)) => set,
            other => panic!("expected diagnostics, got {other:?}"),
        };
        assert_eq!(first, second);
    }

    #[test]
    fn funcs_have_scopes_after_semantic_pass() {
        let ctx = Context::default();
        let module = parser::parse_str(
            &ctx,
            "fs a() {}\n\nfs b(string x) { image x }",
            Default::default(),
        )
        .unwrap();
        semantic_pass(&module).unwrap();
        for (_, func) in module.funcs() {
            let scope = func.scope().expect("scope set");
            assert_eq!(scope.level, ScopeLevel::Function);
            assert_eq!(scope.root().level, ScopeLevel::Builtin);
        }
    }

    #[test]
    fn callee_resolved_after_check() {
        let ctx = Context::default();
        let module = parser::parse_str(&ctx, "fs default() { image \"alpine\" }", Default::default())
            .unwrap();
        semantic_pass(&module).unwrap();
        check(&module).unwrap();
        let (_, func) = module.funcs().next().unwrap();
        let call = func.body.as_ref().unwrap().call_stmts().next().unwrap();
        assert!(matches!(call.callee(), Some(Callee::Builtin(b)) if b.name == "image"));
    }
}
