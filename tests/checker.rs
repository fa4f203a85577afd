//! End-to-end checker scenarios driven through the public surface.

use hlb::{
    diagnostics::{Diagnostic, DiagnosticSet, Severity},
    error::Error,
    Context, ParseOptions,
};
use pretty_assertions::assert_eq;

fn check_file(src: &str) -> Result<(), DiagnosticSet> {
    let ctx = Context::default();
    let module = hlb::parse_str(&ctx, src, ParseOptions::with_filename("test.hlb")).unwrap();
    let unwrap_diags = |result: Result<(), Error>| match result {
        Ok(()) => Ok(()),
        Err(Error::Diagnostics(set)) => Err(set),
        Err(err) => panic!("unexpected error: {err}"),
    };
    unwrap_diags(hlb::semantic_pass(&module))?;
    unwrap_diags(hlb::check(&module))
}

#[test]
fn successful_check_multiple_sources() {
    check_file("fs default() { image \"alpine\"; image \"busybox\" }").unwrap();
}

#[test]
fn wrong_arity_expected_one_actual_zero() {
    let diags = check_file("fs default() { image }").unwrap_err();
    assert_eq!(diags.len(), 1);
    let Diagnostic::WrongArgCount { expected, actual, name, span } = diags.iter().next().unwrap()
    else {
        panic!("expected wrong-argument-count, got {diags}");
    };
    assert_eq!((name.as_str(), *expected, *actual), ("image", 1, 0));
    assert_eq!(span.start.line, 1);
    assert_eq!(span.filename(), "test.hlb");
}

#[test]
fn duplicate_declarations_name_both_spans() {
    let diags = check_file("fs duplicate(string ref) {}\nfs duplicate(string ref) { image ref }")
        .unwrap_err();
    let Diagnostic::DuplicateDecl { span, defined_at, name } = diags.iter().next().unwrap() else {
        panic!("expected duplicate-decl, got {diags}");
    };
    assert_eq!(name, "duplicate");
    assert_eq!(span.start.line, 2);
    let defined_at = defined_at.as_ref().expect("defined-at span");
    assert_eq!(defined_at.start.line, 1);
}

#[test]
fn call_import_without_selector() {
    let diags = check_file("import foo from \"./foo.hlb\"\n\nfs default() { foo }").unwrap_err();
    let Diagnostic::ImportWithoutReference { span, defined_at, name } =
        diags.iter().next().unwrap()
    else {
        panic!("expected use-of-module-without-reference, got {diags}");
    };
    assert_eq!(name, "foo");
    // the call site is the primary span, the import declaration the secondary
    assert_eq!(span.start.line, 3);
    assert_eq!(defined_at.as_ref().unwrap().start.line, 1);
}

#[test]
fn bind_without_effects() {
    let diags = check_file("fs default() { run \"cmd\" as nothing }").unwrap_err();
    assert!(diags
        .iter()
        .any(|d| matches!(d, Diagnostic::NoBindEffects { name, .. } if name == "run")));
}

#[test]
fn bind_with_effects_is_clean() {
    check_file(
        "fs default() {\n\trun \"make\" with option::run {\n\t\tmount fs { local \".\" } \"/src\" as sourceMount\n\t}\n\tcopy sourceMount \"/src\" \"/dst\"\n}",
    )
    .unwrap();
}

#[test]
fn bind_outside_function_has_no_closure() {
    let diags = check_file(
        "import x from fs { run \"make\" with option::run { mount fs { scratch; } \"/m\" as leaked } }",
    )
    .unwrap_err();
    assert!(diags.iter().any(|d| matches!(d, Diagnostic::NoBindClosure { .. })));
}

#[test]
fn input_without_terminal_newline_parses() {
    check_file("fs default() { image \"alpine\" }").unwrap();
}

#[test]
fn empty_option_block_checks() {
    check_file("option::run opts() {}\n\nfs default() { run \"make\" with opts }").unwrap();
}

#[test]
fn errors_sort_by_position() {
    let diags = check_file("fs a() { image }\n\nfs b() { image }\n\nfs c() { undefinedthing }")
        .unwrap_err();
    let lines: Vec<usize> = diags.iter().map(|d| d.span().start.line).collect();
    let mut sorted = lines.clone();
    sorted.sort_unstable();
    assert_eq!(lines, sorted);
    assert_eq!(diags.len(), 3);
}

#[test]
fn parse_errors_surface_with_semantic_errors() {
    let ctx = Context::default();
    let module = hlb::parse_str(
        &ctx,
        "fs broken( {\n}\n\nfs good() { image }",
        ParseOptions::with_filename("test.hlb"),
    )
    .unwrap();
    let Err(Error::Diagnostics(wave1)) = hlb::semantic_pass(&module) else {
        panic!("expected bad-parse diagnostics");
    };
    assert!(wave1.iter().any(|d| matches!(d, Diagnostic::BadParse { .. })));
    // the malformed declaration does not stop checking of later ones
    let Err(Error::Diagnostics(wave2)) = hlb::check(&module) else {
        panic!("expected arity diagnostics");
    };
    assert!(wave2.iter().any(|d| matches!(d, Diagnostic::WrongArgCount { .. })));
}

#[test]
fn deprecations_are_warnings_and_rewrites_apply() {
    let ctx = Context::default();
    let mut module = hlb::parse_str(
        &ctx,
        "group all() {\n\tparallel build\n}\n\nfs build() { image \"alpine\" }",
        ParseOptions::with_filename("test.hlb"),
    )
    .unwrap();
    hlb::semantic_pass(&module).unwrap();
    let Err(Error::Diagnostics(warnings)) =
        hlb::lint(&ctx, &mut module, hlb::LintOptions::default())
    else {
        panic!("expected deprecation warnings");
    };
    assert!(warnings.iter().all(|d| d.severity() == Severity::Warning));
    assert!(!warnings.has_errors());
    // the rewrites took effect: the modern forms now check cleanly
    hlb::check(&module).unwrap();
    assert!(module.to_string().contains("pipeline all()"));
    assert!(module.to_string().contains("stage build"));
}

#[test]
fn exports_mark_objects_and_catch_unknowns() {
    check_file("export build\n\nfs build() { image \"alpine\" }").unwrap();
    let diags = check_file("export missing").unwrap_err();
    assert!(matches!(diags.iter().next().unwrap(), Diagnostic::UndefinedIdent { .. }));
}

#[test]
fn string_interpolation_resolves_identifiers() {
    check_file("fs greet(string name) { run \"echo ${name}\" }").unwrap();
    let diags = check_file("fs greet() { run \"echo ${name}\" }").unwrap_err();
    assert!(matches!(diags.iter().next().unwrap(), Diagnostic::UndefinedIdent { .. }));
}

#[test]
fn heredoc_argument_checks_as_string() {
    check_file("fs default() {\n\trun <<~EOF\n\tapk add --no-cache curl\n\tEOF\n}").unwrap();
}

#[test]
fn pipeline_stage_accepts_fs_references() {
    check_file(
        "fs build() { image \"alpine\" }\n\nfs test() { image \"busybox\" }\n\npipeline all() {\n\tstage build test\n}",
    )
    .unwrap();
}
