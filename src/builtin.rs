//! Builtin declarations injected into every root scope.
//!
//! One identifier may carry several signatures indexed by kind: `env` exists
//! as a filesystem operation and as an `option::run` field, `mount` only as
//! an `option::run` field with a bind effect.

use crate::{
    kind::{Kind, KindSet},
    scope::{Object, ObjectKind, ObjectNode, Scope, ScopeLevel},
};
use once_cell::sync::Lazy;
use std::{collections::HashMap, sync::Arc};

/// A parameter or side-effect field of a builtin signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSig {
    pub kind: Kind,
    pub name: String,
    pub variadic: bool,
}

impl FieldSig {
    fn new(kind: Kind, name: &str) -> Self {
        Self { kind, name: name.to_string(), variadic: false }
    }

    fn variadic(kind: Kind, name: &str) -> Self {
        Self { kind, name: name.to_string(), variadic: true }
    }
}

/// One signature of a builtin, for one kind.
#[derive(Debug)]
pub struct BuiltinSig {
    /// The kind of block the builtin is callable in.
    pub kind: Kind,
    pub params: Vec<FieldSig>,
    /// Side-effect fields addressable by `as` binds.
    pub effects: Arc<Vec<FieldSig>>,
}

impl BuiltinSig {
    /// Whether the last parameter is variadic.
    pub fn variadic(&self) -> Option<&FieldSig> {
        self.params.last().filter(|p| p.variadic)
    }
}

/// A builtin identifier with all its signatures.
#[derive(Debug)]
pub struct Builtin {
    pub name: String,
    pub sigs: Vec<BuiltinSig>,
}

impl Builtin {
    /// The signature matching `kind`, applying the option relaxation.
    pub fn sig_for(&self, kind: &Kind) -> Option<&BuiltinSig> {
        self.sigs.iter().find(|sig| sig.kind.equals(kind))
    }

    /// Every kind this builtin is callable in.
    pub fn kinds(&self) -> KindSet {
        self.sigs.iter().map(|sig| sig.kind.clone()).collect()
    }

    /// The first signature declaring side effects, if any.
    pub fn effects(&self) -> Option<&Arc<Vec<FieldSig>>> {
        self.sigs.iter().map(|sig| &sig.effects).find(|effects| !effects.is_empty())
    }
}

struct Catalogue {
    by_name: HashMap<String, Builtin>,
}

impl Catalogue {
    fn add(&mut self, name: &str, kind: Kind, params: Vec<FieldSig>) {
        self.add_with_effects(name, kind, params, Vec::new());
    }

    fn add_with_effects(&mut self, name: &str, kind: Kind, params: Vec<FieldSig>, effects: Vec<FieldSig>) {
        let sig = BuiltinSig { kind, params, effects: Arc::new(effects) };
        self.by_name
            .entry(name.to_string())
            .or_insert_with(|| Builtin { name: name.to_string(), sigs: Vec::new() })
            .sigs
            .push(sig);
    }
}

static CATALOGUE: Lazy<Catalogue> = Lazy::new(|| {
    use FieldSig as F;
    let mut c = Catalogue { by_name: HashMap::new() };

    // filesystem sources and operations
    c.add("image", Kind::fs(), vec![F::new(Kind::string(), "ref")]);
    c.add("http", Kind::fs(), vec![F::new(Kind::string(), "url")]);
    c.add("git", Kind::fs(), vec![F::new(Kind::string(), "remote"), F::new(Kind::string(), "ref")]);
    c.add("local", Kind::fs(), vec![F::new(Kind::string(), "path")]);
    c.add("scratch", Kind::fs(), vec![]);
    c.add("run", Kind::fs(), vec![F::variadic(Kind::string(), "arg")]);
    c.add("env", Kind::fs(), vec![F::new(Kind::string(), "key"), F::new(Kind::string(), "value")]);
    c.add("dir", Kind::fs(), vec![F::new(Kind::string(), "path")]);
    c.add("user", Kind::fs(), vec![F::new(Kind::string(), "name")]);
    c.add("mkdir", Kind::fs(), vec![F::new(Kind::string(), "path"), F::new(Kind::int(), "filemode")]);
    c.add(
        "mkfile",
        Kind::fs(),
        vec![
            F::new(Kind::string(), "path"),
            F::new(Kind::int(), "filemode"),
            F::new(Kind::string(), "content"),
        ],
    );
    c.add("rm", Kind::fs(), vec![F::new(Kind::string(), "path")]);
    c.add(
        "copy",
        Kind::fs(),
        vec![
            F::new(Kind::fs(), "input"),
            F::new(Kind::string(), "src"),
            F::new(Kind::string(), "dest"),
        ],
    );

    // strings
    c.add(
        "format",
        Kind::string(),
        vec![F::new(Kind::string(), "format"), F::variadic(Kind::string(), "values")],
    );

    // pipelines
    c.add("stage", Kind::pipeline(), vec![F::variadic(Kind::fs(), "input")]);

    // option::image
    c.add("resolve", Kind::option_of("image"), vec![]);

    // option::http
    c.add("checksum", Kind::option_of("http"), vec![F::new(Kind::string(), "digest")]);
    c.add("chmod", Kind::option_of("http"), vec![F::new(Kind::int(), "filemode")]);
    c.add("filename", Kind::option_of("http"), vec![F::new(Kind::string(), "name")]);

    // option::git
    c.add("keepGitDir", Kind::option_of("git"), vec![]);

    // option::local
    c.add(
        "includePatterns",
        Kind::option_of("local"),
        vec![F::variadic(Kind::string(), "pattern")],
    );
    c.add(
        "excludePatterns",
        Kind::option_of("local"),
        vec![F::variadic(Kind::string(), "pattern")],
    );
    c.add("followPaths", Kind::option_of("local"), vec![F::variadic(Kind::string(), "path")]);

    // option::run
    c.add("readonlyRootfs", Kind::option_of("run"), vec![]);
    c.add(
        "env",
        Kind::option_of("run"),
        vec![F::new(Kind::string(), "key"), F::new(Kind::string(), "value")],
    );
    c.add("dir", Kind::option_of("run"), vec![F::new(Kind::string(), "path")]);
    c.add("user", Kind::option_of("run"), vec![F::new(Kind::string(), "name")]);
    c.add("network", Kind::option_of("run"), vec![F::new(Kind::string(), "mode")]);
    c.add("security", Kind::option_of("run"), vec![F::new(Kind::string(), "mode")]);
    c.add(
        "host",
        Kind::option_of("run"),
        vec![F::new(Kind::string(), "name"), F::new(Kind::string(), "address")],
    );
    c.add("ssh", Kind::option_of("run"), vec![]);
    c.add(
        "secret",
        Kind::option_of("run"),
        vec![F::new(Kind::string(), "localPath"), F::new(Kind::string(), "mountPoint")],
    );
    c.add_with_effects(
        "mount",
        Kind::option_of("run"),
        vec![F::new(Kind::fs(), "input"), F::new(Kind::string(), "mountPoint")],
        vec![F::new(Kind::fs(), "target")],
    );

    // option::ssh
    c.add("target", Kind::option_of("ssh"), vec![F::new(Kind::string(), "path")]);
    c.add("id", Kind::option_of("ssh"), vec![F::new(Kind::string(), "cacheid")]);

    // option::secret
    c.add("uid", Kind::option_of("secret"), vec![F::new(Kind::int(), "id")]);
    c.add("gid", Kind::option_of("secret"), vec![F::new(Kind::int(), "id")]);

    // option::mount
    c.add("readonly", Kind::option_of("mount"), vec![]);
    c.add("tmpfs", Kind::option_of("mount"), vec![]);
    c.add("sourcePath", Kind::option_of("mount"), vec![F::new(Kind::string(), "path")]);
    c.add(
        "cache",
        Kind::option_of("mount"),
        vec![F::new(Kind::string(), "cacheid"), F::new(Kind::string(), "sharingMode")],
    );

    // option::mkdir / option::mkfile
    c.add("createParents", Kind::option_of("mkdir"), vec![]);
    c.add("chown", Kind::option_of("mkdir"), vec![F::new(Kind::string(), "owner")]);
    c.add("createdTime", Kind::option_of("mkdir"), vec![F::new(Kind::string(), "created")]);
    c.add("chown", Kind::option_of("mkfile"), vec![F::new(Kind::string(), "owner")]);
    c.add("createdTime", Kind::option_of("mkfile"), vec![F::new(Kind::string(), "created")]);

    // option::rm
    c.add("allowNotFound", Kind::option_of("rm"), vec![]);
    c.add("allowWildcard", Kind::option_of("rm"), vec![]);

    // option::copy
    c.add("followSymlinks", Kind::option_of("copy"), vec![]);
    c.add("contentsOnly", Kind::option_of("copy"), vec![]);
    c.add("unpack", Kind::option_of("copy"), vec![]);
    c.add("createDestPath", Kind::option_of("copy"), vec![]);
    c.add("chown", Kind::option_of("copy"), vec![F::new(Kind::string(), "owner")]);
    c.add("chmod", Kind::option_of("copy"), vec![F::new(Kind::int(), "filemode")]);

    c
});

/// The shared scope every module scope chains up to.
static ROOT_SCOPE: Lazy<Arc<Scope>> = Lazy::new(|| {
    let scope = Scope::new(ScopeLevel::Builtin, None);
    for builtin in CATALOGUE.by_name.values() {
        let value_kind = builtin.sigs.first().map(|sig| sig.kind.clone()).unwrap_or_default();
        scope.insert(Arc::new(Object::new(
            ObjectKind::Builtin,
            builtin.name.clone(),
            value_kind,
            ObjectNode::Builtin(builtin),
        )));
    }
    scope
});

/// Looks a builtin up by identifier.
pub fn lookup(name: &str) -> Option<&'static Builtin> {
    CATALOGUE.by_name.get(name)
}

/// The shared builtin scope.
pub fn root_scope() -> Arc<Scope> {
    ROOT_SCOPE.clone()
}
