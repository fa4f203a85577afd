use crate::{
    ast::{DeclIndex, Module},
    builtin::Builtin,
    kind::{Kind, KindSet},
    sources::Span,
};
use std::{
    collections::BTreeMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
};

/// How deeply nested a scope is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScopeLevel {
    Builtin,
    Module,
    Function,
    Arguments,
}

/// What an [`Object`] stands for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ObjectKind {
    Decl,
    Field,
    Builtin,
}

/// The syntax an object points back at.
///
/// Declarations are referenced by index so the scope graph holds no owning
/// back-pointers into the tree; the module is the owner.
#[derive(Clone, Debug)]
pub enum ObjectNode {
    /// A top-level declaration of the owning module.
    Decl(DeclIndex),
    /// A parameter, effect, or bind target.
    Field { span: Span },
    Builtin(&'static Builtin),
}

/// A named entity visible in some scope.
#[derive(Debug)]
pub struct Object {
    pub kind: ObjectKind,
    pub ident: String,
    /// The kind the object's value checks against.
    pub value_kind: Kind,
    pub node: ObjectNode,
    exported: AtomicBool,
    /// Resolver attachment slot; holds the imported module once loaded.
    data: RwLock<Option<Arc<Module>>>,
}

impl Object {
    pub fn new(kind: ObjectKind, ident: impl Into<String>, value_kind: Kind, node: ObjectNode) -> Self {
        Self {
            kind,
            ident: ident.into(),
            value_kind,
            node,
            exported: AtomicBool::new(false),
            data: RwLock::new(None),
        }
    }

    pub fn exported(&self) -> bool {
        self.exported.load(Ordering::Acquire)
    }

    pub fn set_exported(&self) {
        self.exported.store(true, Ordering::Release);
    }

    pub fn module(&self) -> Option<Arc<Module>> {
        self.data.read().expect("object data poisoned").clone()
    }

    /// Attaches the resolved module. Called from the resolving task; readers
    /// only run after the store (`check_references` ordering).
    pub fn attach_module(&self, module: Arc<Module>) {
        *self.data.write().expect("object data poisoned") = Some(module);
    }

    /// The span of the defining syntax, for "defined at" diagnostics.
    pub fn defined_at(&self, module: &Module) -> Option<Span> {
        match &self.node {
            ObjectNode::Decl(index) => module.decls.get(*index).map(|d| d.span().clone()),
            ObjectNode::Field { span } => Some(span.clone()),
            ObjectNode::Builtin(_) => None,
        }
    }
}

/// A lexical scope with an outer chain terminating at the shared builtin
/// scope.
#[derive(Debug)]
pub struct Scope {
    pub level: ScopeLevel,
    outer: Option<Arc<Scope>>,
    objects: RwLock<BTreeMap<String, Arc<Object>>>,
}

impl Scope {
    pub fn new(level: ScopeLevel, outer: Option<Arc<Scope>>) -> Arc<Self> {
        Arc::new(Self { level, outer, objects: RwLock::new(BTreeMap::new()) })
    }

    /// Stores an object by its identifier text. Last write wins; duplicate
    /// detection happens upstream in the semantic pass.
    pub fn insert(&self, object: Arc<Object>) {
        self.objects.write().expect("scope poisoned").insert(object.ident.clone(), object);
    }

    /// Looks `name` up here, then walks outward.
    pub fn lookup(&self, name: &str) -> Option<Arc<Object>> {
        if let Some(object) = self.lookup_local(name) {
            return Some(object);
        }
        self.outer.as_ref()?.lookup(name)
    }

    /// Looks `name` up in this scope only, without walking outward. Used by
    /// duplicate detection, where shadowing an outer (or builtin) name is
    /// legal but redefining a local one is not.
    pub fn lookup_local(&self, name: &str) -> Option<Arc<Object>> {
        self.objects.read().expect("scope poisoned").get(name).cloned()
    }

    /// The nearest enclosing scope of `level`, including this one.
    pub fn enclosing(self: &Arc<Self>, level: ScopeLevel) -> Option<Arc<Scope>> {
        let mut current = Some(self.clone());
        while let Some(scope) = current {
            if scope.level == level {
                return Some(scope);
            }
            current = scope.outer.clone();
        }
        None
    }

    /// The outermost scope of the chain.
    pub fn root(self: &Arc<Self>) -> Arc<Scope> {
        let mut current = self.clone();
        while let Some(outer) = current.outer.clone() {
            current = outer;
        }
        current
    }

    /// All identifiers visible from here outward, optionally filtered by
    /// kind, sorted and deduplicated (inner shadows outer).
    pub fn identifiers(&self, filter: Option<&KindSet>) -> Vec<String> {
        let mut out = BTreeMap::new();
        self.collect(&mut out);
        out.into_iter()
            .filter(|(_, object)| match filter {
                Some(kinds) => kinds.contains(&object.value_kind),
                None => true,
            })
            .map(|(name, _)| name)
            .collect()
    }

    /// All visible objects sorted by name.
    pub fn defined(&self) -> Vec<Arc<Object>> {
        let mut out = BTreeMap::new();
        self.collect(&mut out);
        out.into_values().collect()
    }

    fn collect(&self, out: &mut BTreeMap<String, Arc<Object>>) {
        // outer first so inner definitions shadow them
        if let Some(outer) = &self.outer {
            outer.collect(out);
        }
        for (name, object) in self.objects.read().expect("scope poisoned").iter() {
            out.insert(name.clone(), object.clone());
        }
    }

    /// A best-effort "did you mean" candidate for an unresolved identifier,
    /// drawn from the visible identifiers of matching kind.
    pub fn suggestion(&self, name: &str, filter: Option<&KindSet>) -> Option<String> {
        self.identifiers(filter)
            .into_iter()
            .map(|candidate| {
                let score = strsim::jaro_winkler(name, &candidate);
                (candidate, score)
            })
            .filter(|(_, score)| *score > 0.8)
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(candidate, _)| candidate)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} scope ({} objects)", self.level, self.objects.read().expect("scope poisoned").len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(name: &str, kind: Kind) -> Arc<Object> {
        Arc::new(Object::new(ObjectKind::Field, name, kind, ObjectNode::Field { span: Span::default() }))
    }

    #[test]
    fn lookup_walks_outward() {
        let outer = Scope::new(ScopeLevel::Module, None);
        outer.insert(field("build", Kind::fs()));
        let inner = Scope::new(ScopeLevel::Function, Some(outer.clone()));
        inner.insert(field("ref", Kind::string()));

        assert!(inner.lookup("ref").is_some());
        assert!(inner.lookup("build").is_some());
        assert!(inner.lookup("missing").is_none());
        assert!(outer.lookup("ref").is_none());
    }

    #[test]
    fn shadowing_and_sorted_identifiers() {
        let outer = Scope::new(ScopeLevel::Module, None);
        outer.insert(field("target", Kind::fs()));
        outer.insert(field("alpha", Kind::string()));
        let inner = Scope::new(ScopeLevel::Function, Some(outer.clone()));
        inner.insert(field("target", Kind::string()));

        assert_eq!(inner.identifiers(None), vec!["alpha".to_string(), "target".to_string()]);
        let strings: KindSet = [Kind::string()].into_iter().collect();
        // inner `target` shadows the fs one, so it passes the string filter
        assert_eq!(inner.identifiers(Some(&strings)), vec!["alpha".to_string(), "target".to_string()]);
    }

    #[test]
    fn enclosing_and_root() {
        let module = Scope::new(ScopeLevel::Module, None);
        let function = Scope::new(ScopeLevel::Function, Some(module.clone()));
        let args = Scope::new(ScopeLevel::Arguments, Some(function.clone()));

        assert_eq!(args.enclosing(ScopeLevel::Function).unwrap().level, ScopeLevel::Function);
        assert_eq!(args.root().level, ScopeLevel::Module);
        assert!(args.enclosing(ScopeLevel::Builtin).is_none());
    }

    #[test]
    fn suggestion_finds_close_match() {
        let scope = Scope::new(ScopeLevel::Module, None);
        scope.insert(field("image", Kind::fs()));
        scope.insert(field("mkfile", Kind::fs()));
        assert_eq!(scope.suggestion("imgae", None), Some("image".to_string()));
        assert_eq!(scope.suggestion("zzz", None), None);
    }
}
