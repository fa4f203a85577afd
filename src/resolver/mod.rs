//! Import-graph resolution.
//!
//! [`resolve_graph`] traverses a module's imports concurrently: every import
//! evaluates its expression to a register, resolves the module source it
//! denotes (a local file for string registers, a vendored or remotely built
//! directory for filesystem registers), parses and checks it, invokes the
//! caller's visitor, attaches the module to the import's object, resolves
//! the parent's selector references, and recurses.

use crate::{
    ast, checker,
    codegen::{CodeGenerator, Digest, Filesystem, Register},
    diagnostics::{Diagnostic, DiagnosticSet},
    error::{Error, IoError, Result},
    linter::{self, LintOptions},
    parser::{self, ParseOptions},
    scope::ObjectNode,
    Context,
};
use futures::future::{BoxFuture, FutureExt};
use std::{
    fmt,
    path::{Path, PathBuf},
    sync::Arc,
};

pub mod vendor;

pub use vendor::{modules_root, vendor_path, MODULE_FILENAME};

/// Metadata about a file inside a [`Directory`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
}

/// A resolved module source: a directory the module file can be opened from.
///
/// Remote directories are backed by a live build reference which must stay
/// alive for the lifetime of the directory; closing the directory releases
/// it, cancelling the underlying build.
pub trait Directory: Send + Sync + fmt::Debug {
    fn path(&self) -> &Path;

    /// The content digest for vendored or remote directories.
    fn digest(&self) -> Option<&Digest> {
        None
    }

    fn open<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;

    fn stat<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<FileStat>>;

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

/// A directory on the local filesystem.
#[derive(Debug)]
pub struct LocalDirectory {
    path: PathBuf,
    digest: Option<Digest>,
}

impl LocalDirectory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), digest: None }
    }

    /// A vendored directory: local content addressed by a digest.
    pub fn vendored(path: impl Into<PathBuf>, digest: Digest) -> Self {
        Self { path: path.into(), digest: Some(digest) }
    }
}

impl Directory for LocalDirectory {
    fn path(&self) -> &Path {
        &self.path
    }

    fn digest(&self) -> Option<&Digest> {
        self.digest.as_ref()
    }

    fn open<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        async move {
            let path = self.path.join(filename);
            tokio::fs::read(&path).await.map_err(|err| IoError::new(err, &path).into())
        }
        .boxed()
    }

    fn stat<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<FileStat>> {
        async move {
            let path = self.path.join(filename);
            let meta =
                tokio::fs::metadata(&path).await.map_err(|err| IoError::new(err, &path))?;
            Ok(FileStat { size: meta.len() })
        }
        .boxed()
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        async { Ok(()) }.boxed()
    }
}

/// A gateway reference returned by the build engine for a solved filesystem.
pub trait Reference: Send + Sync + fmt::Debug {
    fn read_file<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Vec<u8>>>;

    fn stat_file<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<FileStat>>;

    /// Releases the reference, cancelling the build it keeps alive.
    fn release<'a>(&'a self) -> BoxFuture<'a, Result<()>>;
}

/// The external build engine the remote resolver submits filesystems to.
pub trait BuildClient: Send + Sync {
    fn solve<'a>(
        &'a self,
        ctx: &'a Context,
        fs: &'a Filesystem,
    ) -> BoxFuture<'a, Result<Box<dyn Reference>>>;
}

/// A directory backed by a build-engine reference.
#[derive(Debug)]
pub struct RemoteDirectory {
    path: PathBuf,
    digest: Digest,
    reference: Box<dyn Reference>,
}

impl RemoteDirectory {
    pub fn new(digest: Digest, reference: Box<dyn Reference>) -> Self {
        Self { path: PathBuf::from(digest.to_string()), digest, reference }
    }
}

impl Directory for RemoteDirectory {
    fn path(&self) -> &Path {
        &self.path
    }

    fn digest(&self) -> Option<&Digest> {
        Some(&self.digest)
    }

    fn open<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<Vec<u8>>> {
        self.reference.read_file(filename)
    }

    fn stat<'a>(&'a self, filename: &'a str) -> BoxFuture<'a, Result<FileStat>> {
        self.reference.stat_file(filename)
    }

    fn close<'a>(&'a self) -> BoxFuture<'a, Result<()>> {
        self.reference.release()
    }
}

/// Resolves a filesystem-valued import to a [`Directory`].
pub trait Resolver: Send + Sync {
    fn resolve<'a>(
        &'a self,
        ctx: &'a Context,
        client: &'a dyn BuildClient,
        parent: &'a ast::Module,
        decl: &'a ast::ImportDecl,
        fs: &'a Filesystem,
    ) -> BoxFuture<'a, Result<Arc<dyn Directory>>>;
}

/// Requires every filesystem import to be present in the vendor directory.
#[derive(Debug, Clone)]
pub struct VendorResolver {
    root: PathBuf,
}

impl VendorResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn lookup(&self, decl: &ast::ImportDecl, digest: &Digest) -> Result<Arc<dyn Directory>> {
        let dir = vendor_path(&self.root, digest);
        if !dir.join(MODULE_FILENAME).exists() {
            let mut diags = DiagnosticSet::new();
            diags.push(Diagnostic::ModuleNotVendored {
                span: decl.span.clone(),
                digest: digest.to_string(),
                target: decl.name.text.clone(),
            });
            return Err(Error::Diagnostics(diags));
        }
        Ok(Arc::new(LocalDirectory::vendored(dir, digest.clone())))
    }
}

impl Resolver for VendorResolver {
    fn resolve<'a>(
        &'a self,
        _ctx: &'a Context,
        _client: &'a dyn BuildClient,
        _parent: &'a ast::Module,
        decl: &'a ast::ImportDecl,
        fs: &'a Filesystem,
    ) -> BoxFuture<'a, Result<Arc<dyn Directory>>> {
        async move { self.lookup(decl, &fs.digest()) }.boxed()
    }
}

/// Submits the filesystem to the build engine and serves the module from the
/// returned reference. Solves are throttled by the context's semaphore.
#[derive(Debug, Clone, Default)]
pub struct RemoteResolver;

impl Resolver for RemoteResolver {
    fn resolve<'a>(
        &'a self,
        ctx: &'a Context,
        client: &'a dyn BuildClient,
        _parent: &'a ast::Module,
        _decl: &'a ast::ImportDecl,
        fs: &'a Filesystem,
    ) -> BoxFuture<'a, Result<Arc<dyn Directory>>> {
        async move {
            ctx.check_cancelled()?;
            let _permit =
                ctx.semaphore().acquire().await.map_err(|_| Error::Cancelled)?;
            debug!(digest = %fs.digest(), "solving remote module");
            let reference = client.solve(ctx, fs).await?;
            Ok(Arc::new(RemoteDirectory::new(fs.digest(), reference)) as Arc<dyn Directory>)
        }
        .boxed()
    }
}

/// Prefers the vendor directory and falls back to a remote fetch.
#[derive(Debug, Clone)]
pub struct TidyResolver {
    vendor: VendorResolver,
    remote: RemoteResolver,
}

impl TidyResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { vendor: VendorResolver::new(root), remote: RemoteResolver }
    }
}

impl Resolver for TidyResolver {
    fn resolve<'a>(
        &'a self,
        ctx: &'a Context,
        client: &'a dyn BuildClient,
        parent: &'a ast::Module,
        decl: &'a ast::ImportDecl,
        fs: &'a Filesystem,
    ) -> BoxFuture<'a, Result<Arc<dyn Directory>>> {
        async move {
            let digest = fs.digest();
            if vendor_path(&self.vendor.root, &digest).join(MODULE_FILENAME).exists() {
                return self.vendor.lookup(decl, &digest);
            }
            self.remote.resolve(ctx, client, parent, decl, fs).await
        }
        .boxed()
    }
}

/// Like [`TidyResolver`], but forces a remote fetch when the parent module
/// matches the configured filename and the import is one of the configured
/// targets; used by the vendor command to refresh exactly what it vendors.
#[derive(Debug, Clone)]
pub struct TargetResolver {
    tidy: TidyResolver,
    remote: RemoteResolver,
    filename: String,
    targets: Vec<String>,
}

impl TargetResolver {
    pub fn new(root: impl Into<PathBuf>, filename: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            tidy: TidyResolver::new(root),
            remote: RemoteResolver,
            filename: filename.into(),
            targets,
        }
    }
}

impl Resolver for TargetResolver {
    fn resolve<'a>(
        &'a self,
        ctx: &'a Context,
        client: &'a dyn BuildClient,
        parent: &'a ast::Module,
        decl: &'a ast::ImportDecl,
        fs: &'a Filesystem,
    ) -> BoxFuture<'a, Result<Arc<dyn Directory>>> {
        async move {
            let forced = parent.filename() == self.filename
                && (self.targets.is_empty()
                    || self.targets.iter().any(|t| *t == decl.name.text));
            if forced {
                return self.remote.resolve(ctx, client, parent, decl, fs).await;
            }
            self.tidy.resolve(ctx, client, parent, decl, fs).await
        }
        .boxed()
    }
}

/// The default resolver for a working directory: vendor-backed when a vendor
/// directory is present, remote otherwise.
pub fn default_resolver(cwd: impl AsRef<Path>) -> Box<dyn Resolver> {
    let root = modules_root(cwd.as_ref());
    if root.is_dir() {
        Box::new(VendorResolver::new(root))
    } else {
        Box::new(RemoteResolver)
    }
}

/// What the traversal passes to the caller's visitor for every resolved
/// import, before recursing into that import's own imports.
pub struct Visit<'a> {
    pub parent: &'a ast::Module,
    pub module: &'a Arc<ast::Module>,
    pub decl: &'a ast::ImportDecl,
    /// File name within the resolved directory (`module.hlb` for filesystem
    /// imports, the literal path for string imports).
    pub filename: &'a str,
    /// Registry name the module's source buffer is stored under.
    pub path: &'a str,
    pub digest: Option<&'a Digest>,
}

/// A callback invoked for every import in the graph, possibly from several
/// tasks at once.
pub type Visitor<'a> = dyn Fn(Visit<'_>) -> Result<()> + Send + Sync + 'a;

/// Traverses the import graph concurrently, spawning one task per import.
/// Tasks share error-group semantics: the first error cancels its siblings.
#[instrument(skip_all, fields(module = module.filename()))]
pub async fn resolve_graph(
    ctx: &Context,
    codegen: &dyn CodeGenerator,
    client: &dyn BuildClient,
    resolver: &dyn Resolver,
    module: &ast::Module,
    visitor: &Visitor<'_>,
) -> Result<()> {
    if module.directory().is_none() {
        let dir = Path::new(module.filename())
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        module.set_directory(Arc::new(LocalDirectory::new(dir)));
    }
    resolve_module(ctx, codegen, client, resolver, module, visitor).await
}

fn resolve_module<'a>(
    ctx: &'a Context,
    codegen: &'a dyn CodeGenerator,
    client: &'a dyn BuildClient,
    resolver: &'a dyn Resolver,
    parent: &'a ast::Module,
    visitor: &'a Visitor<'a>,
) -> BoxFuture<'a, Result<()>> {
    async move {
        ctx.check_cancelled()?;
        let imports: Vec<_> = parent.imports().collect();
        if imports.is_empty() {
            return Ok(());
        }
        let tasks = imports.into_iter().map(|(_, decl)| {
            resolve_import(ctx, codegen, client, resolver, parent, decl, visitor)
        });
        futures::future::try_join_all(tasks).await?;
        Ok(())
    }
    .boxed()
}

#[allow(clippy::too_many_arguments)]
async fn resolve_import(
    ctx: &Context,
    codegen: &dyn CodeGenerator,
    client: &dyn BuildClient,
    resolver: &dyn Resolver,
    parent: &ast::Module,
    decl: &ast::ImportDecl,
    visitor: &Visitor<'_>,
) -> Result<()> {
    ctx.check_cancelled()?;
    let scope = parent.scope().clone();

    // skip imports the semantic pass could not register; an earlier check
    // error already covers them
    let Some(object) = scope.lookup(&decl.name.text) else { return Ok(()) };
    if !matches!(&object.node, ObjectNode::Decl(_)) {
        return Ok(());
    }

    let register = codegen.emit_expr(ctx, &scope, &decl.expr)?;
    let (dir, filename): (Arc<dyn Directory>, String) = match &register {
        Register::String(path) => resolve_local_import(parent, decl, path).await?,
        Register::Filesystem(fs) => {
            let dir = resolver.resolve(ctx, client, parent, decl, fs).await?;
            (dir, MODULE_FILENAME.to_string())
        }
    };

    ctx.check_cancelled()?;
    let bytes = dir.open(&filename).await?;
    let src = String::from_utf8(bytes)
        .map_err(|_| Error::msg(format!("module {} is not valid UTF-8", decl.name.text)))?;
    let registry_name = dir.path().join(&filename).display().to_string();
    trace!(module = %registry_name, import = %decl.name.text, "loaded imported module");

    // re-enter the front-end for the imported module
    let mut imported =
        parser::parse_str(ctx, &src, ParseOptions::with_filename(registry_name.clone()))?;
    checker::semantic_pass(&imported)?;
    match linter::lint(ctx, &mut imported, LintOptions::default()) {
        Ok(()) => {}
        Err(Error::Diagnostics(set)) if !set.has_errors() => {
            trace!(module = %registry_name, warnings = set.len(), "imported module has deprecations");
        }
        Err(err) => return Err(err),
    }
    checker::check(&imported)?;
    imported.set_directory(dir.clone());

    let imported = Arc::new(imported);
    let digest = dir.digest().cloned();
    visitor(Visit {
        parent,
        module: &imported,
        decl,
        filename: &filename,
        path: &registry_name,
        digest: digest.as_ref(),
    })?;

    object.attach_module(imported.clone());
    checker::check_references(parent, &decl.name.text)?;

    resolve_module(ctx, codegen, client, resolver, &imported, visitor).await
}

/// Resolves a string-valued import. The path is relative to the parent
/// module: for local parents it names a file on disk, for content-addressed
/// parents it names a file inside the same directory.
async fn resolve_local_import(
    parent: &ast::Module,
    decl: &ast::ImportDecl,
    path: &str,
) -> Result<(Arc<dyn Directory>, String)> {
    let parent_dir = parent
        .directory()
        .cloned()
        .ok_or_else(|| Error::msg(format!("module {} has no directory", parent.filename())))?;

    if parent_dir.digest().is_some() {
        if parent_dir.stat(path).await.is_err() {
            return Err(import_path_not_exist(decl, path));
        }
        return Ok((parent_dir, path.to_string()));
    }

    let resolved = linter::resolve_local(parent.filename(), path);
    if tokio::fs::metadata(&resolved).await.is_err() {
        return Err(import_path_not_exist(decl, path));
    }
    let dir = resolved
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let filename = resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| Error::msg(format!("invalid import path {path:?}")))?;
    Ok((Arc::new(LocalDirectory::new(dir)), filename))
}

fn import_path_not_exist(decl: &ast::ImportDecl, path: &str) -> Error {
    let mut diags = DiagnosticSet::new();
    diags.push(Diagnostic::ImportPathNotExist {
        span: decl.expr.span().clone(),
        path: path.to_string(),
    });
    Error::Diagnostics(diags)
}
