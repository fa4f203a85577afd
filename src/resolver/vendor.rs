//! Content-addressed vendor cache.
//!
//! Layout: `<root>/<algo>/<AA>/<full-hex>/<filename>`, where `<AA>` is the
//! first two lowercase hex characters of the digest. Writing is idempotent
//! and the tidy sweep prunes any directory at that depth the current graph
//! no longer references.

use super::{resolve_graph, BuildClient, Resolver, TargetResolver, Visit};
use crate::{
    ast::Module,
    codegen::{CodeGenerator, Digest},
    error::{Error, IoError, Result},
    Context,
};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};
use walkdir::WalkDir;

/// Module file name inside a vendor directory for filesystem-valued imports.
pub const MODULE_FILENAME: &str = "module.hlb";

/// The vendor root for a working directory: `<cwd>/.hlb/modules`.
pub fn modules_root(cwd: impl AsRef<Path>) -> PathBuf {
    cwd.as_ref().join(".hlb").join("modules")
}

/// The vendor directory a digest maps to. Injective: distinct digests map to
/// distinct paths.
pub fn vendor_path(root: impl AsRef<Path>, digest: &Digest) -> PathBuf {
    let hex = digest.hex();
    root.as_ref().join(digest.algorithm()).join(&hex[..2.min(hex.len())]).join(hex)
}

/// Options for [`vendor`].
#[derive(Clone, Debug, Default)]
pub struct VendorOptions {
    /// Import names to refresh from remote even when already vendored; empty
    /// refreshes all imports of the root module.
    pub targets: Vec<String>,
    /// Sweep vendor directories the graph no longer references.
    pub tidy: bool,
}

/// Traverses the import graph and writes every content-addressed module into
/// the vendor tree under `root`; in tidy mode, unreferenced vendor
/// directories are removed afterwards.
#[instrument(skip_all, fields(module = module.filename(), root = %root.as_ref().display()))]
pub async fn vendor(
    ctx: &Context,
    codegen: &dyn CodeGenerator,
    client: &dyn BuildClient,
    module: &Module,
    root: impl AsRef<Path>,
    opts: VendorOptions,
) -> Result<()> {
    let root = root.as_ref();
    let resolver = TargetResolver::new(root, module.filename(), opts.targets.clone());
    let marked: Mutex<HashSet<PathBuf>> = Mutex::new(HashSet::new());
    let marked_ref = &marked;

    let write = move |visit: Visit<'_>| -> Result<()> {
        let Some(digest) = visit.digest else { return Ok(()) };
        let dir = vendor_path(root, digest);
        marked_ref.lock().expect("vendor mark set poisoned").insert(dir.clone());

        let target = dir.join(visit.filename);
        if target.exists() {
            return Ok(());
        }
        let source = ctx
            .sources()
            .get(visit.path)
            .ok_or_else(|| Error::msg(format!("no source buffer for {}", visit.path)))?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|err| IoError::new(err, parent))?;
        }
        debug!(path = %target.display(), "vendoring module");
        fs::write(&target, source.content()).map_err(|err| IoError::new(err, &target))?;
        Ok(())
    };

    resolve_graph(ctx, codegen, client, &resolver as &dyn Resolver, module, &write).await?;

    if opts.tidy {
        prune(root, &marked.lock().expect("vendor mark set poisoned"))?;
    }
    Ok(())
}

/// Removes every `<algo>/<AA>/<hex>` directory not present in `marked`.
fn prune(root: &Path, marked: &HashSet<PathBuf>) -> Result<()> {
    if !root.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(root).min_depth(3).max_depth(3).into_iter().flatten() {
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path();
        if !marked.contains(path) {
            debug!(path = %path.display(), "pruning unreferenced vendor directory");
            fs::remove_dir_all(path).map_err(|err| IoError::new(err, path))?;
        }
    }
    // drop now-empty prefix directories
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(2)
        .contents_first(true)
        .into_iter()
        .flatten()
    {
        if entry.file_type().is_dir() && fs::read_dir(entry.path()).map(|mut d| d.next().is_none()).unwrap_or(false)
        {
            let _ = fs::remove_dir(entry.path());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn layout_shape() {
        let digest = Digest::sha256(b"module");
        let path = vendor_path("/work/.hlb/modules", &digest);
        let rendered = path.display().to_string();
        assert!(rendered.starts_with("/work/.hlb/modules/sha256/"));
        let components: Vec<_> =
            path.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
        let aa = &components[components.len() - 2];
        let hex = &components[components.len() - 1];
        assert_eq!(aa.len(), 2);
        assert_eq!(&hex[..2], aa.as_str());
        assert_eq!(hex.len(), 64);
    }

    #[test]
    fn injective_over_digests() {
        let mut seen = HashSet::new();
        for input in ["a", "b", "c", "alpine", "busybox"] {
            let digest = Digest::sha256(input.as_bytes());
            assert!(seen.insert(vendor_path("/m", &digest)));
        }
    }

    #[test]
    fn stable_for_same_digest() {
        let a = Digest::sha256(b"same");
        let b = Digest::sha256(b"same");
        assert_eq!(vendor_path("/m", &a), vendor_path("/m", &b));
    }

    #[test]
    fn prune_removes_unmarked_only() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let keep = Digest::sha256(b"keep");
        let drop_ = Digest::sha256(b"drop");
        let keep_dir = vendor_path(root, &keep);
        let drop_dir = vendor_path(root, &drop_);
        fs::create_dir_all(&keep_dir).unwrap();
        fs::create_dir_all(&drop_dir).unwrap();
        fs::write(keep_dir.join(MODULE_FILENAME), "fs default() {}\n").unwrap();
        fs::write(drop_dir.join(MODULE_FILENAME), "fs default() {}\n").unwrap();

        let marked: HashSet<PathBuf> = [keep_dir.clone()].into_iter().collect();
        prune(root, &marked).unwrap();

        assert!(keep_dir.join(MODULE_FILENAME).exists());
        assert!(!drop_dir.exists());
    }
}
