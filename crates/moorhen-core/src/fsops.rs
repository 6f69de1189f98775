//! Bulk copy/hardlink execution and filesystem primitives.
//!
//! The materializer plans operations keyed by destination; this module
//! executes them with bounded concurrency. No two items in a batch share a
//! destination, so items only contend on the shared bookkeeping sets.
//!
//! Copying reconciles rather than blindly writes: files already identical
//! on disk are left alone (and don't mark the package fresh), files in the
//! destination that no longer exist in the source are pruned unless they
//! are protected build artifacts.

use crate::constants::FS_CONCURRENCY;
use crate::error::InstallError;
use crate::manifest::RemoteType;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use walkdir::WalkDir;

/// A set of paths shared between in-flight operations.
///
/// Removal is idempotent: confirming an already-confirmed path is a no-op.
#[derive(Debug, Clone, Default)]
pub struct PathSet(Arc<Mutex<HashSet<PathBuf>>>);

impl PathSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: PathBuf) {
        self.0.lock().expect("path set poisoned").insert(path);
    }

    /// Remove a path. Returns `true` if it was present.
    pub fn remove(&self, path: &Path) -> bool {
        self.0.lock().expect("path set poisoned").remove(path)
    }

    #[must_use]
    pub fn contains(&self, path: &Path) -> bool {
        self.0.lock().expect("path set poisoned").contains(path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.lock().expect("path set poisoned").is_empty()
    }

    /// Copy of the current contents, sorted.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .0
            .lock()
            .expect("path set poisoned")
            .iter()
            .cloned()
            .collect();
        paths.sort();
        paths
    }

    /// Drain the remaining paths, sorted for deterministic processing.
    #[must_use]
    pub fn take_all(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .0
            .lock()
            .expect("path set poisoned")
            .drain()
            .collect();
        paths.sort();
        paths
    }
}

/// One planned filesystem operation.
#[derive(Debug, Clone)]
pub struct CopyItem {
    pub src: PathBuf,
    pub dest: PathBuf,
    pub kind: RemoteType,
    /// Flipped when the executor actually changed content on disk.
    pub fresh: Arc<AtomicBool>,
}

/// Progress and bookkeeping hooks for a bulk batch.
pub struct BulkOptions {
    /// Paths still suspected extraneous; operations confirm their
    /// destinations out of this set as they run.
    pub possible_extraneous: PathSet,
    /// Absolute paths of build artifacts that must survive reconciliation.
    pub artifact_files: HashSet<PathBuf>,
    /// Basenames that are manager bookkeeping, never package content.
    pub ignore_basenames: Vec<String>,
    pub on_start: Option<Box<dyn Fn(usize) + Send + Sync>>,
    pub on_progress: Option<Box<dyn Fn(&Path) + Send + Sync>>,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            possible_extraneous: PathSet::new(),
            artifact_files: HashSet::new(),
            ignore_basenames: Vec::new(),
            on_start: None,
            on_progress: None,
        }
    }
}

impl BulkOptions {
    fn ignored(&self, name: &std::ffi::OsStr) -> bool {
        name.to_str()
            .is_some_and(|n| self.ignore_basenames.iter().any(|b| b == n))
    }
}

/// Execute a batch of copy operations with bounded concurrency.
///
/// Each item's tree walk runs on the blocking pool so in-flight items
/// actually overlap instead of serializing on the runtime thread.
pub async fn copy_bulk(items: Vec<CopyItem>, opts: Arc<BulkOptions>) -> Result<(), InstallError> {
    if let Some(on_start) = &opts.on_start {
        on_start(items.len());
    }

    let results: Vec<Result<(), InstallError>> = stream::iter(items)
        .map(|item| {
            let opts = Arc::clone(&opts);
            async move {
                let fresh = {
                    let opts = Arc::clone(&opts);
                    let item = item.clone();
                    tokio::task::spawn_blocking(move || copy_package(&item, &opts))
                        .await
                        .map_err(|e| InstallError::copy_failed(format!("Copy task failed: {e}")))??
                };
                if fresh {
                    item.fresh.store(true, Ordering::Relaxed);
                }
                opts.possible_extraneous.remove(&item.dest);
                if let Some(on_progress) = &opts.on_progress {
                    on_progress(&item.src);
                }
                Ok(())
            }
        })
        .buffer_unordered(FS_CONCURRENCY)
        .collect()
        .await;

    results.into_iter().collect()
}

/// Execute a batch of hardlink operations with bounded concurrency.
///
/// Each item's `src` is the destination of an already-completed copy, so
/// this must only run after the copy batch has fully finished.
pub async fn hardlink_bulk(
    items: Vec<CopyItem>,
    opts: Arc<BulkOptions>,
) -> Result<(), InstallError> {
    if let Some(on_start) = &opts.on_start {
        on_start(items.len());
    }

    let results: Vec<Result<(), InstallError>> = stream::iter(items)
        .map(|item| {
            let opts = Arc::clone(&opts);
            async move {
                let fresh = {
                    let opts = Arc::clone(&opts);
                    let item = item.clone();
                    tokio::task::spawn_blocking(move || hardlink_package(&item, &opts))
                        .await
                        .map_err(|e| InstallError::link_failed(format!("Link task failed: {e}")))??
                };
                if fresh {
                    item.fresh.store(true, Ordering::Relaxed);
                }
                opts.possible_extraneous.remove(&item.dest);
                if let Some(on_progress) = &opts.on_progress {
                    on_progress(&item.src);
                }
                Ok(())
            }
        })
        .buffer_unordered(FS_CONCURRENCY)
        .collect()
        .await;

    results.into_iter().collect()
}

/// Copy one package directory, reconciling against existing content.
///
/// Returns `true` when anything on disk changed.
fn copy_package(item: &CopyItem, opts: &BulkOptions) -> Result<bool, InstallError> {
    if item.kind.is_link() {
        return replace_with_symlink(&item.src, &item.dest);
    }

    let mut fresh = false;
    let mut wanted: HashSet<PathBuf> = HashSet::new();

    for entry in WalkDir::new(&item.src) {
        let entry = entry.map_err(|e| {
            InstallError::copy_failed(format!("Failed to walk {}: {e}", item.src.display()))
        })?;
        let rel = entry
            .path()
            .strip_prefix(&item.src)
            .expect("walkdir yields paths under its root");
        if rel.as_os_str().is_empty() {
            continue;
        }
        if opts.ignored(entry.file_name()) {
            continue;
        }

        let target = item.dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                InstallError::copy_failed(format!("Failed to create {}: {e}", target.display()))
            })?;
        } else {
            wanted.insert(rel.to_path_buf());
            if copy_file_if_changed(entry.path(), &target)? {
                fresh = true;
            }
        }
    }

    prune_unwanted(&item.dest, &wanted, opts)?;
    Ok(fresh)
}

/// Hardlink one package directory from an already-copied destination.
fn hardlink_package(item: &CopyItem, opts: &BulkOptions) -> Result<bool, InstallError> {
    let mut fresh = false;
    let mut wanted: HashSet<PathBuf> = HashSet::new();

    for entry in WalkDir::new(&item.src) {
        let entry = entry.map_err(|e| {
            InstallError::copy_failed(format!("Failed to walk {}: {e}", item.src.display()))
        })?;
        let rel = entry
            .path()
            .strip_prefix(&item.src)
            .expect("walkdir yields paths under its root");
        if rel.as_os_str().is_empty() {
            continue;
        }
        if opts.ignored(entry.file_name()) {
            continue;
        }

        let target = item.dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| {
                InstallError::copy_failed(format!("Failed to create {}: {e}", target.display()))
            })?;
        } else {
            wanted.insert(rel.to_path_buf());
            if link_file_if_changed(entry.path(), &target)? {
                fresh = true;
            }
        }
    }

    prune_unwanted(&item.dest, &wanted, opts)?;
    Ok(fresh)
}

/// Copy a single file unless the destination already has identical content.
fn copy_file_if_changed(src: &Path, dest: &Path) -> Result<bool, InstallError> {
    if dest.is_file() && moorhen_util::hash::files_equal(src, dest).unwrap_or(false) {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        fs::remove_file(dest)?;
    }
    fs::copy(src, dest).map_err(|e| {
        InstallError::copy_failed(format!(
            "Failed to copy {} to {}: {e}",
            src.display(),
            dest.display()
        ))
    })?;
    Ok(true)
}

/// Hardlink a single file unless the destination is already that file.
fn link_file_if_changed(src: &Path, dest: &Path) -> Result<bool, InstallError> {
    if dest.exists() && same_file(src, dest) {
        return Ok(false);
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    if dest.exists() {
        fs::remove_file(dest)?;
    }
    fs::hard_link(src, dest).map_err(|e| {
        InstallError::link_failed(format!(
            "Failed to hardlink {} to {}: {e}",
            src.display(),
            dest.display()
        ))
    })?;
    Ok(true)
}

/// Whether two paths refer to the same underlying storage object.
#[cfg(unix)]
fn same_file(a: &Path, b: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (fs::metadata(a), fs::metadata(b)) {
        (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn same_file(a: &Path, b: &Path) -> bool {
    moorhen_util::hash::files_equal(a, b).unwrap_or(false)
}

/// Remove destination files that are no longer part of the package.
///
/// Protected artifacts and bookkeeping basenames survive.
fn prune_unwanted(
    dest: &Path,
    wanted: &HashSet<PathBuf>,
    opts: &BulkOptions,
) -> Result<(), InstallError> {
    if !dest.is_dir() {
        return Ok(());
    }

    for entry in WalkDir::new(dest) {
        let entry = entry.map_err(|e| {
            InstallError::copy_failed(format!("Failed to walk {}: {e}", dest.display()))
        })?;
        if entry.file_type().is_dir() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(dest)
            .expect("walkdir yields paths under its root");
        if wanted.contains(rel) {
            continue;
        }
        if opts.ignored(entry.file_name()) {
            continue;
        }
        if opts.artifact_files.contains(entry.path()) {
            continue;
        }
        fs::remove_file(entry.path()).map_err(|e| {
            InstallError::copy_failed(format!(
                "Failed to remove stale {}: {e}",
                entry.path().display()
            ))
        })?;
    }

    Ok(())
}

/// Replace whatever is at `dest` with a symlink to `src`.
///
/// Returns `false` (not fresh) when an equivalent link already exists.
fn replace_with_symlink(src: &Path, dest: &Path) -> Result<bool, InstallError> {
    if let Ok(existing) = fs::read_link(dest) {
        if existing == src {
            return Ok(false);
        }
    }

    if fs::symlink_metadata(dest).is_ok() {
        remove_path(dest)?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    symlink_dir(src, dest)?;
    Ok(true)
}

/// Create a directory link (symlink on Unix, junction on Windows).
pub fn symlink_dir(src: &Path, dest: &Path) -> Result<(), InstallError> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(src, dest).map_err(|e| {
            InstallError::link_failed(format!(
                "Failed to create symlink from {} to {}: {e}",
                dest.display(),
                src.display()
            ))
        })
    }

    #[cfg(windows)]
    {
        junction::create(src, dest).map_err(|e| {
            InstallError::link_failed(format!(
                "Failed to create junction from {} to {}: {e}",
                dest.display(),
                src.display()
            ))
        })
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = (src, dest);
        Err(InstallError::link_failed(
            "Directory links unsupported on this platform",
        ))
    }
}

/// Remove a file, symlink, or directory tree.
pub fn remove_path(path: &Path) -> Result<(), InstallError> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path)?;
    } else {
        // Symlinks and files both go through remove_file
        fs::remove_file(path)?;
    }
    Ok(())
}

/// Mark a file executable for owner, group, and other.
pub fn chmod_executable(path: &Path) -> Result<(), InstallError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).map_err(|e| {
            InstallError::bin_link_failed(format!(
                "Failed to chmod {}: {e}",
                path.display()
            ))
        })?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Probe whether the filesystem holding `dir` supports hardlinks.
///
/// Creates a temporary file and attempts to link it; some filesystems
/// (FAT variants, certain network mounts) refuse.
#[must_use]
pub fn hardlinks_work(dir: &Path) -> bool {
    let Ok(file) = tempfile::Builder::new()
        .prefix(".moorhen-hardlink-probe")
        .tempfile_in(dir)
    else {
        return false;
    };
    let link = file.path().with_extension("probe-link");
    let ok = fs::hard_link(file.path(), &link).is_ok();
    let _ = fs::remove_file(&link);
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(src: &Path, dest: &Path, kind: RemoteType) -> CopyItem {
        CopyItem {
            src: src.to_path_buf(),
            dest: dest.to_path_buf(),
            kind,
            fresh: Arc::new(AtomicBool::new(false)),
        }
    }

    #[tokio::test]
    async fn test_copy_bulk_copies_tree() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("package.json"), "{}").unwrap();
        fs::write(src.join("lib/index.js"), "module.exports = 1;").unwrap();

        let op = item(&src, &dest, RemoteType::Registry);
        let fresh = op.fresh.clone();
        copy_bulk(vec![op], Arc::new(BulkOptions::default())).await.unwrap();

        assert_eq!(fs::read_to_string(dest.join("package.json")).unwrap(), "{}");
        assert_eq!(
            fs::read_to_string(dest.join("lib/index.js")).unwrap(),
            "module.exports = 1;"
        );
        assert!(fresh.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_copy_bulk_idempotent() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.js"), "a").unwrap();

        copy_bulk(
            vec![item(&src, &dest, RemoteType::Registry)],
            Arc::new(BulkOptions::default()),
        )
        .await
        .unwrap();

        // Second run over identical content must not report fresh
        let op = item(&src, &dest, RemoteType::Registry);
        let fresh = op.fresh.clone();
        copy_bulk(vec![op], Arc::new(BulkOptions::default())).await.unwrap();
        assert!(!fresh.load(Ordering::Relaxed));
    }

    #[tokio::test]
    async fn test_copy_prunes_stale_files_but_keeps_artifacts() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("a.js"), "a").unwrap();
        fs::write(dest.join("stale.js"), "old").unwrap();
        fs::write(dest.join("built.node"), "artifact").unwrap();

        let mut opts = BulkOptions::default();
        opts.artifact_files.insert(dest.join("built.node"));

        copy_bulk(vec![item(&src, &dest, RemoteType::Registry)], Arc::new(opts))
            .await
            .unwrap();

        assert!(dest.join("a.js").exists());
        assert!(!dest.join("stale.js").exists());
        assert!(dest.join("built.node").exists());
    }

    #[tokio::test]
    async fn test_copy_skips_ignored_basenames() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.js"), "a").unwrap();
        fs::write(src.join(".moorhen-metadata.json"), "{}").unwrap();

        let opts = BulkOptions {
            ignore_basenames: vec![".moorhen-metadata.json".to_string()],
            ..BulkOptions::default()
        };
        copy_bulk(vec![item(&src, &dest, RemoteType::Registry)], Arc::new(opts))
            .await
            .unwrap();

        assert!(dest.join("a.js").exists());
        assert!(!dest.join(".moorhen-metadata.json").exists());
    }

    #[tokio::test]
    async fn test_copy_confirms_destination_not_extraneous() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let dest = dir.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.js"), "a").unwrap();

        let opts = Arc::new(BulkOptions::default());
        opts.possible_extraneous.insert(dest.clone());
        opts.possible_extraneous.insert(dir.path().join("other"));

        copy_bulk(
            vec![item(&src, &dest, RemoteType::Registry)],
            Arc::clone(&opts),
        )
        .await
        .unwrap();

        assert!(!opts.possible_extraneous.contains(&dest));
        assert!(opts.possible_extraneous.contains(&dir.path().join("other")));
    }

    #[tokio::test]
    async fn test_copy_bulk_reports_progress_per_item() {
        use std::sync::atomic::AtomicUsize;

        let dir = tempdir().unwrap();
        let mut items = Vec::new();
        for i in 0..20 {
            let src = dir.path().join(format!("src{i}"));
            fs::create_dir_all(&src).unwrap();
            fs::write(src.join("a.js"), format!("{i}")).unwrap();
            items.push(item(
                &src,
                &dir.path().join(format!("dest{i}")),
                RemoteType::Registry,
            ));
        }

        let started = Arc::new(AtomicUsize::new(0));
        let progressed = Arc::new(AtomicUsize::new(0));
        let opts = BulkOptions {
            on_start: Some(Box::new({
                let started = Arc::clone(&started);
                move |total| started.store(total, Ordering::SeqCst)
            })),
            on_progress: Some(Box::new({
                let progressed = Arc::clone(&progressed);
                move |_| {
                    progressed.fetch_add(1, Ordering::SeqCst);
                }
            })),
            ..BulkOptions::default()
        };

        copy_bulk(items, Arc::new(opts)).await.unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 20);
        assert_eq!(progressed.load(Ordering::SeqCst), 20);
        for i in 0..20 {
            assert!(dir.path().join(format!("dest{i}/a.js")).exists());
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_remote_becomes_symlink() {
        let dir = tempdir().unwrap();
        let external = dir.path().join("external-pkg");
        let dest = dir.path().join("node_modules").join("external-pkg");
        fs::create_dir_all(&external).unwrap();
        fs::write(external.join("package.json"), "{}").unwrap();

        let op = item(&external, &dest, RemoteType::Link);
        let fresh = op.fresh.clone();
        copy_bulk(vec![op], Arc::new(BulkOptions::default())).await.unwrap();

        assert!(moorhen_util::fs::is_symlink(&dest));
        assert_eq!(fs::read_link(&dest).unwrap(), external);
        assert!(fresh.load(Ordering::Relaxed));

        // Relinking the same target is not fresh
        let op = item(&external, &dest, RemoteType::Link);
        let fresh = op.fresh.clone();
        copy_bulk(vec![op], Arc::new(BulkOptions::default())).await.unwrap();
        assert!(!fresh.load(Ordering::Relaxed));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hardlink_bulk_same_inode() {
        use std::os::unix::fs::MetadataExt;

        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.js"), "shared").unwrap();

        copy_bulk(
            vec![item(&src, &first, RemoteType::Registry)],
            Arc::new(BulkOptions::default()),
        )
        .await
        .unwrap();
        hardlink_bulk(
            vec![item(&first, &second, RemoteType::Registry)],
            Arc::new(BulkOptions::default()),
        )
        .await
        .unwrap();

        let meta_first = fs::metadata(first.join("a.js")).unwrap();
        let meta_second = fs::metadata(second.join("a.js")).unwrap();
        assert_eq!(meta_first.ino(), meta_second.ino());
        assert_eq!(meta_first.dev(), meta_second.dev());
    }

    #[test]
    fn test_hardlinks_work_on_tempdir() {
        let dir = tempdir().unwrap();
        // Normal local filesystems support hardlinks
        assert!(hardlinks_work(dir.path()));
    }

    #[test]
    fn test_remove_path_variants() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f");
        let tree = dir.path().join("d");
        fs::write(&file, "x").unwrap();
        fs::create_dir_all(tree.join("nested")).unwrap();

        remove_path(&file).unwrap();
        remove_path(&tree).unwrap();
        remove_path(&dir.path().join("missing")).unwrap();

        assert!(!file.exists());
        assert!(!tree.exists());
    }

    #[test]
    fn test_path_set_idempotent_removal() {
        let set = PathSet::new();
        set.insert(PathBuf::from("/a"));
        assert!(set.remove(Path::new("/a")));
        assert!(!set.remove(Path::new("/a")));
        assert!(set.is_empty());
    }
}
