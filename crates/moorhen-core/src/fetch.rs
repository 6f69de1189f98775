//! Per-destination fetch orchestration.
//!
//! Concrete fetch strategies (registry, git, tarball) live upstream behind
//! the [`Fetcher`] trait; this module owns the lifecycle around them:
//! exclusive locking per destination, manifest loading, and persisting the
//! install metadata record.

use crate::error::InstallError;
use crate::manifest::{InstallMetadata, Manifest, PackageRemote};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// What a strategy produced: the content hash and the resolved version
/// string it settled on, when it knows them.
#[derive(Debug, Clone, Default)]
pub struct FetchedContent {
    pub hash: Option<String>,
    pub resolved: Option<String>,
}

/// Result of a completed fetch.
#[derive(Debug, Clone)]
pub struct FetchedPackage {
    pub resolved: Option<String>,
    pub hash: Option<String>,
    pub dest: PathBuf,
    pub package: Manifest,
    /// Always `false` here; callers that detect prior cache hits bypass
    /// this fetch entirely and report `cached: true` themselves.
    pub cached: bool,
}

/// A source-type-specific fetch implementation.
pub trait Fetcher {
    /// Materialize package content into `dest`.
    fn fetch_content(
        &self,
        dest: &Path,
    ) -> impl std::future::Future<Output = Result<FetchedContent, InstallError>> + Send;
}

/// Serializes fetches per destination path.
///
/// Two operations fetching into the same directory would partially
/// overwrite each other; fetches to distinct paths run without bound.
#[derive(Debug, Default)]
pub struct FetchLifecycle {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FetchLifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock handle for a destination, created on first use and reused after.
    async fn lock_for(&self, dest: &Path) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(dest.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Fetch a package into `dest` under the destination's exclusive lock.
    ///
    /// Steps: ensure the destination directory exists, run the strategy,
    /// then for non-link remotes read the manifest back and persist the
    /// metadata record. Link remotes short-circuit with a placeholder
    /// manifest since the linked source may not contain a readable one yet.
    ///
    /// Strategy failures propagate unchanged; the lock is released either way.
    pub async fn fetch<F: Fetcher>(
        &self,
        dest: &Path,
        remote: &PackageRemote,
        strategy: &F,
    ) -> Result<FetchedPackage, InstallError> {
        let lock = self.lock_for(dest).await;
        let _guard = lock.lock().await;

        tokio::fs::create_dir_all(dest).await.map_err(|e| {
            InstallError::fetch_failed(format!("Failed to create {}: {e}", dest.display()))
        })?;

        let content = strategy.fetch_content(dest).await?;

        // Linked sources may not contain a manifest yet; skip the read
        if remote.kind.is_link() {
            return Ok(FetchedPackage {
                resolved: content.resolved,
                hash: content.hash,
                dest: dest.to_path_buf(),
                package: Manifest::placeholder(),
                cached: false,
            });
        }

        let package = Manifest::read(dest)?;

        let hash = content.hash.clone().or_else(|| remote.hash.clone());
        InstallMetadata {
            remote: remote.clone(),
            registry: remote.registry.clone(),
            hash: hash.clone(),
            artifacts: Vec::new(),
        }
        .write(dest)?;

        Ok(FetchedPackage {
            resolved: content.resolved,
            hash,
            dest: dest.to_path_buf(),
            package,
            cached: false,
        })
    }
}
