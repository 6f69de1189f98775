//! The resolved dependency graph consumed by the install engine.
//!
//! The resolver proper lives upstream; what arrives here is its output,
//! flattened into arenas. Packages, references, and requests are stored in
//! index-keyed `Vec`s and passed between components as [`PackageId`] /
//! [`RequestId`] values instead of shared mutable references. Request
//! records link to their parent by index, so walking a request's ancestry
//! is an iterative index chase with no ownership entanglement.

use crate::error::{Error, InstallError};
use crate::manifest::{Manifest, PackageRemote};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Stable identifier of a resolved package in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PackageId(pub usize);

/// Stable identifier of a dependency request record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub usize);

/// One dependency request that led to a resolution.
///
/// `parent` points at the request that pulled this one in; the chain ends
/// at a root request with no parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub pattern: String,
    #[serde(default)]
    pub parent: Option<RequestId>,
}

/// Per-resolved-package mutable state.
///
/// Created by the resolver, mutated in place by the materializer (location,
/// fresh flag) and the peer resolver (added dependency patterns). Lives for
/// the duration of one install run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageReference {
    /// Resolved dependency patterns of this package.
    #[serde(default)]
    pub patterns: Vec<String>,

    /// Requests that resolved to this package.
    #[serde(default)]
    pub requests: Vec<RequestId>,

    /// How the content was obtained. Absent only when the resolver had
    /// nothing to say; most operations tolerate that, bin-dependency
    /// linking treats it as a contract violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<PackageRemote>,

    /// Excludes this package from bin linking (deduped/ignored nodes).
    #[serde(default)]
    pub ignore: bool,

    /// Installation location, recorded at materialization time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<PathBuf>,

    /// True when this install's content was newly written rather than
    /// reused. Flipped from concurrent executor callbacks, hence atomic.
    #[serde(skip, default)]
    fresh: Arc<AtomicBool>,
}

impl Default for PackageReference {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            requests: Vec::new(),
            remote: None,
            ignore: false,
            location: None,
            fresh: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl PackageReference {
    /// Record the installation location for this pass.
    pub fn set_location(&mut self, location: PathBuf) {
        self.location = Some(location);
    }

    /// The installation location, if materialization has recorded one.
    #[must_use]
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Add a dependency pattern. Adding an already-present pattern is a no-op.
    pub fn add_dependency(&mut self, pattern: &str) {
        if !self.patterns.iter().any(|p| p == pattern) {
            self.patterns.push(pattern.to_string());
        }
    }

    /// Shared handle to the fresh flag, for executor callbacks.
    #[must_use]
    pub fn fresh_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.fresh)
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.fresh.load(Ordering::Relaxed)
    }
}

/// Arena of resolved packages, their references, and request records.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ResolutionGraph {
    manifests: Vec<Manifest>,
    refs: Vec<PackageReference>,
    requests: Vec<Request>,
    /// Resolved pattern -> package. Multiple request strings may map to the
    /// same package (dedup key).
    patterns: HashMap<String, PackageId>,
    /// Root patterns seeded by the resolver, lowest priority in peer search.
    #[serde(default)]
    pub seed_patterns: Vec<String>,
}

impl ResolutionGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a serialized graph produced by the resolver.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path).map_err(|source| Error::GraphRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| Error::GraphParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Register a resolved package under a pattern.
    ///
    /// Returns the new package's id; additional patterns can alias it via
    /// [`ResolutionGraph::register_pattern`].
    pub fn register_package(
        &mut self,
        pattern: &str,
        manifest: Manifest,
        remote: Option<PackageRemote>,
    ) -> PackageId {
        let id = PackageId(self.manifests.len());
        self.manifests.push(manifest);
        self.refs.push(PackageReference {
            remote,
            ..PackageReference::default()
        });
        self.patterns.insert(pattern.to_string(), id);
        id
    }

    /// Alias an additional pattern to an already-registered package.
    pub fn register_pattern(&mut self, pattern: &str, id: PackageId) {
        self.patterns.insert(pattern.to_string(), id);
    }

    /// Record a request chain entry and attach it to the package it
    /// resolved to.
    pub fn register_request(
        &mut self,
        resolved: PackageId,
        pattern: &str,
        parent: Option<RequestId>,
    ) -> RequestId {
        let id = RequestId(self.requests.len());
        self.requests.push(Request {
            pattern: pattern.to_string(),
            parent,
        });
        self.refs[resolved.0].requests.push(id);
        id
    }

    /// Look up the package a pattern resolved to.
    #[must_use]
    pub fn resolved_pattern(&self, pattern: &str) -> Option<PackageId> {
        self.patterns.get(pattern).copied()
    }

    /// Like [`ResolutionGraph::resolved_pattern`] but a missing pattern is
    /// an error.
    pub fn strict_resolved_pattern(&self, pattern: &str) -> Result<PackageId, InstallError> {
        self.resolved_pattern(pattern)
            .ok_or_else(|| InstallError::pattern_not_found(pattern))
    }

    #[must_use]
    pub fn manifest(&self, id: PackageId) -> &Manifest {
        &self.manifests[id.0]
    }

    #[must_use]
    pub fn reference(&self, id: PackageId) -> &PackageReference {
        &self.refs[id.0]
    }

    pub fn reference_mut(&mut self, id: PackageId) -> &mut PackageReference {
        &mut self.refs[id.0]
    }

    #[must_use]
    pub fn request(&self, id: RequestId) -> &Request {
        &self.requests[id.0]
    }

    /// All package ids, in registration order.
    pub fn package_ids(&self) -> impl Iterator<Item = PackageId> {
        (0..self.manifests.len()).map(PackageId)
    }

    /// Walk a request's ancestry, yielding the request itself first, then
    /// its parent, and so on up to the root.
    pub fn request_ancestry(&self, id: RequestId) -> impl Iterator<Item = &Request> {
        let mut next = Some(id);
        std::iter::from_fn(move || {
            let current = next?;
            let request = &self.requests[current.0];
            next = request.parent;
            Some(request)
        })
    }

    /// Drop patterns that resolve to a package already covered by an
    /// earlier pattern in the list. Unresolved patterns are kept.
    #[must_use]
    pub fn dedupe_patterns(&self, patterns: &[String]) -> Vec<String> {
        let mut seen: Vec<PackageId> = Vec::new();
        let mut out = Vec::new();
        for pattern in patterns {
            match self.resolved_pattern(pattern) {
                Some(id) if seen.contains(&id) => {}
                Some(id) => {
                    seen.push(id);
                    out.push(pattern.clone());
                }
                None => out.push(pattern.clone()),
            }
        }
        out
    }
}
