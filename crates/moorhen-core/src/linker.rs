//! The linker facade: peer resolution, module materialization, bin saving.
//!
//! Sequencing for one install pass is `init`: resolve peer dependencies,
//! materialize the flattened tree onto disk, then persist root bin links
//! for the explicitly requested patterns.

use crate::bin::{self, BinLinkStrategy};
use crate::config::Config;
use crate::constants::{BIN_FOLDER, BIN_LINK_CONCURRENCY, METADATA_FILENAME, TARBALL_FILENAME};
use crate::error::InstallError;
use crate::fsops::{self, BulkOptions, CopyItem, PathSet};
use crate::hoist::Hoister;
use crate::manifest::InstallMetadata;
use crate::ranges;
use crate::resolution::{PackageId, ResolutionGraph};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Materializes a resolved graph onto the filesystem.
pub struct PackageLinker<'a> {
    config: &'a Config,
    graph: &'a mut ResolutionGraph,
    strategy: BinLinkStrategy,
}

impl<'a> PackageLinker<'a> {
    #[must_use]
    pub fn new(config: &'a Config, graph: &'a mut ResolutionGraph) -> Self {
        Self {
            config,
            graph,
            strategy: BinLinkStrategy::for_platform(),
        }
    }

    /// Override the platform bin-link strategy (tests, cross-builds).
    #[must_use]
    pub fn with_strategy(mut self, strategy: BinLinkStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Full install pass over the given root patterns.
    pub async fn init<H: Hoister>(
        &mut self,
        hoister: &mut H,
        patterns: &[String],
        link_duplicates: bool,
    ) -> Result<(), InstallError> {
        self.resolve_peer_modules();
        self.copy_modules(hoister, patterns, link_duplicates).await?;
        self.save_all(patterns)
    }

    /// Validate and record satisfied peer dependencies for every resolved
    /// package.
    ///
    /// Violations are advisory: a warning is emitted and the graph is left
    /// unchanged for that edge.
    pub fn resolve_peer_modules(&mut self) {
        let ids: Vec<PackageId> = self.graph.package_ids().collect();
        for id in ids {
            self.resolve_peers_for(id);
        }
    }

    fn resolve_peers_for(&mut self, id: PackageId) {
        let manifest = self.graph.manifest(id);
        if manifest.peer_dependencies.is_empty() {
            return;
        }
        let pkg_human = format!("{}@{}", manifest.name, manifest.version);
        let peer_deps: Vec<(String, String)> = manifest
            .peer_dependencies
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let requests = self.graph.reference(id).requests.clone();

        for (peer_name, range) in peer_deps {
            // Find a dependency in the tree above us that matches: walk
            // every request chain that led here, nearest ancestors first
            let mut search_patterns: Vec<String> = Vec::new();
            for request_id in &requests {
                for request in self.graph.request_ancestry(*request_id) {
                    let Some(dep_id) = self.graph.resolved_pattern(&request.pattern) else {
                        continue;
                    };
                    search_patterns.extend(self.graph.reference(dep_id).patterns.iter().cloned());
                }
            }

            // Root seed patterns come last, as the lowest-priority context
            search_patterns.extend(self.graph.seed_patterns.iter().cloned());

            let found = search_patterns.iter().find_map(|pattern| {
                let dep_id = self.graph.resolved_pattern(pattern)?;
                let dep = self.graph.manifest(dep_id);
                (dep.name == peer_name).then(|| (pattern.clone(), dep.version.clone()))
            });

            let dep_human = format!("{peer_name}@{range}");
            match found {
                Some((pattern, version)) if self.satisfies_peer(&range, &version) => {
                    self.graph.reference_mut(id).add_dependency(&pattern);
                }
                Some(_) => {
                    warn!("{pkg_human} has incorrect peer dependency {dep_human}");
                }
                None => {
                    warn!("{pkg_human} has unmet peer dependency {dep_human}");
                }
            }
        }
    }

    fn satisfies_peer(&self, range: &str, version: &str) -> bool {
        range == "*" || ranges::version_satisfies(version, range, self.config.loose_semver)
    }

    /// Materialize the flattened tree: plan copy/hardlink operations,
    /// execute them, remove extraneous entries, link dependency bins.
    pub async fn copy_modules<H: Hoister>(
        &mut self,
        hoister: &mut H,
        patterns: &[String],
        link_duplicates: bool,
    ) -> Result<(), InstallError> {
        hoister.seed(patterns);
        let mut flat_tree = hoister.init(self.graph)?;

        // A destination-sorted tree keeps concurrent file creation from
        // interfering between siblings
        flat_tree.sort_by(|a, b| a.dest.cmp(&b.dest));

        let hardlinks_enabled = link_duplicates && fsops::hardlinks_work(&self.config.cwd);

        // Build artifacts recorded by previous installs must survive the
        // extraneous sweep; linked dependencies carry none
        let mut artifact_files: HashSet<PathBuf> = HashSet::new();

        let mut copy_queue: BTreeMap<PathBuf, CopyItem> = BTreeMap::new();
        let mut hardlink_queue: BTreeMap<PathBuf, CopyItem> = BTreeMap::new();
        let mut copied_srcs: HashMap<PathBuf, PathBuf> = HashMap::new();

        for tuple in &flat_tree {
            let reference = self.graph.reference(tuple.package);
            let remote = reference.remote.clone().unwrap_or_default();
            let fresh = reference.fresh_flag();

            let src = if remote.kind.is_link() {
                PathBuf::from(&remote.reference)
            } else {
                tuple.src.clone()
            };

            self.graph
                .reference_mut(tuple.package)
                .set_location(tuple.dest.clone());

            if !remote.kind.is_link() {
                if let Some(meta) = InstallMetadata::read(&src)? {
                    for file in &meta.artifacts {
                        artifact_files.insert(tuple.dest.join(file));
                    }
                }
            }

            match copied_srcs.get(&src).cloned() {
                None => {
                    if hardlinks_enabled {
                        copied_srcs.insert(src.clone(), tuple.dest.clone());
                    }
                    copy_queue.insert(
                        tuple.dest.clone(),
                        CopyItem {
                            src,
                            dest: tuple.dest.clone(),
                            kind: remote.kind,
                            fresh,
                        },
                    );
                }
                Some(copied_dest) => {
                    hardlink_queue.insert(
                        tuple.dest.clone(),
                        CopyItem {
                            src: copied_dest,
                            dest: tuple.dest.clone(),
                            kind: remote.kind,
                            fresh,
                        },
                    );
                }
            }
        }

        // Register root and scoped packages as possibly extraneous; track
        // scope directories so emptied ones can go too
        let possible_extraneous = PathSet::new();
        let mut scoped_paths: HashSet<PathBuf> = HashSet::new();

        for root in self.config.registry_roots() {
            if !root.exists() {
                continue;
            }
            for entry in fs::read_dir(&root)? {
                let entry = entry?;
                let filepath = entry.path();
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('@') {
                    // A scope, not a package: its contents are candidates
                    scoped_paths.insert(filepath.clone());
                    for subentry in fs::read_dir(&filepath)? {
                        possible_extraneous.insert(subentry?.path());
                    }
                } else {
                    possible_extraneous.insert(filepath);
                }
            }
        }

        // Linked modules are never extraneous and never re-copied
        for loc in possible_extraneous.snapshot() {
            if moorhen_util::fs::is_symlink(&loc) {
                possible_extraneous.remove(&loc);
                copy_queue.remove(&loc);
            }
        }

        let opts = Arc::new(BulkOptions {
            possible_extraneous: possible_extraneous.clone(),
            artifact_files,
            ignore_basenames: vec![METADATA_FILENAME.to_string(), TARBALL_FILENAME.to_string()],
            on_start: Some(Box::new(|total| {
                debug!(total, "starting bulk file operations");
            })),
            on_progress: Some(Box::new(|src: &std::path::Path| {
                debug!(src = %src.display(), "processed");
            })),
        });

        // Hardlink targets must exist, so the copy batch completes first
        fsops::copy_bulk(copy_queue.into_values().collect(), Arc::clone(&opts)).await?;
        fsops::hardlink_bulk(hardlink_queue.into_values().collect(), opts).await?;

        // Everything still unconfirmed wasn't part of the tree
        for loc in possible_extraneous.take_all() {
            debug!(path = %loc.display(), "removing extraneous file");
            fsops::remove_path(&loc)?;
        }

        // Scopes with no surviving packages go too
        for scoped_path in scoped_paths {
            let emptied = fs::read_dir(&scoped_path)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);
            if emptied {
                fsops::remove_path(&scoped_path)?;
            }
        }

        if self.config.bin_links {
            let graph: &ResolutionGraph = self.graph;
            let config = self.config;
            let strategy = self.strategy;

            let results: Vec<Result<(), InstallError>> = stream::iter(flat_tree.iter())
                .map(|tuple| async move {
                    let bin_loc = tuple.dest.join(config.dependencies_folder());
                    bin::link_bin_dependencies(strategy, graph, config, tuple.package, &bin_loc)?;
                    debug!(dest = %tuple.dest.display(), "linked dependency bins");
                    Ok(())
                })
                .buffer_unordered(BIN_LINK_CONCURRENCY)
                .collect()
                .await;
            results.into_iter().collect::<Result<(), _>>()?;
        }

        Ok(())
    }

    /// Persist root bin links for one explicitly requested pattern.
    pub fn save(&self, pattern: &str) -> Result<(), InstallError> {
        let id = self.graph.strict_resolved_pattern(pattern)?;
        let resolved = self.graph.manifest(id);
        let reference = self.graph.reference(id);

        if !self.config.bin_links || !resolved.has_bin() || reference.ignore {
            return Ok(());
        }

        let Some(src) = reference.location() else {
            // Never placed by the hoister; nothing on disk to link from
            debug!(pattern, "skipping root bin links for unplaced package");
            return Ok(());
        };

        let bin_loc = self.config.modules_dir().join(BIN_FOLDER);
        fs::create_dir_all(&bin_loc).map_err(|e| {
            InstallError::bin_link_failed(format!("Failed to create {}: {e}", bin_loc.display()))
        })?;
        bin::link_self_dependencies(self.strategy, resolved, src, &bin_loc)
    }

    /// Persist root bin links for all requested patterns, deduplicated.
    pub fn save_all(&self, patterns: &[String]) -> Result<(), InstallError> {
        let deps = self.graph.dedupe_patterns(patterns);
        for pattern in &deps {
            self.save(pattern)?;
        }
        Ok(())
    }
}
