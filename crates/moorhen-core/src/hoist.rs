//! The flattened-tree seam between the hoister and the materializer.
//!
//! Tree-flattening policy (which copy of a package wins a `node_modules`
//! slot, how nested conflicts are laid out) belongs to the hoister upstream.
//! The materializer only consumes its output: one [`HoistedTuple`] per
//! placement, destinations unique.

use crate::config::Config;
use crate::error::InstallError;
use crate::resolution::{PackageId, ResolutionGraph};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

/// One package placement decided by the hoister.
#[derive(Debug, Clone)]
pub struct HoistedTuple {
    /// Destination path inside a managed install root.
    pub dest: PathBuf,
    /// The package placed there.
    pub package: PackageId,
    /// Source location of the fetched content.
    pub src: PathBuf,
}

/// Produces the flattened installation tree for a set of root patterns.
pub trait Hoister {
    /// Seed the hoister with the root patterns to install.
    fn seed(&mut self, patterns: &[String]);

    /// Compute the flattened tree. Destination paths are unique.
    fn init(&mut self, graph: &ResolutionGraph) -> Result<Vec<HoistedTuple>, InstallError>;
}

/// A one-level flattener: every reachable package lands directly under the
/// modules folder, first resolution of a name wins.
///
/// Good enough for trees without version conflicts; a conflict-aware
/// hoister can replace it behind the same trait.
#[derive(Debug)]
pub struct FlatHoister {
    config: Config,
    seeded: Vec<String>,
}

impl FlatHoister {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            seeded: Vec::new(),
        }
    }
}

impl Hoister for FlatHoister {
    fn seed(&mut self, patterns: &[String]) {
        self.seeded.extend(patterns.iter().cloned());
    }

    fn init(&mut self, graph: &ResolutionGraph) -> Result<Vec<HoistedTuple>, InstallError> {
        let modules_dir = self.config.modules_dir();
        let mut queue: VecDeque<String> = self.seeded.iter().cloned().collect();
        let mut visited: HashSet<PackageId> = HashSet::new();
        let mut placed_names: HashSet<String> = HashSet::new();
        let mut tuples = Vec::new();

        while let Some(pattern) = queue.pop_front() {
            let Some(id) = graph.resolved_pattern(&pattern) else {
                continue;
            };
            if !visited.insert(id) {
                continue;
            }

            let manifest = graph.manifest(id);
            for dep_pattern in &graph.reference(id).patterns {
                queue.push_back(dep_pattern.clone());
            }

            // First resolution of a name claims the flat slot
            if !placed_names.insert(manifest.name.clone()) {
                continue;
            }

            tuples.push(HoistedTuple {
                dest: modules_dir.join(&manifest.name),
                package: id,
                src: self.config.store_path(&manifest.name, &manifest.version),
            });
        }

        Ok(tuples)
    }
}
