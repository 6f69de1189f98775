//! Package manifests, remotes, and the persisted install metadata record.

use crate::constants::METADATA_FILENAME;
use crate::error::InstallError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// How a package's content was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoteType {
    /// Filesystem-linked package (workspace or `link:` dependency). The
    /// installer symlinks these and never copies or inspects their content.
    Link,
    Tarball,
    Git,
    Copy,
    Workspace,
    Registry,
    /// Placeholder used when a resolved package carries no remote at all.
    #[default]
    #[serde(rename = "")]
    Empty,
}

impl RemoteType {
    #[must_use]
    pub fn is_link(self) -> bool {
        self == Self::Link
    }
}

/// Remote descriptor for a resolved package.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageRemote {
    #[serde(rename = "type", default)]
    pub kind: RemoteType,
    /// Source reference: a URL for fetch-backed types, a filesystem path for
    /// `link` remotes.
    #[serde(default)]
    pub reference: String,
    #[serde(default)]
    pub registry: String,
    /// Opaque content hash, passed through to the metadata record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// The npm `bin` field: either a bare script path or a command map.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BinField {
    Script(String),
    Commands(BTreeMap<String, String>),
}

/// A package descriptor, as read from `package.json` and normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<BinField>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dependencies: BTreeMap<String, String>,

    #[serde(
        rename = "peerDependencies",
        default,
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub peer_dependencies: BTreeMap<String, String>,

    #[serde(
        rename = "bundleDependencies",
        alias = "bundledDependencies",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub bundle_dependencies: Vec<String>,
}

impl Manifest {
    /// Read and parse a manifest from a package directory.
    pub fn read(dir: &Path) -> Result<Self, InstallError> {
        let path = dir.join("package.json");
        if !path.exists() {
            return Err(InstallError::manifest_not_found(&path));
        }

        let content = moorhen_util::fs::read_to_string_lossy(&path)
            .map_err(|e| InstallError::manifest_invalid(format!("Failed to read: {e}")))?;

        serde_json::from_str(&content)
            .map_err(|e| InstallError::manifest_invalid(format!("Invalid JSON: {e}")))
    }

    /// Placeholder manifest for `link` remotes.
    ///
    /// Linked sources may not contain a readable `package.json` yet, so the
    /// fetch lifecycle substitutes this instead of reading from disk.
    #[must_use]
    pub fn placeholder() -> Self {
        Self {
            version: "0.0.0".to_string(),
            ..Self::default()
        }
    }

    /// Normalized `bin` entries: command name to relative script path.
    ///
    /// The bare-string form (`"bin": "cli.js"`) maps the package name itself
    /// to the script, per npm convention. Scoped names use their unscoped
    /// tail as the command.
    #[must_use]
    pub fn bin_entries(&self) -> BTreeMap<String, String> {
        match &self.bin {
            None => BTreeMap::new(),
            Some(BinField::Commands(map)) => map.clone(),
            Some(BinField::Script(script)) => {
                let command = self
                    .name
                    .rsplit('/')
                    .next()
                    .unwrap_or(self.name.as_str())
                    .to_string();
                if command.is_empty() {
                    return BTreeMap::new();
                }
                let mut map = BTreeMap::new();
                map.insert(command, script.clone());
                map
            }
        }
    }

    /// Whether this package declares at least one executable.
    #[must_use]
    pub fn has_bin(&self) -> bool {
        !self.bin_entries().is_empty()
    }
}

/// Bookkeeping record persisted inside every installed (non-link) package.
///
/// Lets a later pass detect cached content without re-fetching and protects
/// build artifacts from extraneous-file cleanup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallMetadata {
    #[serde(default)]
    pub remote: PackageRemote,
    #[serde(default)]
    pub registry: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    /// Files produced by build steps, relative to the package root. These
    /// survive extraneous cleanup even though they were never part of the
    /// fetched package content.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<String>,
}

impl InstallMetadata {
    /// Read the metadata record from a package directory.
    ///
    /// Returns `Ok(None)` when no record exists (nothing has been installed
    /// there yet, or the package predates this manager).
    pub fn read(dir: &Path) -> Result<Option<Self>, InstallError> {
        let path = dir.join(METADATA_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = moorhen_util::fs::read_to_string_lossy(&path)
            .map_err(|e| InstallError::metadata_invalid(format!("Failed to read: {e}")))?;

        let meta = serde_json::from_str(&content)
            .map_err(|e| InstallError::metadata_invalid(format!("Invalid JSON: {e}")))?;
        Ok(Some(meta))
    }

    /// Persist the metadata record into a package directory.
    ///
    /// Written atomically with 2-space indentation so the record stays
    /// human-readable and never half-written.
    pub fn write(&self, dir: &Path) -> Result<(), InstallError> {
        let json = serde_json::to_string_pretty(self)?;
        moorhen_util::fs::atomic_write(&dir.join(METADATA_FILENAME), json.as_bytes())?;
        Ok(())
    }
}
