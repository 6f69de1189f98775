//! Runtime configuration for the install engine.

use crate::constants::MODULES_FOLDER;
use crate::paths;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Install configuration.
///
/// Built once per run (by the CLI or by tests) and shared read-only across
/// the fetch, materialization, and bin-link phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project working directory; managed install roots are resolved
    /// relative to it.
    pub cwd: PathBuf,

    /// Override for the modules folder (`--modules-folder`). When unset the
    /// shared root `.bin` lives under `cwd/node_modules`.
    pub modules_folder: Option<PathBuf>,

    /// Whether to link executable scripts into `.bin` directories.
    pub bin_links: bool,

    /// Tolerate malformed version strings during peer validation.
    pub loose_semver: bool,

    /// Folder names managed by the installer under `cwd`. Entries in these
    /// folders that aren't part of the hoisted tree get removed.
    pub registry_folders: Vec<String>,

    /// Root of the package store holding fetched content.
    pub store_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cwd: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            modules_folder: None,
            bin_links: true,
            loose_semver: false,
            registry_folders: vec![MODULES_FOLDER.to_string()],
            store_root: paths::store_dir(),
        }
    }
}

impl Config {
    /// Create a new config with the given working directory.
    #[must_use]
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            ..Default::default()
        }
    }

    /// Set whether bin links are created.
    #[must_use]
    pub fn with_bin_links(mut self, bin_links: bool) -> Self {
        self.bin_links = bin_links;
        self
    }

    /// Set loose semver mode.
    #[must_use]
    pub fn with_loose_semver(mut self, loose: bool) -> Self {
        self.loose_semver = loose;
        self
    }

    /// Override the modules folder.
    #[must_use]
    pub fn with_modules_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.modules_folder = folder;
        self
    }

    /// Override the package store root.
    #[must_use]
    pub fn with_store_root(mut self, root: PathBuf) -> Self {
        self.store_root = root;
        self
    }

    /// Name of the dependency-storage folder used under packages.
    #[must_use]
    pub fn dependencies_folder(&self) -> &str {
        self.registry_folders
            .first()
            .map_or(MODULES_FOLDER, String::as_str)
    }

    /// The modules folder receiving top-level installs.
    #[must_use]
    pub fn modules_dir(&self) -> PathBuf {
        self.modules_folder
            .clone()
            .unwrap_or_else(|| self.cwd.join(self.dependencies_folder()))
    }

    /// Store location of a fetched package's content.
    ///
    /// Scoped names nest under their scope directory:
    /// `@scope/name` -> `<store>/@scope/name/<version>/package`.
    #[must_use]
    pub fn store_path(&self, name: &str, version: &str) -> PathBuf {
        let base = if name.starts_with('@') {
            let parts: Vec<&str> = name.splitn(2, '/').collect();
            if parts.len() == 2 {
                self.store_root.join(parts[0]).join(parts[1])
            } else {
                self.store_root.join(name)
            }
        } else {
            self.store_root.join(name)
        };
        base.join(version).join("package")
    }

    /// Managed install roots under `cwd`, in configured order.
    #[must_use]
    pub fn registry_roots(&self) -> Vec<PathBuf> {
        self.registry_folders
            .iter()
            .map(|folder| self.cwd.join(folder))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modules_dir_default() {
        let config = Config::new(PathBuf::from("/proj"));
        assert_eq!(config.modules_dir(), PathBuf::from("/proj/node_modules"));
    }

    #[test]
    fn test_modules_dir_override() {
        let config = Config::new(PathBuf::from("/proj"))
            .with_modules_folder(Some(PathBuf::from("/elsewhere/mods")));
        assert_eq!(config.modules_dir(), PathBuf::from("/elsewhere/mods"));
    }

    #[test]
    fn test_store_path_unscoped() {
        let config = Config::new(PathBuf::from("/proj")).with_store_root(PathBuf::from("/store"));
        assert_eq!(
            config.store_path("react", "18.2.0"),
            PathBuf::from("/store/react/18.2.0/package")
        );
    }

    #[test]
    fn test_store_path_scoped() {
        let config = Config::new(PathBuf::from("/proj")).with_store_root(PathBuf::from("/store"));
        assert_eq!(
            config.store_path("@types/node", "20.0.0"),
            PathBuf::from("/store/@types/node/20.0.0/package")
        );
    }

    #[test]
    fn test_registry_roots() {
        let config = Config::new(PathBuf::from("/proj"));
        assert_eq!(
            config.registry_roots(),
            vec![PathBuf::from("/proj/node_modules")]
        );
    }
}
