//! Executable script linking into `.bin` directories.
//!
//! Two platform variants, selected once at startup: symlink + chmod where
//! symlinks are first-class, generated shim scripts on Windows.

use crate::config::Config;
use crate::constants::BIN_FOLDER;
use crate::error::InstallError;
use crate::fsops;
use crate::manifest::Manifest;
use crate::resolution::{PackageId, ResolutionGraph};
use std::fs;
use std::path::Path;
use tracing::debug;

/// How executables get wired on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinLinkStrategy {
    /// Symbolic link from the bin entry to the script, marked executable.
    Symlink,
    /// Generated `.cmd`/`sh` shim pair invoking the script through node.
    Shim,
}

impl BinLinkStrategy {
    /// Pick the strategy for the current platform.
    #[must_use]
    pub fn for_platform() -> Self {
        if cfg!(windows) {
            Self::Shim
        } else {
            Self::Symlink
        }
    }

    /// Create one executable entry point at `dest` pointing at `src`.
    pub fn link_bin(self, src: &Path, dest: &Path) -> Result<(), InstallError> {
        match self {
            Self::Symlink => {
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        InstallError::bin_link_failed(format!(
                            "Failed to create {}: {e}",
                            parent.display()
                        ))
                    })?;
                }
                // Replace a stale entry from a previous install
                if fs::symlink_metadata(dest).is_ok() {
                    fsops::remove_path(dest)?;
                }
                symlink_file(src, dest)?;
                fsops::chmod_executable(dest)
            }
            Self::Shim => write_shims(src, dest),
        }
    }
}

#[cfg(unix)]
fn symlink_file(src: &Path, dest: &Path) -> Result<(), InstallError> {
    std::os::unix::fs::symlink(src, dest).map_err(|e| {
        InstallError::bin_link_failed(format!(
            "Failed to symlink {} to {}: {e}",
            dest.display(),
            src.display()
        ))
    })
}

#[cfg(not(unix))]
fn symlink_file(src: &Path, dest: &Path) -> Result<(), InstallError> {
    // Fall back to a shim pair where file symlinks aren't reliable
    write_shims(src, dest)
}

/// Write a `cmd` shim plus an `sh` shim so the command works from both
/// shells (what `cmd-shim` does in the npm ecosystem).
fn write_shims(src: &Path, dest: &Path) -> Result<(), InstallError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| InstallError::bin_link_failed(e.to_string()))?;
    }

    let cmd = format!("@ECHO off\r\nnode \"{}\" %*\r\n", src.display());
    fs::write(dest.with_extension("cmd"), cmd)
        .map_err(|e| InstallError::bin_link_failed(e.to_string()))?;

    let sh = format!("#!/bin/sh\nexec node \"{}\" \"$@\"\n", src.display());
    fs::write(dest, sh).map_err(|e| InstallError::bin_link_failed(e.to_string()))?;
    fsops::chmod_executable(dest)
}

/// Link a package's own declared bin scripts into a bin directory.
///
/// Both paths are resolved to their canonical real paths first: nested
/// hoisting can place a package behind symlink hops, and an entry point
/// must target a real, stable path, not a chain of links. Bin entries
/// whose script doesn't exist on disk are skipped.
pub fn link_self_dependencies(
    strategy: BinLinkStrategy,
    pkg: &Manifest,
    pkg_loc: &Path,
    target_bin_loc: &Path,
) -> Result<(), InstallError> {
    let target_bin_loc = dunce::canonicalize(target_bin_loc).map_err(|e| {
        InstallError::bin_link_failed(format!(
            "Failed to resolve {}: {e}",
            target_bin_loc.display()
        ))
    })?;
    let pkg_loc = dunce::canonicalize(pkg_loc).map_err(|e| {
        InstallError::bin_link_failed(format!("Failed to resolve {}: {e}", pkg_loc.display()))
    })?;

    for (script_name, script_path) in pkg.bin_entries() {
        let src = pkg_loc.join(&script_path);
        if !src.exists() {
            // TODO maybe warn here; npm packages declare conditional bins
            // often enough that erroring would break real installs
            continue;
        }
        strategy.link_bin(&src, &target_bin_loc.join(&script_name))?;
    }

    Ok(())
}

/// Link the bin scripts of a package's direct and bundled dependencies
/// into a `.bin` directory under `dir`.
///
/// Gives every installed package a private view of its dependencies'
/// executables, independent of the shared root `.bin`. Bundled dependency
/// manifests are read from disk since they are not part of the resolved
/// graph.
pub fn link_bin_dependencies(
    strategy: BinLinkStrategy,
    graph: &ResolutionGraph,
    config: &Config,
    package: PackageId,
    dir: &Path,
) -> Result<(), InstallError> {
    let manifest = graph.manifest(package);
    let reference = graph.reference(package);

    if reference.remote.is_none() {
        return Err(InstallError::contract("Package remote is missing"));
    }

    let mut deps: Vec<(Manifest, std::path::PathBuf)> = Vec::new();

    // bin scripts declared by direct dependencies
    for pattern in &reference.patterns {
        let dep_id = graph.strict_resolved_pattern(pattern)?;
        let dep = graph.manifest(dep_id);
        if !dep.has_bin() {
            continue;
        }
        match graph.reference(dep_id).location() {
            Some(loc) => deps.push((dep.clone(), loc.to_path_buf())),
            None => {
                // Lost its slot during flattening; nothing on disk to link
                debug!(pattern = %pattern, "skipping bin link for unplaced dependency");
            }
        }
    }

    // bin scripts in bundled dependencies, read from the installed tree
    if !manifest.bundle_dependencies.is_empty() {
        let base = reference
            .location()
            .ok_or_else(|| InstallError::contract("Package location is missing"))?
            .join(config.dependencies_folder());
        for dep_name in &manifest.bundle_dependencies {
            let loc = base.join(dep_name);
            let dep = Manifest::read(&loc)?;
            if dep.has_bin() {
                deps.push((dep, loc));
            }
        }
    }

    if deps.is_empty() {
        return Ok(());
    }

    let bin_loc = dir.join(BIN_FOLDER);
    fs::create_dir_all(&bin_loc).map_err(|e| {
        InstallError::bin_link_failed(format!("Failed to create {}: {e}", bin_loc.display()))
    })?;

    for (dep, loc) in &deps {
        link_self_dependencies(strategy, dep, loc, &bin_loc)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{BinField, PackageRemote, RemoteType};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn manifest_with_bin(name: &str, bins: &[(&str, &str)]) -> Manifest {
        let map: BTreeMap<String, String> = bins
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Manifest {
            name: name.to_string(),
            version: "1.0.0".to_string(),
            bin: if map.is_empty() {
                None
            } else {
                Some(BinField::Commands(map))
            },
            ..Manifest::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_link_bin_creates_executable_symlink() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let src = dir.path().join("cli.js");
        let dest = dir.path().join(".bin").join("mycli");
        fs::write(&src, "#!/usr/bin/env node\n").unwrap();

        BinLinkStrategy::Symlink.link_bin(&src, &dest).unwrap();

        assert!(moorhen_util::fs::is_symlink(&dest));
        assert_eq!(fs::read_link(&dest).unwrap(), src);
        // chmod follows the symlink, so check the target's bits
        let target_mode = fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(target_mode & 0o111, 0o111);
    }

    #[cfg(unix)]
    #[test]
    fn test_link_bin_replaces_stale_entry() {
        let dir = tempdir().unwrap();
        let old = dir.path().join("old.js");
        let new = dir.path().join("new.js");
        let dest = dir.path().join(".bin").join("mycli");
        fs::write(&old, "old").unwrap();
        fs::write(&new, "new").unwrap();

        BinLinkStrategy::Symlink.link_bin(&old, &dest).unwrap();
        BinLinkStrategy::Symlink.link_bin(&new, &dest).unwrap();

        assert_eq!(fs::read_link(&dest).unwrap(), new);
    }

    #[test]
    fn test_shim_strategy_writes_pair() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("cli.js");
        let dest = dir.path().join(".bin").join("mycli");
        fs::write(&src, "console.log(1)").unwrap();

        BinLinkStrategy::Shim.link_bin(&src, &dest).unwrap();

        let cmd = fs::read_to_string(dest.with_extension("cmd")).unwrap();
        assert!(cmd.contains("node"));
        assert!(cmd.contains("cli.js"));
        let sh = fs::read_to_string(&dest).unwrap();
        assert!(sh.starts_with("#!/bin/sh"));
    }

    #[cfg(unix)]
    #[test]
    fn test_link_self_dependencies_skips_missing_script() {
        let dir = tempdir().unwrap();
        let pkg_loc = dir.path().join("pkg");
        let bin_loc = dir.path().join(".bin");
        fs::create_dir_all(&pkg_loc).unwrap();
        fs::create_dir_all(&bin_loc).unwrap();
        fs::write(pkg_loc.join("real.js"), "x").unwrap();

        let pkg = manifest_with_bin("pkg", &[("real", "./real.js"), ("ghost", "./missing.js")]);

        link_self_dependencies(BinLinkStrategy::Symlink, &pkg, &pkg_loc, &bin_loc).unwrap();

        assert!(bin_loc.join("real").exists());
        assert!(!bin_loc.join("ghost").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_link_bin_dependencies_private_bin() {
        let dir = tempdir().unwrap();

        // Installed layout: node_modules/app and node_modules/tool
        let app_loc = dir.path().join("node_modules").join("app");
        let tool_loc = dir.path().join("node_modules").join("tool");
        fs::create_dir_all(&app_loc).unwrap();
        fs::create_dir_all(&tool_loc).unwrap();
        fs::write(tool_loc.join("cli.js"), "x").unwrap();

        let mut graph = ResolutionGraph::new();
        let app = graph.register_package(
            "app@1.0.0",
            manifest_with_bin("app", &[]),
            Some(PackageRemote {
                kind: RemoteType::Registry,
                ..PackageRemote::default()
            }),
        );
        let tool = graph.register_package(
            "tool@1.0.0",
            manifest_with_bin("tool", &[("tool", "./cli.js")]),
            None,
        );
        graph.reference_mut(app).add_dependency("tool@1.0.0");
        graph.reference_mut(app).set_location(app_loc.clone());
        graph.reference_mut(tool).set_location(tool_loc.clone());

        let config = Config::new(dir.path().to_path_buf());
        let bin_dir = app_loc.join("node_modules");
        fs::create_dir_all(&bin_dir).unwrap();

        link_bin_dependencies(BinLinkStrategy::Symlink, &graph, &config, app, &bin_dir).unwrap();

        let entry = bin_dir.join(".bin").join("tool");
        assert!(moorhen_util::fs::is_symlink(&entry));
        assert_eq!(
            fs::read_link(&entry).unwrap(),
            dunce::canonicalize(tool_loc.join("cli.js")).unwrap()
        );
    }

    #[test]
    fn test_link_bin_dependencies_missing_remote_is_contract_violation() {
        let dir = tempdir().unwrap();
        let mut graph = ResolutionGraph::new();
        let app = graph.register_package("app@1.0.0", manifest_with_bin("app", &[]), None);
        let config = Config::new(dir.path().to_path_buf());

        let err = link_bin_dependencies(
            BinLinkStrategy::Symlink,
            &graph,
            &config,
            app,
            dir.path(),
        )
        .unwrap_err();
        assert_eq!(
            err.code(),
            crate::install_codes::INSTALL_CONTRACT_VIOLATION
        );
    }

    #[test]
    fn test_platform_strategy_selection() {
        let strategy = BinLinkStrategy::for_platform();
        if cfg!(windows) {
            assert_eq!(strategy, BinLinkStrategy::Shim);
        } else {
            assert_eq!(strategy, BinLinkStrategy::Symlink);
        }
    }
}
