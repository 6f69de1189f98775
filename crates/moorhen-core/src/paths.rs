//! Platform paths for the package store and project discovery.

use std::path::{Path, PathBuf};

/// Store layout version, bumped when the on-disk shape changes.
pub const STORE_VERSION: u32 = 1;

/// Find the project root by walking up from `cwd` looking for `package.json` or `.git`.
///
/// Returns the first directory containing either marker, or `None` if neither is found.
#[must_use]
pub fn project_root(cwd: &Path) -> Option<PathBuf> {
    let mut current = cwd.to_path_buf();

    loop {
        if current.join("package.json").exists() || current.join(".git").exists() {
            return Some(current);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Get the package store directory.
///
/// Fetched package content lives here; installs copy or hardlink out of it.
/// Uses platform-appropriate locations with versioning:
/// - Linux: `$XDG_CACHE_HOME/moorhen/v{N}/packages` or `~/.cache/moorhen/v{N}/packages`
/// - macOS: `~/Library/Caches/moorhen/v{N}/packages`
/// - Windows: `%LOCALAPPDATA%\moorhen\v{N}\packages`
#[must_use]
pub fn store_dir() -> PathBuf {
    let base = dirs_next::cache_dir().map_or_else(
        || {
            dirs_next::home_dir().map_or_else(
                || PathBuf::from(".moorhen-cache"),
                |p| p.join(".cache").join("moorhen"),
            )
        },
        |p| p.join("moorhen"),
    );

    base.join(format!("v{STORE_VERSION}")).join("packages")
}
