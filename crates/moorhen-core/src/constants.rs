//! Well-known filenames and install tuning constants.

/// Bookkeeping record written into every installed (non-link) package.
///
/// Holds the remote descriptor, registry name, content hash, and build
/// artifact list. Excluded from bulk-copy content comparison so it never
/// counts as "real" package content.
pub const METADATA_FILENAME: &str = ".moorhen-metadata.json";

/// Cached tarball basename, also excluded from bulk-copy comparison.
pub const TARBALL_FILENAME: &str = ".moorhen-tarball.tgz";

/// Name of the shared executables directory inside a modules folder.
pub const BIN_FOLDER: &str = ".bin";

/// Default modules folder managed by the installer.
pub const MODULES_FOLDER: &str = "node_modules";

/// Concurrent bin-link tasks during the post-copy pass.
///
/// Kept small: each task creates directories and symlinks, and fanning out
/// wider mostly contends on the filesystem.
pub const BIN_LINK_CONCURRENCY: usize = 4;

/// Concurrent file operations inside the bulk copy/hardlink executor.
pub const FS_CONCURRENCY: usize = 16;
