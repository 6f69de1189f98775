//! Install engine error types.

use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading serialized inputs (config, resolution graphs).
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read resolution graph at {path}: {source}")]
    GraphRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse resolution graph at {path}: {source}")]
    GraphParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Install error codes.
pub mod codes {
    pub const INSTALL_CONTRACT_VIOLATION: &str = "INSTALL_CONTRACT_VIOLATION";
    pub const INSTALL_PATTERN_NOT_FOUND: &str = "INSTALL_PATTERN_NOT_FOUND";
    pub const INSTALL_MANIFEST_NOT_FOUND: &str = "INSTALL_MANIFEST_NOT_FOUND";
    pub const INSTALL_MANIFEST_INVALID: &str = "INSTALL_MANIFEST_INVALID";
    pub const INSTALL_METADATA_INVALID: &str = "INSTALL_METADATA_INVALID";
    pub const INSTALL_FETCH_FAILED: &str = "INSTALL_FETCH_FAILED";
    pub const INSTALL_COPY_FAILED: &str = "INSTALL_COPY_FAILED";
    pub const INSTALL_LINK_FAILED: &str = "INSTALL_LINK_FAILED";
    pub const INSTALL_BIN_LINK_FAILED: &str = "INSTALL_BIN_LINK_FAILED";
    pub const INSTALL_IO_ERROR: &str = "INSTALL_IO_ERROR";
}

/// Install engine error.
///
/// Carries a stable SCREAMING_SNAKE_CASE code alongside a human-readable
/// message, matching the rest of the toolchain's error surface.
#[derive(Debug)]
pub struct InstallError {
    code: &'static str,
    message: String,
}

impl InstallError {
    /// Create a new error with the given code and message.
    #[must_use]
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Get the error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// Get the error message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a contract violation error.
    ///
    /// These indicate an upstream resolver/hoister bug (missing reference,
    /// missing remote), not a recoverable runtime condition; they abort the
    /// entire install pass.
    pub fn contract(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_CONTRACT_VIOLATION, msg)
    }

    /// Create a pattern-not-found error.
    #[must_use]
    pub fn pattern_not_found(pattern: &str) -> Self {
        Self::new(
            codes::INSTALL_PATTERN_NOT_FOUND,
            format!("Couldn't find resolved name/version for {pattern}"),
        )
    }

    /// Create a manifest not found error.
    #[must_use]
    pub fn manifest_not_found(path: &std::path::Path) -> Self {
        Self::new(
            codes::INSTALL_MANIFEST_NOT_FOUND,
            format!("package.json not found: {}", path.display()),
        )
    }

    /// Create a manifest invalid error.
    pub fn manifest_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_MANIFEST_INVALID, msg)
    }

    /// Create a metadata invalid error.
    pub fn metadata_invalid(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_METADATA_INVALID, msg)
    }

    /// Create a fetch failed error.
    pub fn fetch_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_FETCH_FAILED, msg)
    }

    /// Create a copy failed error.
    pub fn copy_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_COPY_FAILED, msg)
    }

    /// Create a link failed error.
    pub fn link_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_LINK_FAILED, msg)
    }

    /// Create a bin link failed error.
    pub fn bin_link_failed(msg: impl Into<String>) -> Self {
        Self::new(codes::INSTALL_BIN_LINK_FAILED, msg)
    }
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for InstallError {}

impl From<io::Error> for InstallError {
    fn from(e: io::Error) -> Self {
        Self::new(codes::INSTALL_IO_ERROR, e.to_string())
    }
}

impl From<serde_json::Error> for InstallError {
    fn from(e: serde_json::Error) -> Self {
        Self::new(
            codes::INSTALL_METADATA_INVALID,
            format!("Invalid JSON: {e}"),
        )
    }
}
