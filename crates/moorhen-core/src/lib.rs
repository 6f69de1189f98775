#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]

//! Install engine for moorhen.
//!
//! Provides the materialization stage of an install: given an
//! already-resolved dependency graph and a flattened placement plan, it
//! writes packages into `node_modules`, deduplicates identical package
//! content with hardlinks, removes stale entries from previous installs,
//! validates peer dependencies against the request ancestry, and wires
//! executable scripts into `.bin` directories.
//!
//! Version selection and tree flattening live upstream; this crate consumes
//! their outputs through [`resolution::ResolutionGraph`] and the
//! [`hoist::Hoister`] seam.

pub mod bin;
pub mod config;
pub mod constants;
pub mod error;
pub mod fetch;
pub mod fsops;
pub mod hoist;
pub mod linker;
pub mod manifest;
pub mod paths;
pub mod ranges;
pub mod resolution;

pub use config::Config;
pub use error::{codes as install_codes, Error, InstallError};
pub use fetch::{FetchLifecycle, FetchedContent, FetchedPackage, Fetcher};
pub use hoist::{FlatHoister, HoistedTuple, Hoister};
pub use linker::PackageLinker;
pub use manifest::{Manifest, PackageRemote, RemoteType};
pub use resolution::{PackageId, PackageReference, Request, RequestId, ResolutionGraph};
