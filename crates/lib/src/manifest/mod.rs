//! Runtime file manifests.
//!
//! A manifest lists, relative to a base directory, the files that must be
//! shipped for the application to run. Library manifests are generated during
//! the build and persisted next to the files they describe; asset-collection
//! manifests are computed while archiving.

mod scan;
mod types;

pub use scan::{ScanOptions, generate, scan};
pub use types::*;
