//! Distribution archives.
//!
//! Packages a verified build into a single zip whose only top-level entry is
//! the application directory: compiled artifacts, the library and its
//! manifest, asset collections, user data and the launcher.

mod archive;
mod types;

pub use archive::create_dist;
pub use types::*;
