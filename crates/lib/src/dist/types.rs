use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::consts::ARCHIVE_EXTENSION;
use crate::manifest::ManifestError;
use crate::util::hash::ContentHash;

/// Errors that abort archive creation.
#[derive(Debug, Error)]
pub enum DistError {
  #[error("invalid archive name {}: expected a file name", .0.display())]
  InvalidOutput(PathBuf),

  #[error("path is not valid UTF-8: {}", .0.display())]
  NonUtf8Path(PathBuf),

  #[error("I/O error on {}: {source}", .path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write archive {}: {source}", .path.display())]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },

  #[error(transparent)]
  Manifest(#[from] ManifestError),
}

/// Where the archive goes and what its top-level directory is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistSpec {
  archive: PathBuf,
  subdir: String,
}

impl DistSpec {
  /// Derive the archive path and subdirectory from a requested output name.
  ///
  /// A missing `.zip` suffix is appended; the subdirectory is the stem of the
  /// corrected file name, so `keykit-web` and `keykit-web.zip` both yield
  /// `keykit-web.zip` containing `keykit-web/`.
  pub fn new(output: impl Into<PathBuf>) -> Result<Self, DistError> {
    let mut archive = output.into();

    let file_name = archive
      .file_name()
      .ok_or_else(|| DistError::InvalidOutput(archive.clone()))?
      .to_str()
      .ok_or_else(|| DistError::NonUtf8Path(archive.clone()))?
      .to_string();

    let suffix = format!(".{}", ARCHIVE_EXTENSION);
    let subdir = match file_name.strip_suffix(&suffix) {
      Some(stem) => stem.to_string(),
      None => {
        archive.set_file_name(format!("{}{}", file_name, suffix));
        file_name
      }
    };

    if subdir.is_empty() || subdir.starts_with('.') {
      return Err(DistError::InvalidOutput(archive));
    }

    Ok(Self { archive, subdir })
  }

  pub fn archive(&self) -> &Path {
    &self.archive
  }

  /// Name of the archive's single top-level directory.
  pub fn subdir(&self) -> &str {
    &self.subdir
  }
}

/// A file the archive should have carried but that was absent on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetMissing {
  /// Member name it would have had, relative to the subdirectory.
  pub member: String,
  pub path: PathBuf,
}

impl fmt::Display for AssetMissing {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} not found at {}, skipped", self.member, self.path.display())
  }
}

/// Outcome of writing an archive.
#[derive(Debug, Clone, Serialize)]
pub struct DistReport {
  pub archive: PathBuf,
  pub subdir: String,
  /// Member names in archive order, each prefixed with `subdir/`.
  pub entries: Vec<String>,
  pub warnings: Vec<AssetMissing>,
  /// Archive size in bytes.
  pub size: u64,
  pub sha256: ContentHash,
}
