//! The manifest value and its on-disk format.
//!
//! A manifest is the registry of files a directory must ship at runtime. It is
//! persisted as a JSON array of relative paths:
//!
//! ```json
//! [
//!   "basic1.k",
//!   "tools/grid.k"
//! ]
//! ```
//!
//! Entries are always sorted and unique, so the serialized form of a given set
//! of files never changes between runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when generating, loading or saving manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// The directory to scan does not exist.
  #[error("directory not found: {}", .0.display())]
  DirectoryNotFound(PathBuf),

  /// Walking the directory failed part way through.
  #[error("failed to scan {}: {message}", .path.display())]
  Walk { path: PathBuf, message: String },

  /// A file name could not be represented as UTF-8.
  #[error("path is not valid UTF-8: {}", .0.display())]
  NonUtf8Path(PathBuf),

  /// An entry is absolute or escapes the base directory.
  #[error("unsafe manifest entry {0:?}: entries must be relative paths without '..'")]
  UnsafeEntry(String),

  /// Failed to read the manifest file.
  #[error("failed to read manifest {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Failed to write the manifest file.
  #[error("failed to write manifest {}: {source}", .path.display())]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The manifest file is not a JSON array of strings.
  #[error("failed to parse manifest {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  #[error("failed to serialize manifest: {0}")]
  Serialize(#[source] serde_json::Error),
}

/// An ordered, deduplicated list of relative file paths.
///
/// Construction normalizes the entries (lexicographic sort, duplicates dropped)
/// and rejects any entry that could resolve outside the base directory, so a
/// `Manifest` value is always safe to join onto its base.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Manifest {
  entries: Vec<String>,
}

impl Manifest {
  /// Build a manifest from arbitrary entries.
  pub fn new<I, S>(entries: I) -> Result<Self, ManifestError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let mut entries: Vec<String> = entries.into_iter().map(Into::into).collect();
    for entry in &entries {
      validate_entry(entry)?;
    }
    entries.sort();
    entries.dedup();
    Ok(Self { entries })
  }

  /// Entries in manifest order.
  pub fn entries(&self) -> &[String] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn contains(&self, entry: &str) -> bool {
    self.entries.binary_search_by(|e| e.as_str().cmp(entry)).is_ok()
  }

  /// Pair each entry with its location under `base`.
  pub fn resolve<'a>(&'a self, base: &'a Path) -> impl Iterator<Item = (&'a str, PathBuf)> + 'a {
    self
      .entries
      .iter()
      .map(move |entry| (entry.as_str(), base.join(entry)))
  }

  /// Serialize to the persisted form: a pretty-printed JSON array plus a trailing newline.
  pub fn to_json(&self) -> Result<String, ManifestError> {
    let mut json = serde_json::to_string_pretty(&self.entries).map_err(ManifestError::Serialize)?;
    json.push('\n');
    Ok(json)
  }

  /// Load a manifest from disk.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;

    serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
      path: path.to_path_buf(),
      source,
    })
  }

  /// Write the manifest to `path`, replacing any previous file.
  pub fn save(&self, path: &Path) -> Result<(), ManifestError> {
    let content = self.to_json()?;
    fs::write(path, content).map_err(|source| ManifestError::Write {
      path: path.to_path_buf(),
      source,
    })
  }
}

impl TryFrom<Vec<String>> for Manifest {
  type Error = ManifestError;

  fn try_from(entries: Vec<String>) -> Result<Self, Self::Error> {
    Manifest::new(entries)
  }
}

impl From<Manifest> for Vec<String> {
  fn from(manifest: Manifest) -> Self {
    manifest.entries
  }
}

/// Check that an entry is a relative path that stays below its base.
///
/// Rejected: empty strings, absolute paths, drive prefixes (`C:`), and any
/// empty, `.` or `..` segment. Both `/` and `\` count as separators; other
/// characters, colons included, are ordinary file-name characters.
pub fn validate_entry(entry: &str) -> Result<(), ManifestError> {
  let unsafe_entry = || ManifestError::UnsafeEntry(entry.to_string());

  if entry.is_empty() || entry.starts_with(['/', '\\']) || has_drive_prefix(entry) {
    return Err(unsafe_entry());
  }

  if entry
    .split(['/', '\\'])
    .any(|segment| segment.is_empty() || segment == "." || segment == "..")
  {
    return Err(unsafe_entry());
  }

  Ok(())
}

fn has_drive_prefix(entry: &str) -> bool {
  let bytes = entry.as_bytes();
  bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::TempDir;

  #[test]
  fn new_sorts_and_dedups() {
    let manifest = Manifest::new(["b.k", "a.k", "b.k", "sub/c.k"]).unwrap();
    assert_eq!(manifest.entries(), &["a.k", "b.k", "sub/c.k"]);
    assert!(manifest.contains("sub/c.k"));
    assert!(!manifest.contains("c.k"));
  }

  #[test]
  fn rejects_parent_traversal() {
    for bad in ["../secret", "a/../../b", "/etc/passwd", "a//b", "./a", "", "C:/x", "c:x", "..\\x", "\\share\\x"] {
      assert!(
        matches!(Manifest::new([bad]), Err(ManifestError::UnsafeEntry(_))),
        "{bad:?} should be rejected"
      );
    }
  }

  #[test]
  fn accepts_dotfile_names() {
    // Segments that merely start with a dot are fine; only `.` and `..` are not.
    assert!(validate_entry("music/.gitkeep").is_ok());
    assert!(validate_entry("a..b").is_ok());
  }

  #[test]
  fn accepts_colons_inside_names() {
    assert!(validate_entry("Track 1: intro.mid").is_ok());
    assert!(validate_entry("sub/12:30 take.k").is_ok());
  }

  #[test]
  fn json_format_is_sorted_array() {
    let manifest = Manifest::new(["z.k", "a.k"]).unwrap();
    assert_eq!(manifest.to_json().unwrap(), "[\n  \"a.k\",\n  \"z.k\"\n]\n");
  }

  #[test]
  fn save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("lib_manifest.json");

    let manifest = Manifest::new(["one.k", "two.k"]).unwrap();
    manifest.save(&path).unwrap();

    assert_eq!(Manifest::load(&path).unwrap(), manifest);
  }

  #[test]
  fn load_normalizes_unsorted_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("m.json");
    fs::write(&path, r#"["b.k", "a.k", "a.k"]"#).unwrap();

    let manifest = Manifest::load(&path).unwrap();
    assert_eq!(manifest.entries(), &["a.k", "b.k"]);
  }

  #[test]
  fn load_rejects_unsafe_entries() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("m.json");
    fs::write(&path, r#"["../../etc/passwd"]"#).unwrap();

    assert!(matches!(Manifest::load(&path), Err(ManifestError::Parse { .. })));
  }

  #[test]
  fn load_rejects_non_array() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("m.json");
    fs::write(&path, r#"{"files": []}"#).unwrap();

    assert!(matches!(Manifest::load(&path), Err(ManifestError::Parse { .. })));
  }

  #[test]
  fn load_missing_file() {
    let temp = TempDir::new().unwrap();
    let result = Manifest::load(&temp.path().join("nope.json"));
    assert!(matches!(result, Err(ManifestError::Read { .. })));
  }
}
