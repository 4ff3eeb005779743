//! Manifest generation from a directory scan.

use std::path::Path;

use tracing::{debug, info};
use walkdir::{DirEntry, WalkDir};

use super::types::{Manifest, ManifestError};

/// Directory names never descended into.
const SKIPPED_DIRS: &[&str] = &["__pycache__"];

/// What a scan picks up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
  /// Name of the manifest file inside the scanned directory. Never listed.
  pub manifest_name: String,
  /// Build-metadata file names to leave out (e.g. generator scripts).
  pub exclude: Vec<String>,
  /// Only keep files with this extension (without the dot).
  pub extension: Option<String>,
  /// Descend into subdirectories.
  pub recursive: bool,
}

impl ScanOptions {
  pub fn new(manifest_name: impl Into<String>) -> Self {
    Self {
      manifest_name: manifest_name.into(),
      exclude: Vec::new(),
      extension: None,
      recursive: true,
    }
  }

  pub fn exclude<I, S>(mut self, names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.exclude.extend(names.into_iter().map(Into::into));
    self
  }

  /// Restrict to a single extension and a flat listing.
  pub fn flat_with_extension(mut self, extension: impl Into<String>) -> Self {
    self.extension = Some(extension.into());
    self.recursive = false;
    self
  }

  fn keeps_file(&self, rel_path: &str, entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();

    if rel_path == self.manifest_name || self.exclude.iter().any(|e| e.as_str() == name) {
      return false;
    }

    match &self.extension {
      Some(ext) => entry.path().extension().is_some_and(|e| e == ext.as_str()),
      None => true,
    }
  }
}

fn is_hidden_or_skipped(entry: &DirEntry) -> bool {
  // The scan root itself is never filtered; temp directories are often dot-named.
  if entry.depth() == 0 {
    return false;
  }
  let name = entry.file_name().to_string_lossy();
  name.starts_with('.') || (entry.file_type().is_dir() && SKIPPED_DIRS.contains(&&*name))
}

/// Scan `dir` and build a manifest without touching disk.
///
/// The result depends only on the directory contents, never on the order the
/// filesystem returns entries in.
pub fn scan(dir: &Path, options: &ScanOptions) -> Result<Manifest, ManifestError> {
  if !dir.is_dir() {
    return Err(ManifestError::DirectoryNotFound(dir.to_path_buf()));
  }

  let max_depth = if options.recursive { usize::MAX } else { 1 };
  let walker = WalkDir::new(dir)
    .min_depth(1)
    .max_depth(max_depth)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| !is_hidden_or_skipped(e));

  let mut entries = Vec::new();

  for entry in walker {
    let entry = entry.map_err(|e| ManifestError::Walk {
      path: dir.to_path_buf(),
      message: e.to_string(),
    })?;

    // Links to files are listed like the files themselves; linked directories are not entered.
    if !entry.path().is_file() {
      continue;
    }

    let rel_path = relative_entry(dir, entry.path())?;
    if options.keeps_file(&rel_path, &entry) {
      entries.push(rel_path);
    }
  }

  debug!(dir = %dir.display(), count = entries.len(), "scanned directory");
  Manifest::new(entries)
}

/// Scan `dir` and persist the manifest to `dir/<manifest_name>`, overwriting any previous one.
pub fn generate(dir: &Path, options: &ScanOptions) -> Result<Manifest, ManifestError> {
  let manifest = scan(dir, options)?;
  let path = dir.join(&options.manifest_name);
  manifest.save(&path)?;

  info!(path = %path.display(), entries = manifest.len(), "wrote manifest");
  Ok(manifest)
}

/// Relative path of `path` under `base`, joined with `/` on every platform.
fn relative_entry(base: &Path, path: &Path) -> Result<String, ManifestError> {
  let rel = path.strip_prefix(base).unwrap_or(path);
  let mut segments = Vec::new();
  for component in rel.components() {
    let segment = component
      .as_os_str()
      .to_str()
      .ok_or_else(|| ManifestError::NonUtf8Path(path.to_path_buf()))?;
    segments.push(segment);
  }
  Ok(segments.join("/"))
}
