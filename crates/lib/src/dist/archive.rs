//! Archive assembly.
//!
//! Members are collected into a plan first, group by group, and only then
//! written. Every member gets the same timestamp and fixed permissions so the
//! same inputs always produce the same bytes.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::types::{AssetMissing, DistError, DistReport, DistSpec};
use crate::config::BuildConfig;
use crate::consts::PLACEHOLDER_MARKER;
use crate::manifest::{Manifest, ScanOptions, scan};
use crate::pipeline::VerifiedBuild;
use crate::util::hash::hash_file;

const FILE_MODE: u32 = 0o644;
const EXEC_MODE: u32 = 0o755;

#[derive(Debug)]
enum Contents {
  File(PathBuf),
  Bytes(Vec<u8>),
  Directory,
}

#[derive(Debug)]
struct Member {
  /// Path inside the subdirectory, `/`-separated.
  name: String,
  contents: Contents,
  mode: u32,
}

#[derive(Debug, Default)]
struct Plan {
  members: Vec<Member>,
  names: HashSet<String>,
  missing: Vec<AssetMissing>,
}

impl Plan {
  fn file(&mut self, name: impl Into<String>, path: PathBuf) {
    self.push(name.into(), Contents::File(path), FILE_MODE);
  }

  fn bytes(&mut self, name: impl Into<String>, data: Vec<u8>) {
    self.push(name.into(), Contents::Bytes(data), FILE_MODE);
  }

  /// Add `path` if it exists, otherwise record it as missing.
  fn optional_file(&mut self, name: impl Into<String>, path: PathBuf) {
    let name = name.into();
    if self.names.contains(&name) {
      debug!(member = %name, "already planned, skipping");
    } else if path.is_file() {
      self.file(name, path);
    } else {
      warn!(member = %name, path = %path.display(), "asset missing, skipping");
      self.missing.push(AssetMissing { member: name, path });
    }
  }

  /// The first member planned under a name wins; later ones are dropped.
  fn push(&mut self, name: String, contents: Contents, mode: u32) {
    if !self.names.insert(name.clone()) {
      debug!(member = %name, "already planned, skipping");
      return;
    }
    self.members.push(Member { name, contents, mode });
  }
}

/// Write the distribution archive for a verified build.
///
/// A pre-existing archive at the target path is replaced. Files the archive
/// should carry but that are absent are skipped and returned as warnings.
pub fn create_dist(config: &BuildConfig, build: &VerifiedBuild, target: &DistSpec) -> Result<DistReport, DistError> {
  let plan = plan(config, build)?;
  let archive = target.archive();

  match fs::remove_file(archive) {
    Ok(()) => debug!(path = %archive.display(), "removed previous archive"),
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(source) => {
      return Err(DistError::Io {
        path: archive.to_path_buf(),
        source,
      });
    }
  }

  if let Some(parent) = archive.parent().filter(|p| !p.as_os_str().is_empty()) {
    fs::create_dir_all(parent).map_err(|source| DistError::Io {
      path: parent.to_path_buf(),
      source,
    })?;
  }

  info!(archive = %archive.display(), members = plan.members.len(), "writing archive");
  let entries = write_archive(archive, target.subdir(), &plan.members)?;

  let io_err = |source| DistError::Io {
    path: archive.to_path_buf(),
    source,
  };
  let size = fs::metadata(archive).map_err(io_err)?.len();
  let sha256 = hash_file(archive).map_err(io_err)?;

  info!(
    archive = %archive.display(),
    size,
    sha256 = %sha256,
    warnings = plan.missing.len(),
    "archive complete"
  );

  Ok(DistReport {
    archive: archive.to_path_buf(),
    subdir: target.subdir().to_string(),
    entries,
    warnings: plan.missing,
    size,
    sha256,
  })
}

/// Collect every member in archive order.
fn plan(config: &BuildConfig, build: &VerifiedBuild) -> Result<Plan, DistError> {
  let mut plan = Plan::default();
  let root = config.project_root();
  let dist = config.dist();

  // Compiled application.
  let mut artifacts = Vec::with_capacity(build.artifacts().len());
  for path in build.artifacts() {
    artifacts.push((member_name(root, path)?, path.clone()));
  }
  artifacts.sort();
  for (name, path) in artifacts {
    plan.file(name, path);
  }

  let mut extras = dist.extra_files.clone();
  extras.sort();
  for name in extras {
    let path = root.join(&name);
    plan.optional_file(name, path);
  }

  // Library: the manifest, then everything it lists.
  let lib = config.lib();
  let lib_dir = config.lib_dir();
  let manifest = Manifest::load(build.lib_manifest())?;
  plan.file(join(&lib.dir, &lib.manifest), build.lib_manifest().to_path_buf());
  for (entry, path) in manifest.resolve(&lib_dir) {
    plan.optional_file(join(&lib.dir, entry), path);
  }

  // Auxiliary collections, each with a manifest generated now.
  for collection in &dist.assets {
    let dir = root.join(&collection.dir);
    if !dir.is_dir() {
      plan.missing.push(AssetMissing {
        member: collection.dir.clone(),
        path: dir.clone(),
      });
      warn!(collection = %collection.dir, path = %dir.display(), "asset collection missing, skipping");
      continue;
    }

    let options = ScanOptions::new(collection.manifest.clone()).flat_with_extension(collection.extension.clone());
    let listing = scan(&dir, &options)?;
    for (entry, path) in listing.resolve(&dir) {
      plan.file(join(&collection.dir, entry), path);
    }
    plan.bytes(
      join(&collection.dir, &collection.manifest),
      listing.to_json()?.into_bytes(),
    );
    debug!(collection = %collection.dir, files = listing.len(), "collection planned");
  }

  // User data, or empty placeholders when the project has none yet.
  let user_data = &dist.user_data;
  let user_dir = root.join(&user_data.dir);
  if user_dir.is_dir() {
    plan_tree(&mut plan, &user_dir, &user_data.dir)?;
  } else {
    for placeholder in &user_data.placeholders {
      let name = format!("{}/{}/{}", user_data.dir, placeholder, PLACEHOLDER_MARKER);
      plan.bytes(name, Vec::new());
    }
  }

  if let Some(launcher) = &dist.launcher {
    let path = root.join(launcher);
    if path.is_file() {
      plan.push(launcher.clone(), Contents::File(path), EXEC_MODE);
    } else {
      debug!(launcher = %launcher, "no launcher in project");
    }
  }

  Ok(plan)
}

/// Add every directory and file below `dir`, hidden ones included.
fn plan_tree(plan: &mut Plan, dir: &Path, prefix: &str) -> Result<(), DistError> {
  for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| DistError::Io {
      path: e.path().map(Path::to_path_buf).unwrap_or_else(|| dir.to_path_buf()),
      source: e.into(),
    })?;

    let rel = member_name(dir, entry.path())?;
    let name = join(prefix, &rel);
    if entry.file_type().is_dir() {
      plan.push(format!("{}/", name), Contents::Directory, EXEC_MODE);
    } else if entry.path().is_file() {
      plan.file(name, entry.into_path());
    }
  }
  Ok(())
}

fn write_archive(archive: &Path, subdir: &str, members: &[Member]) -> Result<Vec<String>, DistError> {
  let zip_err = |source| DistError::Zip {
    path: archive.to_path_buf(),
    source,
  };

  let file = File::create(archive).map_err(|source| DistError::Io {
    path: archive.to_path_buf(),
    source,
  })?;
  let mut zip = ZipWriter::new(file);

  let mut entries = Vec::with_capacity(members.len());
  for member in members {
    let name = join(subdir, &member.name);
    let options = member_options(member.mode);

    match &member.contents {
      Contents::Directory => zip.add_directory(name.as_str(), options).map_err(zip_err)?,
      Contents::Bytes(data) => {
        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        zip.write_all(data).map_err(|e| zip_err(e.into()))?;
      }
      Contents::File(path) => {
        let mut source = File::open(path).map_err(|source| DistError::Io {
          path: path.clone(),
          source,
        })?;
        zip.start_file(name.as_str(), options).map_err(zip_err)?;
        io::copy(&mut source, &mut zip).map_err(|e| zip_err(e.into()))?;
      }
    }

    info!(member = %name, "added");
    entries.push(name);
  }

  zip.finish().map_err(zip_err)?;
  Ok(entries)
}

/// Deflated, stamped with the 1980-01-01 ZIP epoch.
fn member_options(mode: u32) -> SimpleFileOptions {
  SimpleFileOptions::default()
    .compression_method(CompressionMethod::Deflated)
    .last_modified_time(DateTime::default())
    .unix_permissions(mode)
}

/// `/`-joined path of `path` relative to `base`.
fn member_name(base: &Path, path: &Path) -> Result<String, DistError> {
  let rel = path.strip_prefix(base).unwrap_or(path);
  let parts = rel
    .components()
    .map(|c| c.as_os_str().to_str().ok_or_else(|| DistError::NonUtf8Path(path.to_path_buf())))
    .collect::<Result<Vec<_>, _>>()?;
  Ok(parts.join("/"))
}

fn join(prefix: &str, name: &str) -> String {
  let prefix = prefix.trim_end_matches('/');
  if prefix.is_empty() {
    name.to_string()
  } else {
    format!("{}/{}", prefix, name)
  }
}
