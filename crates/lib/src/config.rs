//! Project configuration.
//!
//! A project is a directory holding a `wasmdist.json` file. Every key in the
//! file is optional; the defaults describe the KeyKit web build:
//!
//! ```json
//! {
//!   "toolchain": "/opt/emsdk/upstream/emscripten/emcc",
//!   "compile": {
//!     "output": "keykit.html",
//!     "sources": ["src/main.c", "src/mdep_wasm.c"],
//!     "optLevel": "2",
//!     "debugInfo": false
//!   },
//!   "lib": { "dir": "lib", "exclude": ["generate_manifest.py"] },
//!   "dist": { "extraFiles": ["keykit.ico"], "launcher": "serve.py" }
//! }
//! ```
//!
//! The file is read once into a [`BuildConfig`], which also carries the
//! resolved toolchain path. Nothing mutates a `BuildConfig` after it is built.

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::consts::{BUILD_LOG_FILENAME, LIB_MANIFEST_FILENAME, PROJECT_FILENAME};
use crate::toolchain::{GENERATED_SETTINGS, REQUIRED_SETTINGS, setting_name};

/// Environment variable naming the compiler executable directly.
pub const TOOLCHAIN_ENV: &str = "EMCC";

/// Environment variable pointing at an emsdk checkout.
pub const EMSDK_ENV: &str = "EMSDK";

#[cfg(windows)]
const TOOLCHAIN_BINARY: &str = "emcc.bat";
#[cfg(not(windows))]
const TOOLCHAIN_BINARY: &str = "emcc";

/// Errors raised before any build step runs.
#[derive(Debug, Error)]
pub enum ConfigError {
  /// The working directory is not a project.
  #[error("{} is not a project directory (expected to find {expected})", .dir.display())]
  NotAProject { dir: PathBuf, expected: &'static str },

  #[error("failed to read {}: {source}", .path.display())]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to parse {}: {source}", .path.display())]
  Parse {
    path: PathBuf,
    #[source]
    source: serde_json::Error,
  },

  /// An explicitly named toolchain does not exist.
  #[error("toolchain not found at {} (from {origin})", .path.display())]
  ToolchainMissing { path: PathBuf, origin: &'static str },

  /// No toolchain could be discovered at all.
  #[error(
    "could not locate {}: pass --toolchain, set \"toolchain\" in {}, or set {} or {}",
    TOOLCHAIN_BINARY,
    PROJECT_FILENAME,
    TOOLCHAIN_ENV,
    EMSDK_ENV
  )]
  ToolchainNotFound,

  #[error("invalid compile settings: {0}")]
  InvalidCompileSettings(String),

  #[error("missing source files: {}", display_paths(.0))]
  MissingSources(Vec<PathBuf>),
}

fn display_paths(paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Compiler settings as written in the project file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileSettings {
  /// Primary output; `.html` or `.js`.
  pub output: String,
  pub sources: Vec<PathBuf>,
  pub include_dirs: Vec<PathBuf>,
  pub js_library: Option<PathBuf>,
  pub shell_file: Option<PathBuf>,
  /// Entry points the host calls back into (C symbol names, `_`-prefixed).
  pub exported_functions: Vec<String>,
  /// Runtime helpers the host page needs on the module object.
  pub exported_runtime_methods: Vec<String>,
  /// Extra `-s NAME=VALUE` settings on top of the mandatory ones.
  pub settings: Vec<String>,
  pub link_libraries: Vec<String>,
  pub defines: Vec<String>,
  pub extra_flags: Vec<String>,
  pub debug_info: bool,
  pub opt_level: String,
}

impl Default for CompileSettings {
  fn default() -> Self {
    let sources = [
      "main", "util", "misc", "phrase", "sym", "keyto", "yacc", "code", "code2", "grid", "view", "menu", "task",
      "fifo", "mfin", "real", "kwind", "fsm", "bltin", "meth", "regex", "mdep_wasm",
    ]
    .iter()
    .map(|name| PathBuf::from("src").join(format!("{}.c", name)))
    .collect();

    Self {
      output: "keykit.html".to_string(),
      sources,
      include_dirs: vec![PathBuf::from("src")],
      js_library: Some(PathBuf::from("keykit_library.js")),
      shell_file: Some(PathBuf::from("keykit_shell.html")),
      exported_functions: strings(&[
        "_main",
        "_mdep_on_midi_message",
        "_mdep_on_mouse_move",
        "_mdep_on_mouse_button",
        "_mdep_on_key_event",
        "_mdep_on_window_resize",
        "_mdep_on_nats_message",
        "_mdep_on_websocket_event",
      ]),
      exported_runtime_methods: strings(&[
        "ccall",
        "cwrap",
        "getValue",
        "setValue",
        "UTF8ToString",
        "FS",
        "IDBFS",
        "HEAPU8",
      ]),
      settings: strings(&["ASSERTIONS=1"]),
      link_libraries: strings(&["idbfs.js", "m"]),
      defines: strings(&["__EMSCRIPTEN__"]),
      extra_flags: strings(&[
        "-Wno-implicit-function-declaration",
        "-Wno-int-conversion",
        "-Wno-incompatible-pointer-types",
        "-Wno-return-type",
      ]),
      debug_info: true,
      opt_level: "0".to_string(),
    }
  }
}

impl CompileSettings {
  /// Reject settings the compiled application cannot run with.
  pub fn validate(&self) -> Result<(), ConfigError> {
    let invalid = |msg: String| Err(ConfigError::InvalidCompileSettings(msg));

    if self.sources.is_empty() {
      return invalid("no source files listed".to_string());
    }

    if !(self.output.ends_with(".html") || self.output.ends_with(".js")) || self.output.contains(['/', '\\']) {
      return invalid(format!("output {:?} must be a bare .html or .js file name", self.output));
    }

    if !self.exported_functions.iter().any(|f| f == "_main") {
      return invalid("exported functions must include _main".to_string());
    }

    for name in &self.exported_functions {
      let is_symbol = name.strip_prefix('_').is_some_and(is_identifier);
      if !is_symbol {
        return invalid(format!("exported function {:?} is not an _-prefixed C identifier", name));
      }
    }

    for name in &self.exported_runtime_methods {
      if !is_identifier(name) {
        return invalid(format!("runtime method {:?} is not an identifier", name));
      }
    }

    for setting in &self.settings {
      if setting_name(setting).is_empty() || is_reserved_setting(setting) {
        return invalid(format!("setting {:?} cannot be overridden", setting));
      }
    }

    // `-s NAME=VALUE` and `-sNAME=VALUE` in extra flags land after the mandatory
    // settings on the command line, where the last occurrence wins.
    let mut flags = self.extra_flags.iter();
    while let Some(flag) = flags.next() {
      let setting = match flag.strip_prefix("-s") {
        Some("") => flags.next().map(String::as_str).unwrap_or_default(),
        Some(setting) => setting,
        None => continue,
      };
      if is_reserved_setting(setting) {
        return invalid(format!("extra flag {:?} overrides a mandatory setting", flag));
      }
    }

    if !self.opt_level.is_empty() && !matches!(self.opt_level.as_str(), "0" | "1" | "2" | "3" | "s" | "z" | "g") {
      return invalid(format!("unknown optimization level {:?}", self.opt_level));
    }

    Ok(())
  }
}

/// Whether `setting` names a mandatory or generated setting, including its `NO_` form.
fn is_reserved_setting(setting: &str) -> bool {
  let name = setting_name(setting);
  let name = name.strip_prefix("NO_").unwrap_or(name);
  REQUIRED_SETTINGS.iter().any(|r| setting_name(r) == name) || GENERATED_SETTINGS.contains(&name)
}

fn is_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
    && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn strings(values: &[&str]) -> Vec<String> {
  values.iter().map(|s| s.to_string()).collect()
}

/// The runtime library directory and its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LibSettings {
  /// Relative to the project root; also the directory name inside the archive.
  pub dir: String,
  pub manifest: String,
  /// Build-metadata files that never ship.
  pub exclude: Vec<String>,
}

impl Default for LibSettings {
  fn default() -> Self {
    Self {
      dir: "lib".to_string(),
      manifest: LIB_MANIFEST_FILENAME.to_string(),
      exclude: strings(&["generate_manifest.py"]),
    }
  }
}

/// A directory of loose assets shipped with a manifest generated at archive time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetCollection {
  pub dir: String,
  pub extension: String,
  pub manifest: String,
}

/// Directory of user files that keeps its shape in every archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UserDataSettings {
  pub dir: String,
  /// Subdirectories created with placeholder markers when `dir` is absent.
  pub placeholders: Vec<String>,
}

impl Default for UserDataSettings {
  fn default() -> Self {
    Self {
      dir: "local".to_string(),
      placeholders: strings(&["music", "pages"]),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DistSettings {
  /// Application files archived when present (warned about when not).
  pub extra_files: Vec<String>,
  pub assets: Vec<AssetCollection>,
  pub user_data: UserDataSettings,
  pub launcher: Option<String>,
}

impl Default for DistSettings {
  fn default() -> Self {
    Self {
      extra_files: strings(&["keykit.ico"]),
      assets: vec![AssetCollection {
        dir: "music".to_string(),
        extension: "mid".to_string(),
        manifest: "music_manifest.json".to_string(),
      }],
      user_data: UserDataSettings::default(),
      launcher: Some("serve.py".to_string()),
    }
  }
}

/// Contents of `wasmdist.json`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProjectFile {
  pub toolchain: Option<PathBuf>,
  pub compile: CompileSettings,
  pub lib: LibSettings,
  pub dist: DistSettings,
  pub build_log: Option<PathBuf>,
}

impl ProjectFile {
  /// Read the project file from `dir`.
  ///
  /// A missing file means `dir` is not a project.
  pub fn load(dir: &Path) -> Result<Self, ConfigError> {
    let path = dir.join(PROJECT_FILENAME);

    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => {
        return Err(ConfigError::NotAProject {
          dir: dir.to_path_buf(),
          expected: PROJECT_FILENAME,
        });
      }
      Err(source) => return Err(ConfigError::Read { path, source }),
    };

    serde_json::from_str(&content).map_err(|source| ConfigError::Parse { path, source })
  }
}

/// Resolved configuration for one pipeline run.
#[derive(Debug, Clone)]
pub struct BuildConfig {
  project_root: PathBuf,
  toolchain: PathBuf,
  compile: CompileSettings,
  lib: LibSettings,
  dist: DistSettings,
  build_log: PathBuf,
}

impl BuildConfig {
  /// Load the project in `project_root`, resolving the toolchain.
  ///
  /// `toolchain_override` takes precedence over every other source.
  pub fn load(project_root: &Path, toolchain_override: Option<&Path>) -> Result<Self, ConfigError> {
    let project = ProjectFile::load(project_root)?;
    let toolchain = locate_toolchain(project_root, toolchain_override, project.toolchain.as_deref())?;
    Self::new(project_root, project, toolchain)
  }

  /// Build a configuration from an already-parsed project file.
  pub fn new(project_root: &Path, project: ProjectFile, toolchain: PathBuf) -> Result<Self, ConfigError> {
    project.compile.validate()?;

    let build_log = project
      .build_log
      .unwrap_or_else(|| PathBuf::from(BUILD_LOG_FILENAME));

    Ok(Self {
      project_root: project_root.to_path_buf(),
      toolchain,
      compile: project.compile,
      lib: project.lib,
      dist: project.dist,
      build_log: project_root.join(build_log),
    })
  }

  pub fn project_root(&self) -> &Path {
    &self.project_root
  }

  pub fn toolchain(&self) -> &Path {
    &self.toolchain
  }

  pub fn compile(&self) -> &CompileSettings {
    &self.compile
  }

  pub fn lib(&self) -> &LibSettings {
    &self.lib
  }

  pub fn dist(&self) -> &DistSettings {
    &self.dist
  }

  /// Absolute path of the compiler log.
  pub fn build_log(&self) -> &Path {
    &self.build_log
  }

  pub fn lib_dir(&self) -> PathBuf {
    self.project_root.join(&self.lib.dir)
  }

  pub fn lib_manifest_path(&self) -> PathBuf {
    self.lib_dir().join(&self.lib.manifest)
  }

  /// Compiled outputs the toolchain promises, as file names in the project root.
  ///
  /// `X.html` promises `X.html`, `X.js` and `X.wasm`; `X.js` promises `X.js` and `X.wasm`.
  pub fn artifact_names(&self) -> Vec<String> {
    let output = &self.compile.output;
    match output.strip_suffix(".html") {
      Some(stem) => vec![output.clone(), format!("{}.js", stem), format!("{}.wasm", stem)],
      None => {
        let stem = output.strip_suffix(".js").unwrap_or(output);
        vec![output.clone(), format!("{}.wasm", stem)]
      }
    }
  }

  /// Absolute paths of the compiled outputs.
  pub fn artifact_paths(&self) -> Vec<PathBuf> {
    self
      .artifact_names()
      .iter()
      .map(|name| self.project_root.join(name))
      .collect()
  }
}

/// Find the compiler executable.
///
/// Order: explicit override, the project file's `toolchain`, `$EMCC`,
/// `$EMSDK/upstream/emscripten/emcc`, then `emcc` on `PATH`. A path given
/// through the first three sources must exist; later sources are only probed.
pub fn locate_toolchain(
  project_root: &Path,
  explicit: Option<&Path>,
  configured: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
  if let Some(path) = explicit {
    return require_toolchain(project_root, path, "--toolchain");
  }

  if let Some(path) = configured {
    return require_toolchain(project_root, path, PROJECT_FILENAME);
  }

  if let Some(value) = env::var_os(TOOLCHAIN_ENV).filter(|v| !v.is_empty()) {
    return require_toolchain(project_root, Path::new(&value), TOOLCHAIN_ENV);
  }

  if let Some(emsdk) = env::var_os(EMSDK_ENV).filter(|v| !v.is_empty()) {
    let candidate = PathBuf::from(emsdk)
      .join("upstream")
      .join("emscripten")
      .join(TOOLCHAIN_BINARY);
    if candidate.is_file() {
      debug!(path = %candidate.display(), "toolchain found via {}", EMSDK_ENV);
      return Ok(candidate);
    }
    debug!(path = %candidate.display(), "no toolchain under {}", EMSDK_ENV);
  }

  match which::which(TOOLCHAIN_BINARY) {
    Ok(path) => {
      debug!(path = %path.display(), "toolchain found on PATH");
      Ok(path)
    }
    Err(_) => Err(ConfigError::ToolchainNotFound),
  }
}

/// Resolve a named toolchain: bare names go through `PATH`, anything else is
/// taken relative to the project root and must exist.
fn require_toolchain(project_root: &Path, path: &Path, origin: &'static str) -> Result<PathBuf, ConfigError> {
  let missing = || ConfigError::ToolchainMissing {
    path: path.to_path_buf(),
    origin,
  };

  if path.components().count() == 1 && !path.is_absolute() {
    return which::which(path).map_err(|_| missing());
  }

  let resolved = project_root.join(path);
  if resolved.is_file() {
    debug!(path = %resolved.display(), origin, "toolchain resolved");
    Ok(resolved)
  } else {
    Err(missing())
  }
}

/// Check that every configured source exists, reporting all that do not.
pub fn check_sources(config: &BuildConfig) -> Result<(), ConfigError> {
  let missing: Vec<PathBuf> = config
    .compile()
    .sources
    .iter()
    .filter(|source| !config.project_root().join(source).is_file())
    .cloned()
    .collect();

  if missing.is_empty() {
    Ok(())
  } else {
    Err(ConfigError::MissingSources(missing))
  }
}
