//! Compiler command line construction.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{BuildConfig, CompileSettings};

/// Settings every build carries, whatever the project file says.
///
/// The program blocks inside a single-threaded host, so it must be built with
/// ASYNCIFY and emscripten-style longjmp.
pub const REQUIRED_SETTINGS: &[&str] = &[
  "ALLOW_MEMORY_GROWTH=1",
  "ASYNCIFY=1",
  "SUPPORT_LONGJMP=emscripten",
  "FORCE_FILESYSTEM=1",
];

/// Setting names that are generated from the export lists.
pub const GENERATED_SETTINGS: &[&str] = &["EXPORTED_FUNCTIONS", "EXPORTED_RUNTIME_METHODS"];

/// Name part of a `NAME=VALUE` setting.
pub fn setting_name(setting: &str) -> &str {
  setting.split_once('=').map_or(setting, |(name, _)| name).trim()
}

/// A single external process to run: program, arguments and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
  pub program: PathBuf,
  pub args: Vec<String>,
  pub cwd: PathBuf,
}

impl Invocation {
  pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      program: program.into(),
      args: Vec::new(),
      cwd: cwd.into(),
    }
  }

  pub fn arg(mut self, arg: impl Into<String>) -> Self {
    self.args.push(arg.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args.extend(args.into_iter().map(Into::into));
    self
  }

  /// `-s NAME=VALUE`
  fn setting(self, setting: impl Into<String>) -> Self {
    self.arg("-s").arg(setting)
  }
}

impl fmt::Display for Invocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.program.display())?;
    for arg in &self.args {
      if arg.is_empty() || arg.contains(char::is_whitespace) {
        write!(f, " \"{}\"", arg)?;
      } else {
        write!(f, " {}", arg)?;
      }
    }
    Ok(())
  }
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// `NAME=['a','b']`
fn list_setting(name: &str, values: &[String]) -> String {
  let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
  format!("{}=[{}]", name, quoted.join(","))
}

/// Build the compiler command line for the configured project.
///
/// Argument order: include dirs, output, JS library, shell file, mandatory
/// settings, export lists, extra settings, link libraries, defines, extra
/// flags, debug info, optimization level, then sources.
pub fn compile_invocation(config: &BuildConfig) -> Invocation {
  let settings: &CompileSettings = config.compile();

  let mut invocation = Invocation::new(config.toolchain(), config.project_root());

  for dir in &settings.include_dirs {
    invocation = invocation.arg(format!("-I{}", path_arg(dir)));
  }

  invocation = invocation.arg("-o").arg(settings.output.clone());

  if let Some(library) = &settings.js_library {
    invocation = invocation.arg("--js-library").arg(path_arg(library));
  }
  if let Some(shell) = &settings.shell_file {
    invocation = invocation.arg("--shell-file").arg(path_arg(shell));
  }

  for setting in REQUIRED_SETTINGS {
    invocation = invocation.setting(*setting);
  }

  invocation = invocation
    .setting(list_setting("EXPORTED_FUNCTIONS", &settings.exported_functions))
    .setting(list_setting("EXPORTED_RUNTIME_METHODS", &settings.exported_runtime_methods));

  for setting in &settings.settings {
    invocation = invocation.setting(setting.clone());
  }

  invocation = invocation
    .args(settings.link_libraries.iter().map(|lib| format!("-l{}", lib)))
    .args(settings.defines.iter().map(|define| format!("-D{}", define)))
    .args(settings.extra_flags.iter().cloned());

  if settings.debug_info {
    invocation = invocation.arg("-g");
  }
  if !settings.opt_level.is_empty() {
    invocation = invocation.arg(format!("-O{}", settings.opt_level));
  }

  invocation.args(settings.sources.iter().map(|source| path_arg(source)))
}
