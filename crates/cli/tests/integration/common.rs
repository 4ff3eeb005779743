//! Shared test helpers for CLI integration tests.

use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use tempfile::TempDir;

/// Compiler stand-in: writes the requested output plus its `.js` and `.wasm` siblings.
pub const WORKING_COMPILER: &str = r#"#!/bin/sh
out=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift ;;
  esac
  shift
done
stem="${out%.*}"
echo "fake emcc building $out"
printf '<html></html>' > "$out"
printf 'var Module = {};' > "$stem.js"
printf 'wasm' > "$stem.wasm"
"#;

/// Compiler stand-in that reports a syntax error.
pub const BROKEN_COMPILER: &str = r#"#!/bin/sh
echo "compiling"
echo "src/main.c:3:1: error: expected ';' after expression" >&2
exit 1
"#;

/// Compiler stand-in that exits cleanly but forgets the `.wasm` file.
pub const FORGETFUL_COMPILER: &str = r#"#!/bin/sh
printf '<html></html>' > keykit.html
printf 'var Module = {};' > keykit.js
"#;

const PROJECT_FILE: &str = r#"{
  "compile": {
    "sources": ["src/main.c"],
    "jsLibrary": null,
    "shellFile": null
  }
}
"#;

/// Isolated project directory with a fake compiler.
pub struct TestEnv {
  pub temp: TempDir,
}

impl TestEnv {
  /// A minimal project: project file, one source, a small library and the working compiler.
  pub fn project() -> Self {
    let env = Self::empty();
    env.write_file("wasmdist.json", PROJECT_FILE);
    env.write_file("src/main.c", "int main(void) { return 0; }\n");
    env.write_file("lib/basic.k", "# basic\n");
    env.write_file("lib/sub/tools.k", "# tools\n");
    env.write_file("lib/generate_manifest.py", "print('unused')\n");
    env.install_compiler(WORKING_COMPILER);
    env
  }

  /// An empty directory; not a project until `wasmdist.json` is written.
  pub fn empty() -> Self {
    Self {
      temp: TempDir::new().unwrap(),
    }
  }

  pub fn root(&self) -> PathBuf {
    dunce::canonicalize(self.temp.path()).unwrap()
  }

  /// Write a file relative to the project root.
  pub fn write_file(&self, relative_path: &str, content: &str) {
    let path = self.temp.path().join(relative_path);
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, content).unwrap();
  }

  /// Replace the fake compiler script.
  pub fn install_compiler(&self, script: &str) {
    let path = self.compiler_path();
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
  }

  pub fn compiler_path(&self) -> PathBuf {
    self.root().join("tools").join("emcc")
  }

  pub fn archive_path(&self, name: &str) -> PathBuf {
    self.root().join("dist").join(name)
  }

  /// Get a Command for the wasmdist binary, run from the project root with
  /// the fake compiler exposed through `EMCC`.
  pub fn wasmdist_cmd(&self) -> Command {
    let mut cmd: Command = cargo_bin_cmd!("wasmdist");
    cmd.current_dir(self.root());
    cmd.env("EMCC", self.compiler_path());
    cmd.env_remove("EMSDK");
    cmd.env_remove("RUST_LOG");
    cmd
  }
}

/// Member names of a zip archive, in archive order.
pub fn archive_members(path: &Path) -> Vec<String> {
  let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
  archive.file_names().map(str::to_string).collect()
}

pub fn read_member(path: &Path, name: &str) -> String {
  let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
  let mut content = String::new();
  archive.by_name(name).unwrap().read_to_string(&mut content).unwrap();
  content
}
