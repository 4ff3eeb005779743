use std::fs;
use std::os::unix::fs::PermissionsExt;

use predicates::prelude::*;
use serial_test::serial;

use super::common::{
  BROKEN_COMPILER, FORGETFUL_COMPILER, TestEnv, WORKING_COMPILER, archive_members, read_member,
};

#[test]
#[serial]
fn full_run_creates_archive() {
  let env = TestEnv::project();
  env.write_file("keykit.ico", "icon");
  env.write_file("music/blues.mid", "MThd");
  env.write_file("music/readme.txt", "not music");
  env.write_file("serve.py", "print('serving')\n");

  env
    .wasmdist_cmd()
    .arg("keykit-web")
    .assert()
    .success()
    .stdout(predicate::str::contains("Distribution archive created"))
    .stdout(predicate::str::contains("keykit-web.zip"))
    .stdout(predicate::str::contains("python keykit-web/serve.py"));

  let archive = env.archive_path("keykit-web.zip");
  assert_eq!(
    archive_members(&archive),
    vec![
      "keykit-web/keykit.html",
      "keykit-web/keykit.js",
      "keykit-web/keykit.wasm",
      "keykit-web/keykit.ico",
      "keykit-web/lib/lib_manifest.json",
      "keykit-web/lib/basic.k",
      "keykit-web/lib/sub/tools.k",
      "keykit-web/music/blues.mid",
      "keykit-web/music/music_manifest.json",
      "keykit-web/local/music/.gitkeep",
      "keykit-web/local/pages/.gitkeep",
      "keykit-web/serve.py",
    ]
  );
  assert_eq!(
    read_member(&archive, "keykit-web/lib/lib_manifest.json"),
    "[\n  \"basic.k\",\n  \"sub/tools.k\"\n]\n"
  );
  assert_eq!(read_member(&archive, "keykit-web/keykit.js"), "var Module = {};");
}

#[test]
#[serial]
fn manifest_and_build_log_are_left_in_the_project() {
  let env = TestEnv::project();

  env.wasmdist_cmd().arg("out").assert().success();

  let manifest = fs::read_to_string(env.root().join("lib/lib_manifest.json")).unwrap();
  assert_eq!(manifest, "[\n  \"basic.k\",\n  \"sub/tools.k\"\n]\n");

  let log = fs::read_to_string(env.root().join("build_log.txt")).unwrap();
  assert!(log.starts_with("=== STDOUT ===\nfake emcc building keykit.html"));
  assert!(log.contains("=== STDERR ==="));
}

#[test]
#[serial]
fn zip_suffix_is_not_doubled() {
  let env = TestEnv::project();

  env.wasmdist_cmd().arg("keykit.zip").assert().success();

  let archive = env.archive_path("keykit.zip");
  assert!(archive.is_file());
  assert!(!env.archive_path("keykit.zip.zip").exists());
  assert!(archive_members(&archive).iter().all(|name| name.starts_with("keykit/")));
}

#[test]
#[serial]
fn failing_compiler_stops_before_archiving() {
  let env = TestEnv::project();
  env.install_compiler(BROKEN_COMPILER);

  env
    .wasmdist_cmd()
    .arg("keykit-web")
    .assert()
    .failure()
    .code(1)
    .stderr(predicate::str::contains("compile step failed"))
    .stderr(predicate::str::contains("exit code 1"))
    .stderr(predicate::str::contains("expected ';' after expression"));

  assert!(!env.archive_path("keykit-web.zip").exists());

  let log = fs::read_to_string(env.root().join("build_log.txt")).unwrap();
  assert!(log.contains("=== STDERR ===\nsrc/main.c:3:1: error"));
}

#[test]
#[serial]
fn missing_artifact_fails_the_build() {
  let env = TestEnv::project();
  env.install_compiler(FORGETFUL_COMPILER);

  env
    .wasmdist_cmd()
    .arg("keykit-web")
    .assert()
    .failure()
    .stderr(predicate::str::contains("artifacts are missing"))
    .stderr(predicate::str::contains("keykit.wasm"));

  assert!(!env.archive_path("keykit-web.zip").exists());
}

#[test]
#[serial]
fn missing_lib_directory_fails() {
  let env = TestEnv::project();
  fs::remove_dir_all(env.root().join("lib")).unwrap();

  env
    .wasmdist_cmd()
    .arg("out")
    .assert()
    .failure()
    .stderr(predicate::str::contains("manifest step failed"));
}

#[test]
#[serial]
fn missing_sources_are_listed() {
  let env = TestEnv::project();
  fs::remove_file(env.root().join("src/main.c")).unwrap();

  env
    .wasmdist_cmd()
    .arg("out")
    .assert()
    .failure()
    .stderr(predicate::str::contains("missing source files"))
    .stderr(predicate::str::contains("src/main.c"));
}

#[test]
#[serial]
fn absent_optional_files_only_warn() {
  let env = TestEnv::project();

  env
    .wasmdist_cmd()
    .arg("out")
    .assert()
    .success()
    .stderr(predicate::str::contains("keykit.ico not found"))
    .stdout(predicate::str::contains("Serve the extracted directory"));

  assert!(env.archive_path("out.zip").is_file());
}

#[test]
#[serial]
fn user_data_is_archived_when_present() {
  let env = TestEnv::project();
  env.write_file("local/pages/home.kp", "page");

  env.wasmdist_cmd().arg("out").assert().success();

  let members = archive_members(&env.archive_path("out.zip"));
  assert!(members.contains(&"out/local/pages/home.kp".to_string()));
  assert!(!members.contains(&"out/local/music/.gitkeep".to_string()));
}

#[test]
#[serial]
fn repeated_runs_produce_identical_archives() {
  let env = TestEnv::project();
  env.write_file("music/a.mid", "MThd");

  env.wasmdist_cmd().arg("out").assert().success();
  let first = fs::read(env.archive_path("out.zip")).unwrap();

  env.wasmdist_cmd().arg("out").assert().success();
  let second = fs::read(env.archive_path("out.zip")).unwrap();

  assert_eq!(first, second);
}

#[test]
#[serial]
fn json_format_prints_report() {
  let env = TestEnv::project();

  let output = env
    .wasmdist_cmd()
    .args(["out", "--format", "json"])
    .output()
    .unwrap();
  assert!(output.status.success());

  let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
  assert_eq!(report["subdir"], "out");
  assert_eq!(report["sha256"].as_str().unwrap().len(), 64);
  assert!(report["entries"].as_array().unwrap().iter().any(|e| e == "out/keykit.wasm"));
}

#[test]
#[serial]
fn toolchain_flag_overrides_environment() {
  let env = TestEnv::project();
  env.install_compiler(BROKEN_COMPILER);
  env.write_file("bin/emcc-ok", WORKING_COMPILER);
  fs::set_permissions(env.root().join("bin/emcc-ok"), fs::Permissions::from_mode(0o755)).unwrap();

  env
    .wasmdist_cmd()
    .args(["out", "--toolchain", "bin/emcc-ok"])
    .assert()
    .success();
}

#[test]
#[serial]
fn missing_toolchain_is_reported() {
  let env = TestEnv::project();

  env
    .wasmdist_cmd()
    .args(["out", "--toolchain", "bin/nope"])
    .assert()
    .failure()
    .stderr(predicate::str::contains("toolchain not found"));
}

#[test]
#[serial]
fn project_flag_selects_directory() {
  let env = TestEnv::project();
  let elsewhere = TestEnv::empty();

  env
    .wasmdist_cmd()
    .current_dir(elsewhere.root())
    .arg("out")
    .arg("-C")
    .arg(env.root())
    .assert()
    .success();

  assert!(env.archive_path("out.zip").is_file());
  assert!(!elsewhere.root().join("dist").exists());
}
