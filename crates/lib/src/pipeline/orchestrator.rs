//! Sequential build orchestration.
//!
//! Runs the manifest step, then the compile step, then checks every promised
//! artifact. The first failure ends the run; nothing is retried, since every
//! step is deterministic for a given set of inputs.

use std::path::PathBuf;

use tracing::{debug, error, info};

use super::types::{
  BuildFailure, BuildReport, BuildStage, COMPILE_STEP, MANIFEST_STEP, PipelineError, StepRecord, VerifiedBuild,
};
use crate::config::{BuildConfig, check_sources};
use crate::manifest::{self, ScanOptions};
use crate::toolchain::{self, ProcessRunner};

/// Drives one build from `NotStarted` to `Succeeded` or `Failed`.
pub struct Orchestrator<'a, R> {
  config: &'a BuildConfig,
  runner: R,
  report: BuildReport,
}

impl<'a, R: ProcessRunner> Orchestrator<'a, R> {
  pub fn new(config: &'a BuildConfig, runner: R) -> Self {
    Self {
      config,
      runner,
      report: BuildReport::new(),
    }
  }

  /// Run every step, consuming the orchestrator.
  pub async fn run(mut self) -> Result<VerifiedBuild, BuildFailure> {
    match self.execute().await {
      Ok(artifacts) => {
        self.enter(BuildStage::Succeeded);
        info!(artifacts = artifacts.len(), "build succeeded");
        let lib_manifest = self.config.lib_manifest_path();
        Ok(VerifiedBuild::new(self.report, artifacts, lib_manifest))
      }
      Err(error) => {
        let failed_during = self.report.stage;
        self.enter(BuildStage::Failed);
        error!(stage = %failed_during, error = %error, "build failed");
        Err(BuildFailure {
          report: self.report,
          error,
        })
      }
    }
  }

  async fn execute(&mut self) -> Result<Vec<PathBuf>, PipelineError> {
    self.enter(BuildStage::ManifestStep);
    self.manifest_step()?;

    self.enter(BuildStage::CompileStep);
    self.compile_step().await?;

    self.enter(BuildStage::Validating);
    self.validate()
  }

  fn enter(&mut self, next: BuildStage) {
    debug_assert!(
      self.report.stage.can_enter(next),
      "invalid transition {} -> {}",
      self.report.stage,
      next
    );
    debug!(from = %self.report.stage, to = %next, "stage transition");
    self.report.stage = next;
    self.report.history.push(next);
  }

  fn manifest_step(&mut self) -> Result<(), PipelineError> {
    let lib = self.config.lib();
    let dir = self.config.lib_dir();
    let options = ScanOptions::new(lib.manifest.clone()).exclude(lib.exclude.iter().cloned());

    info!(step = MANIFEST_STEP, dir = %dir.display(), "generating library manifest");
    let command = format!("scan {}", dir.display());

    match manifest::generate(&dir, &options) {
      Ok(generated) => {
        self.report.steps.push(StepRecord {
          name: MANIFEST_STEP.to_string(),
          command,
          stdout: format!(
            "wrote {} entries to {}",
            generated.len(),
            self.config.lib_manifest_path().display()
          ),
          stderr: String::new(),
          exit_code: None,
          succeeded: true,
        });
        Ok(())
      }
      Err(source) => {
        self.report.steps.push(StepRecord {
          name: MANIFEST_STEP.to_string(),
          command,
          stdout: String::new(),
          stderr: source.to_string(),
          exit_code: None,
          succeeded: false,
        });
        Err(PipelineError::Manifest {
          step: MANIFEST_STEP,
          source,
        })
      }
    }
  }

  async fn compile_step(&mut self) -> Result<(), PipelineError> {
    if let Err(source) = check_sources(self.config) {
      self.report.steps.push(StepRecord {
        name: COMPILE_STEP.to_string(),
        command: toolchain::compile_invocation(self.config).to_string(),
        stdout: String::new(),
        stderr: source.to_string(),
        exit_code: None,
        succeeded: false,
      });
      return Err(source.into());
    }

    info!(step = COMPILE_STEP, toolchain = %self.config.toolchain().display(), "compiling");

    let toolchain_err = |source| PipelineError::Toolchain {
      step: COMPILE_STEP,
      source,
    };

    let compiled = match toolchain::compile(self.config, &self.runner).await {
      Ok(compiled) => compiled,
      Err(source) => {
        self.report.steps.push(StepRecord {
          name: COMPILE_STEP.to_string(),
          command: toolchain::compile_invocation(self.config).to_string(),
          stdout: String::new(),
          stderr: source.to_string(),
          exit_code: None,
          succeeded: false,
        });
        return Err(toolchain_err(source));
      }
    };

    self.report.steps.push(StepRecord {
      name: COMPILE_STEP.to_string(),
      command: compiled.invocation.to_string(),
      stdout: compiled.output.stdout.clone(),
      stderr: compiled.output.stderr.clone(),
      exit_code: compiled.output.status,
      succeeded: compiled.succeeded(),
    });

    compiled.check().map_err(toolchain_err)
  }

  /// Confirm every promised artifact exists, listing all that do not.
  fn validate(&mut self) -> Result<Vec<PathBuf>, PipelineError> {
    let artifacts = self.config.artifact_paths();
    let mut promised = artifacts.clone();
    promised.push(self.config.lib_manifest_path());

    let missing: Vec<PathBuf> = promised.into_iter().filter(|path| !path.is_file()).collect();

    if !missing.is_empty() {
      self.report.missing = missing.clone();
      return Err(PipelineError::ArtifactsMissing(missing));
    }

    debug!(count = artifacts.len(), "all artifacts present");
    Ok(artifacts)
  }
}

/// Run the full build for `config` with the given process runner.
pub async fn run_build<R: ProcessRunner>(config: &BuildConfig, runner: R) -> Result<VerifiedBuild, BuildFailure> {
  Orchestrator::new(config, runner).run().await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ProjectFile;
  use crate::toolchain::{Invocation, ProcessOutput, ToolchainError};
  use std::cell::Cell;
  use std::fs;
  use std::path::Path;
  use tempfile::TempDir;

  /// Pretends to be the compiler: optionally writes some outputs, then exits with `status`.
  struct FakeCompiler {
    status: i32,
    writes: Vec<&'static str>,
    calls: Cell<usize>,
  }

  impl FakeCompiler {
    fn producing(writes: Vec<&'static str>) -> Self {
      Self {
        status: 0,
        writes,
        calls: Cell::new(0),
      }
    }

    fn failing(status: i32) -> Self {
      Self {
        status,
        writes: Vec::new(),
        calls: Cell::new(0),
      }
    }
  }

  impl ProcessRunner for FakeCompiler {
    async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ToolchainError> {
      self.calls.set(self.calls.get() + 1);
      for name in &self.writes {
        fs::write(invocation.cwd.join(name), "artifact").unwrap();
      }
      Ok(ProcessOutput {
        status: Some(self.status),
        stdout: "emcc says hi".to_string(),
        stderr: if self.status == 0 {
          String::new()
        } else {
          "src/main.c:10:1: error: unknown type name".to_string()
        },
      })
    }
  }

  fn project(root: &Path) -> BuildConfig {
    let mut project = ProjectFile::default();
    project.compile.sources = vec![PathBuf::from("src/main.c")];
    fs::create_dir_all(root.join("src")).unwrap();
    fs::write(root.join("src/main.c"), "int main() {}").unwrap();
    fs::create_dir_all(root.join("lib")).unwrap();
    fs::write(root.join("lib/basic.k"), "").unwrap();
    BuildConfig::new(root, project, PathBuf::from("emcc")).unwrap()
  }

  const ALL_OUTPUTS: [&str; 3] = ["keykit.html", "keykit.js", "keykit.wasm"];

  #[tokio::test]
  async fn successful_build_walks_every_stage() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let compiler = FakeCompiler::producing(ALL_OUTPUTS.to_vec());

    let build = run_build(&config, &compiler).await.unwrap();

    use BuildStage::*;
    assert_eq!(
      build.report().history,
      vec![NotStarted, ManifestStep, CompileStep, Validating, Succeeded]
    );
    assert_eq!(build.artifacts().len(), 3);
    assert_eq!(build.lib_manifest(), config.lib_manifest_path());
    assert!(build.report().first_failure().is_none());
    assert_eq!(
      build.report().step(COMPILE_STEP).unwrap().stdout,
      "emcc says hi"
    );
  }

  #[tokio::test]
  async fn compiler_failure_stops_the_build() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let compiler = FakeCompiler::failing(2);

    let failure = run_build(&config, &compiler).await.unwrap_err();

    assert_eq!(failure.report.stage, BuildStage::Failed);
    assert_eq!(
      failure.report.history,
      vec![
        BuildStage::NotStarted,
        BuildStage::ManifestStep,
        BuildStage::CompileStep,
        BuildStage::Failed
      ]
    );
    let step = failure.report.first_failure().unwrap();
    assert_eq!(step.name, COMPILE_STEP);
    assert_eq!(step.exit_code, Some(2));
    assert!(step.stderr.contains("unknown type name"));
    assert!(matches!(
      failure.error,
      PipelineError::Toolchain {
        source: ToolchainError::Failed { code: Some(2), .. },
        ..
      }
    ));
    assert_eq!(compiler.calls.get(), 1);
  }

  #[tokio::test]
  async fn missing_lib_dir_fails_before_compiling() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    fs::remove_dir_all(temp.path().join("lib")).unwrap();
    let compiler = FakeCompiler::producing(ALL_OUTPUTS.to_vec());

    let failure = run_build(&config, &compiler).await.unwrap_err();

    assert!(matches!(
      failure.error,
      PipelineError::Manifest {
        source: crate::manifest::ManifestError::DirectoryNotFound(_),
        ..
      }
    ));
    assert_eq!(compiler.calls.get(), 0);
    assert_eq!(failure.report.history.last(), Some(&BuildStage::Failed));
    assert!(!failure.report.history.contains(&BuildStage::CompileStep));
  }

  #[tokio::test]
  async fn missing_artifact_fails_despite_successful_steps() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let compiler = FakeCompiler::producing(vec!["keykit.html", "keykit.js"]);

    let failure = run_build(&config, &compiler).await.unwrap_err();

    assert!(failure.report.steps.iter().all(|step| step.succeeded));
    assert_eq!(failure.report.missing, vec![temp.path().join("keykit.wasm")]);
    match failure.error {
      PipelineError::ArtifactsMissing(missing) => assert_eq!(missing, vec![temp.path().join("keykit.wasm")]),
      other => panic!("expected ArtifactsMissing, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn stale_artifacts_do_not_satisfy_validation() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    for name in ALL_OUTPUTS {
      fs::write(temp.path().join(name), "from last week").unwrap();
    }
    // Compiler "succeeds" but produces nothing this time.
    let compiler = FakeCompiler::producing(Vec::new());

    let failure = run_build(&config, &compiler).await.unwrap_err();
    assert!(matches!(failure.error, PipelineError::ArtifactsMissing(ref m) if m.len() == 3));
  }

  #[tokio::test]
  async fn missing_sources_are_a_configuration_error() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    fs::remove_file(temp.path().join("src/main.c")).unwrap();
    let compiler = FakeCompiler::producing(ALL_OUTPUTS.to_vec());

    let failure = run_build(&config, &compiler).await.unwrap_err();
    assert!(matches!(failure.error, PipelineError::Config(_)));
    assert_eq!(compiler.calls.get(), 0);

    let step = failure.report.first_failure().unwrap();
    assert_eq!(step.name, COMPILE_STEP);
    assert_eq!(step.exit_code, None);
    assert!(step.stderr.contains("missing source files"));
    assert!(step.stderr.contains("main.c"));
  }

  #[tokio::test]
  async fn manifest_is_regenerated_each_run() {
    let temp = TempDir::new().unwrap();
    let config = project(temp.path());
    let compiler = FakeCompiler::producing(ALL_OUTPUTS.to_vec());

    run_build(&config, &compiler).await.unwrap();
    fs::write(temp.path().join("lib/extra.k"), "").unwrap();
    run_build(&config, &compiler).await.unwrap();

    let manifest = crate::manifest::Manifest::load(&config.lib_manifest_path()).unwrap();
    assert_eq!(manifest.entries(), &["basic.k", "extra.k"]);
  }
}
