//! Types for build orchestration.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::ConfigError;
use crate::manifest::ManifestError;
use crate::toolchain::ToolchainError;

pub const MANIFEST_STEP: &str = "manifest";
pub const COMPILE_STEP: &str = "compile";

/// Where a build is in its lifecycle.
///
/// ```text
/// NotStarted -> ManifestStep -> CompileStep -> Validating -> Succeeded
///                    |               |             |
///                    +---------------+-------------+-----> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStage {
  NotStarted,
  ManifestStep,
  CompileStep,
  Validating,
  Succeeded,
  Failed,
}

impl BuildStage {
  pub fn is_terminal(self) -> bool {
    matches!(self, BuildStage::Succeeded | BuildStage::Failed)
  }

  /// Whether `next` may follow `self`.
  pub fn can_enter(self, next: BuildStage) -> bool {
    use BuildStage::*;
    match (self, next) {
      (NotStarted, ManifestStep) | (ManifestStep, CompileStep) | (CompileStep, Validating) | (Validating, Succeeded) => {
        true
      }
      (from, Failed) => !from.is_terminal(),
      _ => false,
    }
  }
}

impl fmt::Display for BuildStage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      BuildStage::NotStarted => "not started",
      BuildStage::ManifestStep => "manifest step",
      BuildStage::CompileStep => "compile step",
      BuildStage::Validating => "validating",
      BuildStage::Succeeded => "succeeded",
      BuildStage::Failed => "failed",
    };
    f.write_str(name)
  }
}

/// One executed build step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
  pub name: String,
  /// The command line, or a description for in-process steps.
  pub command: String,
  pub stdout: String,
  pub stderr: String,
  /// Process exit code; `None` for in-process steps or signal termination.
  pub exit_code: Option<i32>,
  pub succeeded: bool,
}

/// Fatal pipeline errors.
#[derive(Debug, Error)]
pub enum PipelineError {
  #[error(transparent)]
  Config(#[from] ConfigError),

  #[error("{step} step failed")]
  Manifest {
    step: &'static str,
    #[source]
    source: ManifestError,
  },

  #[error("{step} step failed")]
  Toolchain {
    step: &'static str,
    #[source]
    source: ToolchainError,
  },

  /// Every step succeeded but promised outputs are not on disk.
  #[error("build reported success but artifacts are missing: {}", display_paths(.0))]
  ArtifactsMissing(Vec<PathBuf>),
}

fn display_paths(paths: &[PathBuf]) -> String {
  paths
    .iter()
    .map(|p| p.display().to_string())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Everything observed during one orchestration run.
#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
  pub stage: BuildStage,
  /// Every stage entered, in order, starting with `NotStarted`.
  pub history: Vec<BuildStage>,
  pub steps: Vec<StepRecord>,
  /// Artifacts found missing during validation.
  pub missing: Vec<PathBuf>,
}

impl BuildReport {
  pub(crate) fn new() -> Self {
    Self {
      stage: BuildStage::NotStarted,
      history: vec![BuildStage::NotStarted],
      steps: Vec::new(),
      missing: Vec::new(),
    }
  }

  pub fn first_failure(&self) -> Option<&StepRecord> {
    self.steps.iter().find(|step| !step.succeeded)
  }

  pub fn step(&self, name: &str) -> Option<&StepRecord> {
    self.steps.iter().find(|step| step.name == name)
  }
}

/// A failed build: the error plus everything captured up to that point.
#[derive(Debug, Error)]
#[error("build failed")]
pub struct BuildFailure {
  pub report: BuildReport,
  #[source]
  pub error: PipelineError,
}

/// Proof that a build reached `Succeeded`.
///
/// Only the orchestrator can construct one, which makes a successful build a
/// compile-time precondition of archiving.
#[derive(Debug, Clone)]
pub struct VerifiedBuild {
  report: BuildReport,
  artifacts: Vec<PathBuf>,
  lib_manifest: PathBuf,
}

impl VerifiedBuild {
  pub(crate) fn new(report: BuildReport, artifacts: Vec<PathBuf>, lib_manifest: PathBuf) -> Self {
    Self {
      report,
      artifacts,
      lib_manifest,
    }
  }

  pub fn report(&self) -> &BuildReport {
    &self.report
  }

  /// Compiled outputs, all confirmed present.
  pub fn artifacts(&self) -> &[PathBuf] {
    &self.artifacts
  }

  /// The generated library manifest, confirmed present.
  pub fn lib_manifest(&self) -> &Path {
    &self.lib_manifest
  }
}
