//! Single compiler run.

use std::fs;
use std::io;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::invocation::{Invocation, compile_invocation};
use super::log;
use super::runner::{ProcessOutput, ProcessRunner};
use super::types::{ToolchainError, describe_status};
use crate::config::BuildConfig;

/// What one compiler run produced.
#[derive(Debug, Clone)]
pub struct CompileOutput {
  pub invocation: Invocation,
  pub output: ProcessOutput,
  /// Where the captured output was persisted.
  pub log: PathBuf,
}

impl CompileOutput {
  pub fn succeeded(&self) -> bool {
    self.output.success()
  }

  /// Turn an unsuccessful run into [`ToolchainError::Failed`].
  pub fn check(&self) -> Result<(), ToolchainError> {
    if self.succeeded() {
      return Ok(());
    }
    Err(ToolchainError::Failed {
      code: self.output.status,
      stderr: self.output.stderr.clone(),
      log: self.log.clone(),
    })
  }
}

/// Delete previous outputs so the new run fully replaces them.
pub fn clear_artifacts(paths: &[PathBuf]) -> Result<(), ToolchainError> {
  for path in paths {
    match fs::remove_file(path) {
      Ok(()) => debug!(path = %path.display(), "removed previous artifact"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(source) => {
        return Err(ToolchainError::ClearArtifact {
          path: path.clone(),
          source,
        });
      }
    }
  }
  Ok(())
}

/// Run the compiler for the configured project.
///
/// The build log is written before returning, whether the compiler succeeded,
/// failed, or could not be started. A non-zero exit is not an `Err` here; call
/// [`CompileOutput::check`] to treat it as one.
pub async fn compile<R: ProcessRunner>(config: &BuildConfig, runner: &R) -> Result<CompileOutput, ToolchainError> {
  let invocation = compile_invocation(config);
  clear_artifacts(&config.artifact_paths())?;

  info!(command = %invocation, "compiling");

  let output = match runner.run(&invocation).await {
    Ok(output) => output,
    Err(e) => {
      let failed = ProcessOutput {
        status: None,
        stdout: String::new(),
        stderr: e.to_string(),
      };
      log::write(config.build_log(), &failed)?;
      return Err(e);
    }
  };

  log::write(config.build_log(), &output)?;

  if output.success() {
    info!(output = %config.compile().output, "compiled");
  } else {
    warn!(
      status = %describe_status(&output.status),
      log = %config.build_log().display(),
      "compiler reported failure"
    );
  }

  Ok(CompileOutput {
    invocation,
    output,
    log: config.build_log().to_path_buf(),
  })
}
