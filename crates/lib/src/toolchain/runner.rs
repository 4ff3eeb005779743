//! Process execution.

use std::future::Future;
use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use super::invocation::Invocation;
use super::types::ToolchainError;

/// Everything a finished process reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
  /// Exit code, `None` when the process was killed by a signal.
  pub status: Option<i32>,
  pub stdout: String,
  pub stderr: String,
}

impl ProcessOutput {
  pub fn success(&self) -> bool {
    self.status == Some(0)
  }
}

/// Runs an [`Invocation`] to completion.
///
/// The pipeline talks to external tools only through this trait, so tests can
/// substitute a runner that never spawns anything.
pub trait ProcessRunner {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ProcessOutput, ToolchainError>>;
}

impl<R: ProcessRunner> ProcessRunner for &R {
  fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ProcessOutput, ToolchainError>> {
    (**self).run(invocation)
  }
}

/// Spawns real processes with `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
  async fn run(&self, invocation: &Invocation) -> Result<ProcessOutput, ToolchainError> {
    debug!(
      program = %invocation.program.display(),
      cwd = %invocation.cwd.display(),
      args = invocation.args.len(),
      "spawning process"
    );

    let output = Command::new(&invocation.program)
      .args(&invocation.args)
      .current_dir(&invocation.cwd)
      .stdin(Stdio::null())
      .output()
      .await
      .map_err(|source| ToolchainError::Spawn {
        program: invocation.program.clone(),
        source,
      })?;

    let output = ProcessOutput {
      status: output.status.code(),
      stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
      stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };

    debug!(status = ?output.status, "process exited");
    Ok(output)
  }
}
