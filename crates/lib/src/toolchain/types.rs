use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors from running the compiler.
#[derive(Debug, Error)]
pub enum ToolchainError {
  /// The process could not be started at all.
  #[error("failed to start {}: {source}", .program.display())]
  Spawn {
    program: PathBuf,
    #[source]
    source: io::Error,
  },

  /// The compiler ran and exited unsuccessfully.
  #[error("compilation failed with {} (see {})", describe_status(.code), .log.display())]
  Failed {
    code: Option<i32>,
    stderr: String,
    log: PathBuf,
  },

  /// A previous artifact could not be removed before rebuilding.
  #[error("failed to remove stale artifact {}: {source}", .path.display())]
  ClearArtifact {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write build log {}: {source}", .path.display())]
  WriteLog {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

pub(crate) fn describe_status(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("exit code {}", code),
    None => "termination by signal".to_string(),
  }
}
