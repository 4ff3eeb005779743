//! The build log artifact.
//!
//! Every run, successful or not, leaves the compiler's output on disk:
//!
//! ```text
//! === STDOUT ===
//! <stdout>
//!
//! === STDERR ===
//! <stderr>
//! ```

use std::fs;
use std::path::Path;

use super::runner::ProcessOutput;
use super::types::ToolchainError;

pub const STDOUT_HEADER: &str = "=== STDOUT ===";
pub const STDERR_HEADER: &str = "=== STDERR ===";

pub fn render(output: &ProcessOutput) -> String {
  format!(
    "{}\n{}\n\n{}\n{}",
    STDOUT_HEADER, output.stdout, STDERR_HEADER, output.stderr
  )
}

/// Write the log, replacing the previous run's.
pub fn write(path: &Path, output: &ProcessOutput) -> Result<(), ToolchainError> {
  let write_err = |source| ToolchainError::WriteLog {
    path: path.to_path_buf(),
    source,
  };

  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(write_err)?;
  }
  fs::write(path, render(output)).map_err(write_err)
}
