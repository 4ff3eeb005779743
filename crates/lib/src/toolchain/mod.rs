//! Compiler invocation.
//!
//! Builds the emscripten command line from the project configuration, runs it
//! through a [`ProcessRunner`], and persists the captured output to the build
//! log.

mod compile;
mod invocation;
pub mod log;
mod runner;
mod types;

pub use compile::{CompileOutput, clear_artifacts, compile};
pub use invocation::{GENERATED_SETTINGS, Invocation, REQUIRED_SETTINGS, compile_invocation, setting_name};
pub use runner::{ProcessOutput, ProcessRunner, SystemRunner};
pub use types::ToolchainError;
