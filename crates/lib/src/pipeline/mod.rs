//! Build orchestration.
//!
//! A build regenerates the library manifest, invokes the compiler, and checks
//! the promised artifacts. Success yields a [`VerifiedBuild`], the only input
//! the archiver accepts.

mod orchestrator;
mod types;

pub use orchestrator::{Orchestrator, run_build};
pub use types::*;
