//! Implementation of the `wasmdist <OUTPUT>` command.
//!
//! Builds the project in the given directory and packages the result into
//! `<project>/dist/<OUTPUT>`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use tracing::debug;

use wasmdist_lib::config::BuildConfig;
use wasmdist_lib::consts::DIST_DIR;
use wasmdist_lib::dist::{DistReport, DistSpec, create_dist};
use wasmdist_lib::pipeline::{BuildFailure, run_build};
use wasmdist_lib::toolchain::SystemRunner;

use crate::output::{
  OutputFormat, format_bytes, format_duration, print_info, print_json, print_stat, print_success, print_warning,
};

/// Lines of compiler stderr echoed on failure; the rest is in the build log.
const STDERR_TAIL: usize = 40;

pub struct DistOptions {
  pub output: PathBuf,
  pub project: PathBuf,
  pub toolchain: Option<PathBuf>,
  pub format: OutputFormat,
}

/// Execute the build and archive it.
///
/// Prints a summary with archive size, location and SHA-256. On a failed build
/// the failing step's diagnostics are shown and no archive is written.
pub fn cmd_dist(options: &DistOptions) -> Result<()> {
  let start = Instant::now();

  let project_root = dunce::canonicalize(&options.project)
    .with_context(|| format!("Project directory not found: {}", options.project.display()))?;
  let config = BuildConfig::load(&project_root, options.toolchain.as_deref())?;
  let target = DistSpec::new(project_root.join(DIST_DIR).join(&options.output))?;
  debug!(archive = %target.archive().display(), subdir = target.subdir(), "resolved output");

  let rt = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()
    .context("Failed to create async runtime")?;

  let build = match rt.block_on(run_build(&config, SystemRunner)) {
    Ok(build) => build,
    Err(failure) => {
      report_failure(&failure, options.format)?;
      return Err(failure.into());
    }
  };

  let report = create_dist(&config, &build, &target).context("Failed to create distribution archive")?;

  if options.format.is_json() {
    print_json(&report)?;
  } else {
    print_summary(&config, &report, start.elapsed());
  }

  Ok(())
}

fn report_failure(failure: &BuildFailure, format: OutputFormat) -> Result<()> {
  if format.is_json() {
    return print_json(&failure.report);
  }

  let Some(step) = failure.report.first_failure() else {
    return Ok(());
  };

  let stderr = step.stderr.trim_end();
  if stderr.is_empty() {
    return Ok(());
  }

  eprintln!();
  eprintln!("{} step output:", step.name);
  let lines: Vec<&str> = stderr.lines().collect();
  let skip = lines.len().saturating_sub(STDERR_TAIL);
  if skip > 0 {
    eprintln!("  ... ({} earlier lines)", skip);
  }
  for line in &lines[skip..] {
    eprintln!("  {}", line);
  }
  eprintln!();
  Ok(())
}

fn print_summary(config: &BuildConfig, report: &DistReport, elapsed: std::time::Duration) {
  for warning in &report.warnings {
    print_warning(&warning.to_string());
  }

  println!();
  print_success("Distribution archive created!");
  print_stat("Archive", &report.archive.display().to_string());
  print_stat("Contents in", &format!("{}/", report.subdir));
  print_stat("Members", &report.entries.len().to_string());
  print_stat("Size", &format_bytes(report.size));
  print_stat("SHA-256", &report.sha256.to_string());
  print_stat("Duration", &format_duration(elapsed));

  println!();
  print_info("To use:");
  println!("  1. Extract {}", file_name(&report.archive));
  let page = format!("{}/{}", report.subdir, config.compile().output);
  match config.dist().launcher.as_deref().filter(|launcher| {
    let member = format!("{}/{}", report.subdir, launcher);
    report.entries.contains(&member)
  }) {
    Some(launcher) => {
      println!("  2. python {}/{}", report.subdir, launcher);
      println!("  3. Open http://localhost:8000/{}", page);
    }
    None => println!("  2. Serve the extracted directory over HTTP and open {}", page),
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_else(|| path.display().to_string())
}
