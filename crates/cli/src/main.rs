use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cmd;
mod output;

use cmd::{DistOptions, cmd_dist};
use output::{OutputFormat, format_error_chain, print_error};

/// Build a WebAssembly application with emscripten and package it as a zip.
#[derive(Parser)]
#[command(name = "wasmdist")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Archive name, written to <project>/dist/ (".zip" is appended if missing)
  output: PathBuf,

  /// Project directory containing wasmdist.json
  #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
  project: PathBuf,

  /// Path to emcc, overriding the project file and environment
  #[arg(long, value_name = "PATH")]
  toolchain: Option<PathBuf>,

  /// Output format
  #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
  format: OutputFormat,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> ExitCode {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  let options = DistOptions {
    output: cli.output,
    project: cli.project,
    toolchain: cli.toolchain,
    format: cli.format,
  };

  match cmd_dist(&options) {
    Ok(()) => ExitCode::SUCCESS,
    Err(err) => {
      print_error(&format_error_chain(&err));
      ExitCode::FAILURE
    }
  }
}
