mod cmd;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use buildstack_lib::Toolchain;

use crate::cmd::BuildArgs;
use crate::output::OutputFormat;

/// buildstack - Builds ready-to-deploy Python based serverless stacks
#[derive(Parser, Debug)]
#[command(name = "buildstack")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Stack directory (source)
  #[arg(long)]
  stackdir: PathBuf,

  /// Build directory (target); defaults to ${BUILD_ROOTDIR:-.build}/stack-<name of stackdir>
  #[arg(long)]
  builddir: Option<PathBuf>,

  /// Number of manifests processed concurrently
  #[arg(short, long, env = "BUILDSTACK_JOBS", default_value_t = 1)]
  jobs: usize,

  /// Interpreter running the dependency resolver
  #[arg(long, env = "BUILDSTACK_PYTHON", default_value = "python3")]
  python: String,

  /// Command creating the isolated runtime
  #[arg(long, env = "BUILDSTACK_VIRTUALENV", default_value = "virtualenv")]
  virtualenv: String,

  /// Output format
  #[arg(short = 'o', long, value_enum, default_value = "text")]
  output: OutputFormat,

  /// Enable verbose output
  #[arg(short, long)]
  verbose: bool,
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose {
    "debug"
  } else if cli.output.is_json() {
    "warn"
  } else {
    "info"
  };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .without_time()
    .init();

  cmd::cmd_build(BuildArgs {
    stack_dir: cli.stackdir,
    build_dir: cli.builddir,
    jobs: cli.jobs,
    toolchain: Toolchain {
      host_python: cli.python,
      virtualenv: cli.virtualenv,
    },
    output: cli.output,
  })
}
