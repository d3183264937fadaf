//! Implementation of the `buildstack` command.
//!
//! Mirrors the stack into the build directory, brings every manifest's pip
//! packages up to date and merges them into the build tree.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

use buildstack_lib::config::default_build_dir;
use buildstack_lib::fs::validate_dir;
use buildstack_lib::process::ProcessResponse;
use buildstack_lib::{BuildOptions, BuildSummary, Toolchain, buildstack};

use crate::output::{OutputFormat, format_duration, print_error, print_info, print_json, print_stat, print_success};

/// Arguments for a build, as parsed from the command line.
#[derive(Debug)]
pub struct BuildArgs {
  pub stack_dir: PathBuf,
  pub build_dir: Option<PathBuf>,
  pub jobs: usize,
  pub toolchain: Toolchain,
  pub output: OutputFormat,
}

/// Execute a build.
///
/// Nothing is touched unless the stack directory exists and the build
/// directory passes path validation.
pub fn cmd_build(args: BuildArgs) -> Result<()> {
  let start = Instant::now();

  if !args.stack_dir.is_dir() {
    bail!("Stack directory not found: {}", args.stack_dir.display());
  }
  let build_dir = args.build_dir.unwrap_or_else(|| default_build_dir(&args.stack_dir));
  validate_dir(&build_dir).context("Refusing to use build directory")?;
  debug!(stack_dir = %args.stack_dir.display(), build_dir = %build_dir.display(), "starting build");

  let options = BuildOptions::new(args.stack_dir, build_dir)
    .with_jobs(args.jobs)
    .with_toolchain(args.toolchain);

  let rt = tokio::runtime::Runtime::new().context("Failed to create async runtime")?;
  let summary = match rt.block_on(buildstack(options)) {
    Ok(summary) => summary,
    Err(err) => {
      if let Some(response) = err.command_response() {
        report_command_failure(response, args.output)?;
      }
      return Err(anyhow::Error::new(err).context("Build failed"));
    }
  };

  if args.output.is_json() {
    print_json(&summary)?;
  } else {
    print_summary(&summary, start);
  }

  Ok(())
}

fn report_command_failure(response: &ProcessResponse, output: OutputFormat) -> Result<()> {
  if output.is_json() {
    #[derive(Serialize)]
    struct FailureOutput<'a> {
      error: &'static str,
      response: &'a ProcessResponse,
    }

    print_json(&FailureOutput {
      error: "command_failed",
      response,
    })
  } else {
    // The response itself is part of the error chain printed on exit.
    print_error(&format!("{} exited with code {}", response.command, response.exit_code));
    Ok(())
  }
}

fn print_summary(summary: &BuildSummary, start: Instant) {
  println!();
  print_success("Build complete!");
  print_stat("Build directory", &summary.build_dir.display().to_string());
  print_stat("Files mirrored", &summary.mirrored.files().to_string());
  if summary.manifests.is_empty() {
    print_info("No requirements.in found, nothing to install");
  } else {
    print_stat("Manifests found", &summary.manifests.len().to_string());
    print_stat("Packages installed", &summary.installed().to_string());
    print_stat("Packages cached", &summary.cached().to_string());
  }
  if let Some(runtime) = &summary.runtime {
    let state = if runtime.created { "created" } else { "reused" };
    print_stat("Runtime", &format!("{} ({})", runtime.interpreter.display(), state));
  }
  if let Some(merged) = &summary.merged {
    print_stat("Overlay files merged", &merged.files().to_string());
  }
  print_stat("Duration", &format_duration(start.elapsed()));
}
