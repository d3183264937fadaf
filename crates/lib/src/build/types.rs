//! Types for a build run.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::deps::{CacheError, CacheOutcome};
use crate::fs::{FsError, LinkStats};
use crate::process::{ProcessError, ProcessResponse};
use crate::runtime::{RuntimeError, RuntimeStatus};

/// Result of one manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestOutcome {
  /// Manifest directory relative to the build directory, `.` for the root.
  pub manifest: String,
  pub outcome: CacheOutcome,
}

/// What a successful build did.
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
  pub stack_dir: PathBuf,
  pub build_dir: PathBuf,
  /// Files and links placed by mirroring the stack.
  pub mirrored: LinkStats,
  /// Per-manifest results, root manifest first, then in path order.
  pub manifests: Vec<ManifestOutcome>,
  /// Absent when no manifest was found.
  pub runtime: Option<RuntimeStatus>,
  /// Files merged from the overlay into the build directory.
  pub merged: Option<LinkStats>,
}

impl BuildSummary {
  pub fn installed(&self) -> usize {
    self.count(CacheOutcome::Installed)
  }

  pub fn cached(&self) -> usize {
    self.count(CacheOutcome::Cached)
  }

  fn count(&self, outcome: CacheOutcome) -> usize {
    self.manifests.iter().filter(|m| m.outcome == outcome).count()
  }
}

/// Errors that abort a build.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error(transparent)]
  Fs(#[from] FsError),

  #[error("failed to provision isolated runtime")]
  Runtime(#[from] RuntimeError),

  #[error("pip packages for '{manifest}' failed")]
  Manifest {
    manifest: String,
    #[source]
    source: CacheError,
  },

  /// A background task panicked or was cancelled.
  #[error("build task failed: {message}")]
  Task { message: String },
}

impl BuildError {
  /// The external command failure behind this error, if any.
  pub fn command_response(&self) -> Option<&ProcessResponse> {
    self.process_error().and_then(ProcessError::response)
  }

  /// Whether the build stopped because an external command exited non-zero.
  pub fn is_command_failure(&self) -> bool {
    self.command_response().is_some()
  }

  fn process_error(&self) -> Option<&ProcessError> {
    match self {
      BuildError::Runtime(RuntimeError::Process(e)) => Some(e),
      BuildError::Manifest {
        source: CacheError::Process(e),
        ..
      } => Some(e),
      _ => None,
    }
  }
}
