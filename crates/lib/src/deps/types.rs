//! Type definitions for the per-manifest dependency cache.

use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::events::StaleReason;
use crate::fs::FsError;
use crate::process::ProcessError;

/// State of a manifest's cached package directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
  /// The fingerprint is at least as new as the declared requirements.
  UpToDate,
  /// The packages must be resolved and installed again.
  Stale(StaleReason),
}

/// What happened to one manifest during a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
  /// The cached package directory was reused as-is.
  Cached,
  /// Packages were resolved and installed from scratch.
  Installed,
}

/// Errors raised while checking or refreshing a package directory.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error(transparent)]
  Fs(#[from] FsError),

  #[error(transparent)]
  Process(#[from] ProcessError),

  /// A timestamp could not be read for a reason other than the file being absent.
  #[error("failed to read modification time of {}: {source}", path.display())]
  Timestamp {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}
