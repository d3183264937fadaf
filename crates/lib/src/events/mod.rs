//! Structured build events.
//!
//! Components never log directly. They report [`BuildEvent`]s to the
//! [`Reporter`] they were handed, which decides where the events go:
//! `tracing` for the CLI, an in-memory list for tests and JSON output.

pub mod reporter;

use std::path::PathBuf;

use serde::Serialize;

use crate::fs::LinkStats;
use crate::process::ProcessResponse;

pub use reporter::{RecordingReporter, Reporter, TracingReporter};

/// Why a manifest's package directory is being rebuilt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleReason {
  /// No package directory exists yet.
  ColdCache,
  /// The package directory exists but has no fingerprint.
  MissingFingerprint,
  /// The declared requirements are newer than the fingerprint.
  DeclaredChanged,
}

impl std::fmt::Display for StaleReason {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let s = match self {
      StaleReason::ColdCache => "no cached packages",
      StaleReason::MissingFingerprint => "fingerprint missing",
      StaleReason::DeclaredChanged => "requirements changed",
    };
    write!(f, "{}", s)
  }
}

/// Everything the build engine reports while it runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
  MirrorStarted {
    stack_dir: PathBuf,
    build_dir: PathBuf,
  },
  MirrorCompleted {
    stats: LinkStats,
  },
  ManifestsFound {
    manifests: Vec<String>,
  },
  RuntimeReused {
    path: PathBuf,
  },
  RuntimeCreated {
    path: PathBuf,
  },
  PackagesUpToDate {
    manifest: String,
  },
  PackagesStale {
    manifest: String,
    reason: StaleReason,
  },
  /// An external command finished, with everything it printed.
  CommandCompleted {
    response: ProcessResponse,
  },
  PackagesInstalled {
    manifest: String,
  },
  OverlayMerged {
    stats: LinkStats,
  },
  BuildCompleted {
    build_dir: PathBuf,
    installed: usize,
    cached: usize,
  },
}
