//! Event sinks.

use std::sync::{Mutex, PoisonError};

use tracing::{debug, info, warn};

use super::BuildEvent;

/// Receives build events. Passed explicitly to every component.
pub trait Reporter: Send + Sync {
  fn report(&self, event: BuildEvent);
}

/// Forwards events to `tracing`.
///
/// Progress and command lines are logged at `info`, captured command output at
/// `debug`, stale caches at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
  fn report(&self, event: BuildEvent) {
    match event {
      BuildEvent::MirrorStarted { stack_dir, build_dir } => {
        info!(stack_dir = %stack_dir.display(), build_dir = %build_dir.display(), "mirroring stack");
      }
      BuildEvent::MirrorCompleted { stats } => {
        info!(
          linked = stats.linked,
          copied = stats.copied,
          symlinks = stats.symlinks,
          "stack mirrored"
        );
      }
      BuildEvent::ManifestsFound { manifests } => {
        info!(count = manifests.len(), "found manifests");
        for manifest in &manifests {
          debug!(manifest = %manifest, "manifest");
        }
      }
      BuildEvent::RuntimeReused { path } => {
        debug!(path = %path.display(), "reusing isolated runtime");
      }
      BuildEvent::RuntimeCreated { path } => {
        info!(path = %path.display(), "created isolated runtime");
      }
      BuildEvent::PackagesUpToDate { manifest } => {
        info!(manifest = %manifest, "pip packages up-to-date");
      }
      BuildEvent::PackagesStale { manifest, reason } => {
        warn!(manifest = %manifest, reason = %reason, "pip packages require update");
      }
      BuildEvent::CommandCompleted { response } => {
        info!(exit_code = response.exit_code, cwd = %response.path, "run: {}", response.command);
        for line in &response.stdout {
          debug!(stream = "stdout", "{}", line);
        }
        for line in &response.stderr {
          debug!(stream = "stderr", "{}", line);
        }
      }
      BuildEvent::PackagesInstalled { manifest } => {
        info!(manifest = %manifest, "pip packages installed");
      }
      BuildEvent::OverlayMerged { stats } => {
        info!(linked = stats.linked, unchanged = stats.unchanged, copied = stats.copied, "overlay merged");
      }
      BuildEvent::BuildCompleted {
        build_dir,
        installed,
        cached,
      } => {
        info!(build_dir = %build_dir.display(), installed, cached, "build complete");
      }
    }
  }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct RecordingReporter {
  events: Mutex<Vec<BuildEvent>>,
}

impl RecordingReporter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of the events reported so far.
  pub fn events(&self) -> Vec<BuildEvent> {
    self.events.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// Number of recorded events matching `pred`.
  pub fn count(&self, pred: impl Fn(&BuildEvent) -> bool) -> usize {
    self
      .events
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .iter()
      .filter(|e| pred(e))
      .count()
  }
}

impl Reporter for RecordingReporter {
  fn report(&self, event: BuildEvent) {
    self.events.lock().unwrap_or_else(PoisonError::into_inner).push(event);
  }
}
