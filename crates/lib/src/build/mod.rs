//! Build orchestration.
//!
//! A build runs four phases in order:
//! 1. mirror the stack into the build directory
//! 2. find every `requirements.in` in the mirrored tree
//! 3. provision the isolated runtime and bring each manifest's packages up to date
//! 4. merge the overlay of package directories back into the build directory
//!
//! Phases 3 and 4 are skipped when the stack has no manifest. The first
//! error aborts the build; whatever was already cached stays on disk.

pub mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::config::{BuildOptions, ManifestPaths, manifest_depth};
use crate::consts::MANIFEST_FILENAME;
use crate::deps::ensure_packages;
use crate::events::{BuildEvent, Reporter, TracingReporter};
use crate::fs::{FsError, LinkStats, find_files, link_tree, mirror};
use crate::process::{CommandRunner, SystemRunner};
use crate::runtime::ensure_runtime;
use crate::util::path::parent_of;

pub use types::{BuildError, BuildSummary, ManifestOutcome};

/// Runs builds with a given command runner and event reporter.
pub struct Builder<R: CommandRunner> {
  options: BuildOptions,
  runner: Arc<R>,
  reporter: Arc<dyn Reporter>,
}

impl<R: CommandRunner> Builder<R> {
  /// A builder reporting to `tracing`.
  pub fn new(options: BuildOptions, runner: R) -> Self {
    Self {
      options,
      runner: Arc::new(runner),
      reporter: Arc::new(TracingReporter),
    }
  }

  pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
    self.reporter = reporter;
    self
  }

  pub fn options(&self) -> &BuildOptions {
    &self.options
  }

  /// Mirror the stack, refresh stale package caches and merge them.
  pub async fn build(&self) -> Result<BuildSummary, BuildError> {
    let options = &self.options;
    self.reporter.report(BuildEvent::MirrorStarted {
      stack_dir: options.stack_dir.clone(),
      build_dir: options.build_dir.clone(),
    });

    let (mirrored, found) = mirror_and_scan(options.stack_dir.clone(), options.build_dir.clone()).await?;
    self.reporter.report(BuildEvent::MirrorCompleted { stats: mirrored });
    self.reporter.report(BuildEvent::ManifestsFound {
      manifests: found.clone(),
    });

    let mut summary = BuildSummary {
      stack_dir: options.stack_dir.clone(),
      build_dir: options.build_dir.clone(),
      mirrored,
      manifests: Vec::new(),
      runtime: None,
      merged: None,
    };

    if !found.is_empty() {
      let runtime = ensure_runtime(
        self.runner.as_ref(),
        self.reporter.as_ref(),
        &options.toolchain,
        &options.build_dir,
      )
      .await?;

      let overlay = options.overlay_dir();
      let manifests: Vec<ManifestPaths> = manifest_dirs(&found)
        .into_iter()
        .map(|dir| ManifestPaths::new(&options.build_dir, dir, &overlay))
        .collect();

      summary.manifests = self.ensure_all(&manifests, &runtime.interpreter).await?;
      summary.runtime = Some(runtime);

      let merged = merge_overlay(overlay, options.build_dir.clone()).await?;
      self.reporter.report(BuildEvent::OverlayMerged { stats: merged });
      summary.merged = Some(merged);
    }

    self.reporter.report(BuildEvent::BuildCompleted {
      build_dir: options.build_dir.clone(),
      installed: summary.installed(),
      cached: summary.cached(),
    });
    Ok(summary)
  }

  /// Process manifests, one at a time or on a bounded pool.
  ///
  /// A manifest's package directory contains the package directories of
  /// every manifest below it, and reinstalling it wipes them. Manifests
  /// therefore arrive ancestors first, and the pool runs them in waves of
  /// equal depth so an ancestor never overlaps one of its descendants.
  async fn ensure_all(
    &self,
    manifests: &[ManifestPaths],
    runtime: &Path,
  ) -> Result<Vec<ManifestOutcome>, BuildError> {
    let mut outcomes = Vec::with_capacity(manifests.len());

    if self.options.jobs <= 1 || manifests.len() <= 1 {
      for paths in manifests {
        outcomes.push(self.ensure_one(paths, runtime).await?);
      }
      return Ok(outcomes);
    }

    for wave in manifests.chunk_by(|a, b| a.depth() == b.depth()) {
      if let [paths] = wave {
        outcomes.push(self.ensure_one(paths, runtime).await?);
      } else {
        outcomes.extend(self.ensure_wave(wave.to_vec(), runtime).await?);
      }
    }
    Ok(outcomes)
  }

  /// Process unrelated manifests concurrently, at most `jobs` at a time.
  async fn ensure_wave(&self, wave: Vec<ManifestPaths>, runtime: &Path) -> Result<Vec<ManifestOutcome>, BuildError> {
    debug!(jobs = self.options.jobs, manifests = wave.len(), "processing manifests in parallel");
    let semaphore = Arc::new(Semaphore::new(self.options.jobs));
    let mut join_set = JoinSet::new();

    for (index, paths) in wave.into_iter().enumerate() {
      let runner = self.runner.clone();
      let reporter = self.reporter.clone();
      let toolchain = self.options.toolchain.clone();
      let runtime = runtime.to_path_buf();
      let semaphore = semaphore.clone();

      join_set.spawn(async move {
        let _permit = semaphore.acquire_owned().await.map_err(|e| BuildError::Task {
          message: e.to_string(),
        })?;
        let outcome = ensure_packages(runner.as_ref(), reporter.as_ref(), &toolchain, &paths, &runtime)
          .await
          .map_err(|source| BuildError::Manifest {
            manifest: paths.manifest.clone(),
            source,
          })?;
        Ok::<_, BuildError>((
          index,
          ManifestOutcome {
            manifest: paths.manifest,
            outcome,
          },
        ))
      });
    }

    let mut done = Vec::new();
    while let Some(joined) = join_set.join_next().await {
      let result = joined.map_err(|e| BuildError::Task { message: e.to_string() });
      match result.and_then(|r| r) {
        Ok(outcome) => done.push(outcome),
        Err(e) => {
          // Kills the children of every manifest still running.
          join_set.abort_all();
          return Err(e);
        }
      }
    }

    done.sort_by_key(|(index, _)| *index);
    Ok(done.into_iter().map(|(_, outcome)| outcome).collect())
  }

  async fn ensure_one(&self, paths: &ManifestPaths, runtime: &Path) -> Result<ManifestOutcome, BuildError> {
    let outcome = ensure_packages(
      self.runner.as_ref(),
      self.reporter.as_ref(),
      &self.options.toolchain,
      paths,
      runtime,
    )
    .await
    .map_err(|source| BuildError::Manifest {
      manifest: paths.manifest.clone(),
      source,
    })?;
    Ok(ManifestOutcome {
      manifest: paths.manifest.clone(),
      outcome,
    })
  }
}

/// Build `options` with real child processes, reporting to `tracing`.
pub async fn buildstack(options: BuildOptions) -> Result<BuildSummary, BuildError> {
  Builder::new(options, SystemRunner).build().await
}

/// Manifest directories, shallowest first, in scan order within a depth.
fn manifest_dirs(found: &[String]) -> Vec<&str> {
  let mut dirs: Vec<&str> = found.iter().map(|m| parent_of(m)).collect();
  dirs.sort_by_key(|dir| manifest_depth(dir));
  dirs
}

async fn mirror_and_scan(stack_dir: PathBuf, build_dir: PathBuf) -> Result<(LinkStats, Vec<String>), BuildError> {
  let task = tokio::task::spawn_blocking(move || -> Result<_, FsError> {
    let stats = mirror(&stack_dir, &build_dir)?;
    let found = find_files(&build_dir, MANIFEST_FILENAME)?;
    Ok((stats, found))
  });
  let result = task.await.map_err(|e| BuildError::Task { message: e.to_string() })?;
  Ok(result?)
}

async fn merge_overlay(overlay: PathBuf, build_dir: PathBuf) -> Result<LinkStats, BuildError> {
  let task = tokio::task::spawn_blocking(move || link_tree(&overlay, &build_dir, false));
  let result = task.await.map_err(|e| BuildError::Task { message: e.to_string() })?;
  Ok(result?)
}
