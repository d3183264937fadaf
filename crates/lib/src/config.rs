//! Build configuration.
//!
//! Defaults come from the environment the same way for the CLI and for
//! library callers: `BUILD_ROOTDIR` picks the directory that holds build
//! directories, everything else has a fixed default.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::consts::{
  BUILD_ROOT_ENV, DEFAULT_BUILD_ROOT, DEFAULT_STACK_NAME, MANIFEST_FILENAME, OVERLAY_DIR_NAME, RESOLVED_FILENAME,
};
use crate::util::path::sanitize_name;

/// External programs that live outside the isolated runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toolchain {
  /// Interpreter running the dependency resolver (`-m piptools compile`).
  pub host_python: String,
  /// Command creating the isolated runtime.
  pub virtualenv: String,
}

impl Default for Toolchain {
  fn default() -> Self {
    Self {
      host_python: "python3".to_string(),
      virtualenv: "virtualenv".to_string(),
    }
  }
}

/// Everything a build run needs to know.
#[derive(Debug, Clone, Serialize)]
pub struct BuildOptions {
  /// Source tree, read-only.
  pub stack_dir: PathBuf,
  /// Disposable output tree, owned by the build.
  pub build_dir: PathBuf,
  /// Maximum number of manifests processed at once. `1` is strictly sequential.
  pub jobs: usize,
  pub toolchain: Toolchain,
}

impl BuildOptions {
  pub fn new(stack_dir: impl Into<PathBuf>, build_dir: impl Into<PathBuf>) -> Self {
    Self {
      stack_dir: stack_dir.into(),
      build_dir: build_dir.into(),
      jobs: 1,
      toolchain: Toolchain::default(),
    }
  }

  /// Options with the build directory derived from the stack directory.
  pub fn for_stack(stack_dir: impl Into<PathBuf>) -> Self {
    let stack_dir = stack_dir.into();
    let build_dir = default_build_dir(&stack_dir);
    Self::new(stack_dir, build_dir)
  }

  pub fn with_jobs(mut self, jobs: usize) -> Self {
    self.jobs = jobs.max(1);
    self
  }

  pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
    self.toolchain = toolchain;
    self
  }

  /// Hidden directory caching one package directory per manifest.
  pub fn overlay_dir(&self) -> PathBuf {
    self.build_dir.join(OVERLAY_DIR_NAME)
  }
}

/// Directory holding build directories: `$BUILD_ROOTDIR`, or `.build` when it
/// is unset or empty.
pub fn build_root() -> PathBuf {
  match std::env::var(BUILD_ROOT_ENV) {
    Ok(root) if !root.is_empty() => PathBuf::from(root),
    _ => PathBuf::from(DEFAULT_BUILD_ROOT),
  }
}

/// Default build directory for a stack: `<build_root>/stack-<name>`, where
/// `<name>` is the stack directory's sanitized basename.
pub fn default_build_dir(stack_dir: &Path) -> PathBuf {
  let basename = stack_dir
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  build_root().join(format!("stack-{}", sanitize_name(&basename, DEFAULT_STACK_NAME)))
}

/// Filesystem locations involved in caching one manifest's packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPaths {
  /// Manifest directory relative to the build root, `.` for the root itself.
  pub manifest: String,
  /// Isolated install target inside the overlay.
  pub package_path: PathBuf,
  /// Declared requirements (`requirements.in`).
  pub declared: PathBuf,
  /// Resolver output (`requirements.txt`) next to the declared file.
  pub resolved: PathBuf,
  /// Hardlink of the last successfully installed `resolved` file.
  pub fingerprint: PathBuf,
}

impl ManifestPaths {
  /// Paths for the manifest directory `rel_dir` (`""` for the build root).
  ///
  /// A root-level manifest installs straight into the overlay directory.
  pub fn new(build_dir: &Path, rel_dir: &str, overlay_dir: &Path) -> Self {
    let manifest_dir = join_rel(build_dir, rel_dir);
    let package_path = join_rel(overlay_dir, rel_dir);
    Self {
      manifest: if rel_dir.is_empty() { ".".to_string() } else { rel_dir.to_string() },
      declared: manifest_dir.join(MANIFEST_FILENAME),
      resolved: manifest_dir.join(RESOLVED_FILENAME),
      fingerprint: package_path.join(RESOLVED_FILENAME),
      package_path,
    }
  }

  pub fn is_root(&self) -> bool {
    self.manifest == "."
  }

  /// Number of directories between the build root and the manifest, `0` for the root.
  pub fn depth(&self) -> usize {
    manifest_depth(&self.manifest)
  }
}

/// Segment count of a relative manifest directory; `""` and `.` are the root.
pub fn manifest_depth(rel_dir: &str) -> usize {
  rel_dir.split('/').filter(|s| !s.is_empty() && *s != ".").count()
}

fn join_rel(base: &Path, rel: &str) -> PathBuf {
  if rel.is_empty() { base.to_path_buf() } else { base.join(rel) }
}
