//! Filesystem side of a build.
//!
//! This module materializes the build directory from the stack directory:
//! - `validate`: whitelist for every path handed to a destructive operation
//! - `destroy`: recursive removal, optionally keeping hidden top-level entries
//! - `link`: hardlink-or-copy of single files and whole trees
//! - `mirror`: full re-link of the stack into the build directory
//! - `scan`: discovery of manifest files below a root

pub mod destroy;
pub mod link;
pub mod mirror;
pub mod scan;
pub mod validate;

use std::ffi::OsStr;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub use destroy::destroy;
pub use link::{LinkMethod, LinkStats, hardcopy, link_tree};
pub use mirror::mirror;
pub use scan::find_files;
pub use validate::{PATH_PATTERN, validate_dir, validate_path};

/// Errors raised by the filesystem components.
#[derive(Debug, Error)]
pub enum FsError {
  /// A destructive operation was pointed at a path outside the whitelist.
  #[error("invalid path '{path}': must match {}, have at least two segments and no '..'", PATH_PATTERN)]
  InvalidPath { path: String },

  /// The path whitelist itself failed to compile.
  #[error("invalid path pattern {}: {message}", PATH_PATTERN)]
  Pattern { message: String },

  /// The stack directory to mirror does not exist or is not a directory.
  #[error("stack directory does not exist: {}", path.display())]
  MissingSource { path: PathBuf },

  /// Mirroring would delete or recurse into its own source.
  #[error("build directory {} overlaps stack directory {}", build.display(), stack.display())]
  OverlappingDirs { stack: PathBuf, build: PathBuf },

  /// A directory was expected.
  #[error("not a directory: {}", path.display())]
  NotADirectory { path: PathBuf },

  /// Directory traversal failed.
  #[error("failed to walk {}: {message}", path.display())]
  Walk { path: PathBuf, message: String },

  /// Any other I/O failure, with the operation and path it concerns.
  #[error("{operation} failed for {}: {source}", path.display())]
  Io {
    operation: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

impl FsError {
  pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> FsError {
    let path = path.into();
    move |source| FsError::Io {
      operation,
      path,
      source,
    }
  }
}

/// Hidden entries are those whose name starts with `.`.
pub(crate) fn is_hidden(name: &OsStr) -> bool {
  name.to_str().map(|s| s.starts_with('.')).unwrap_or(false)
}
