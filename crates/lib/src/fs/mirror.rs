//! Full re-link of a stack directory into a build directory.

use std::fs;
use std::path::{Component, Path};

use tracing::debug;

use super::{FsError, LinkStats, destroy, is_hidden, link_tree, validate_dir};

/// Make `build_dir` a fresh hardlinked mirror of `stack_dir`.
///
/// Every non-hidden top-level entry of `build_dir` is removed and every
/// non-hidden top-level entry of `stack_dir` is linked back in. Hidden
/// top-level entries of the build directory (the package overlay and the
/// runtime) are kept; hidden top-level entries of the stack are not copied.
///
/// This is not a diff-based sync: files are re-linked on every call, so edits
/// made inside the build directory never survive.
pub fn mirror(stack_dir: &Path, build_dir: &Path) -> Result<LinkStats, FsError> {
  if !stack_dir.is_dir() {
    return Err(FsError::MissingSource {
      path: stack_dir.to_path_buf(),
    });
  }
  validate_dir(build_dir)?;

  fs::create_dir_all(build_dir).map_err(FsError::io("create_dir", build_dir))?;
  check_overlap(stack_dir, build_dir)?;

  let removed = destroy(build_dir, true)?;
  debug!(build_dir = %build_dir.display(), removed, "cleared build directory");

  link_tree(stack_dir, build_dir, true)
}

/// Reject layouts where clearing the build directory would delete stack files
/// or where linking would recurse into its own output.
///
/// Nesting is allowed when the inner directory sits below a hidden top-level
/// entry of the outer one (e.g. a stack at `.` with builds in `.build/...`),
/// because hidden top-level entries are neither cleared nor mirrored.
fn check_overlap(stack_dir: &Path, build_dir: &Path) -> Result<(), FsError> {
  let stack = dunce::canonicalize(stack_dir).map_err(FsError::io("canonicalize", stack_dir))?;
  let build = dunce::canonicalize(build_dir).map_err(FsError::io("canonicalize", build_dir))?;

  let overlapping = || FsError::OverlappingDirs {
    stack: stack.clone(),
    build: build.clone(),
  };

  if stack == build {
    return Err(overlapping());
  }
  if let Ok(rel) = build.strip_prefix(&stack) {
    if !first_component_hidden(rel) {
      return Err(overlapping());
    }
  }
  if let Ok(rel) = stack.strip_prefix(&build) {
    if !first_component_hidden(rel) {
      return Err(overlapping());
    }
  }

  Ok(())
}

fn first_component_hidden(rel: &Path) -> bool {
  match rel.components().next() {
    Some(Component::Normal(name)) => is_hidden(name),
    _ => false,
  }
}
