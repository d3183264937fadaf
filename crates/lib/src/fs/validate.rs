//! Path whitelist for destructive operations.
//!
//! Every recursive delete goes through [`validate_dir`] first, even when the
//! caller built the path itself. A path is accepted only when it:
//! - matches [`PATH_PATTERN`] (optional leading `/`, a first segment of
//!   `[-a-zA-Z0-9_.]`, the rest `[-a-zA-Z0-9_/.]`)
//! - has at least two real segments after dropping empty and `.` segments
//! - contains no `..` segment
//!
//! This rejects `/`, `""`, `/etc`, `../../etc` and anything with spaces or
//! shell metacharacters.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::FsError;

pub const PATH_PATTERN: &str = r"^/?[-a-zA-Z0-9_.]+/[-a-zA-Z0-9_/.]+$";

static PATH_RE: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| Regex::new(PATH_PATTERN));

/// Validate a path string, returning it unchanged on success.
pub fn validate_path(path: &str) -> Result<&str, FsError> {
  let invalid = || FsError::InvalidPath { path: path.to_string() };
  let re = PATH_RE
    .as_ref()
    .map_err(|e| FsError::Pattern { message: e.to_string() })?;

  if !re.is_match(path) {
    return Err(invalid());
  }

  let mut segments = 0usize;
  for segment in path.split('/') {
    match segment {
      "" | "." => {}
      ".." => return Err(invalid()),
      _ => segments += 1,
    }
  }

  if segments < 2 {
    return Err(invalid());
  }

  Ok(path)
}

/// Validate a filesystem path. Non-UTF-8 paths are always rejected.
pub fn validate_dir(path: &Path) -> Result<&Path, FsError> {
  let s = path.to_str().ok_or_else(|| FsError::InvalidPath {
    path: path.to_string_lossy().into_owned(),
  })?;
  validate_path(s)?;
  Ok(path)
}
