//! Manifest discovery.

use std::path::Path;

use walkdir::WalkDir;

use super::{FsError, is_hidden};
use crate::util::path::join_skip_empty;

/// Find every regular file named exactly `filename` below `root`.
///
/// The walk is depth-first in file-name order and skips hidden entries at
/// every level, including their whole subtree. Symlinks are not followed and
/// never match. Returned paths are relative to `root` and `/`-joined.
pub fn find_files(root: &Path, filename: &str) -> Result<Vec<String>, FsError> {
  let walker = WalkDir::new(root)
    .min_depth(1)
    .follow_links(false)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| !is_hidden(e.file_name()));

  let mut matches = Vec::new();
  for entry in walker {
    let entry = entry.map_err(|e| FsError::Walk {
      path: root.to_path_buf(),
      message: e.to_string(),
    })?;

    if !entry.file_type().is_file() || entry.file_name() != filename {
      continue;
    }

    let rel = entry.path().strip_prefix(root).unwrap_or(entry.path());
    matches.push(
      rel
        .iter()
        .fold(String::new(), |acc, segment| join_skip_empty(&acc, &segment.to_string_lossy())),
    );
  }

  Ok(matches)
}
