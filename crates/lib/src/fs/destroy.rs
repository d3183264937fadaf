//! Guarded recursive removal.

use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

use super::{FsError, is_hidden, validate_dir};

/// Recursively remove `path`.
///
/// The path is validated first and the call fails with
/// [`FsError::InvalidPath`] instead of doing nothing when it is rejected.
///
/// With `skip_hidden_root = false` the path itself is removed. With
/// `skip_hidden_root = true` the directory is kept and only its non-hidden
/// top-level entries are removed, so entries like `.pip-overlay` survive.
///
/// A missing `path` is not an error. Returns the number of entries removed.
pub fn destroy(path: &Path, skip_hidden_root: bool) -> Result<usize, FsError> {
  validate_dir(path)?;

  let meta = match fs::symlink_metadata(path) {
    Ok(meta) => meta,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
    Err(e) => return Err(FsError::io("stat", path)(e)),
  };

  if !skip_hidden_root {
    remove_entry(path, &meta)?;
    debug!(path = %path.display(), "removed");
    return Ok(1);
  }

  if !meta.is_dir() {
    return Err(FsError::NotADirectory { path: path.to_path_buf() });
  }

  let mut removed = 0;
  for entry in fs::read_dir(path).map_err(FsError::io("read_dir", path))? {
    let entry = entry.map_err(FsError::io("read_dir", path))?;
    if is_hidden(&entry.file_name()) {
      continue;
    }
    let entry_path = entry.path();
    let meta = fs::symlink_metadata(&entry_path).map_err(FsError::io("stat", &entry_path))?;
    remove_entry(&entry_path, &meta)?;
    removed += 1;
  }

  debug!(path = %path.display(), removed, "cleared non-hidden entries");
  Ok(removed)
}

/// Remove a file, symlink or directory tree. Symlinks are never followed.
fn remove_entry(path: &Path, meta: &fs::Metadata) -> Result<(), FsError> {
  let result = if meta.is_dir() {
    fs::remove_dir_all(path)
  } else {
    fs::remove_file(path)
  };

  match result {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(e) => Err(FsError::io("remove", path)(e)),
  }
}
