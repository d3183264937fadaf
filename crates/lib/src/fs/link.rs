//! Hardlink-or-copy materialization.
//!
//! Files are hardlinked wherever the filesystem allows it, so a mirrored tree
//! costs one directory entry per file instead of a second copy of its bytes.
//! When a link cannot be made (different device, no hardlink support, or a
//! kernel policy that forbids linking the source) the file is copied instead.
//! Copies keep the source's modification time, which the package cache
//! compares against its fingerprints.

use std::fs;
use std::io;
use std::path::Path;

use filetime::FileTime;
use serde::Serialize;
use walkdir::WalkDir;

use super::{FsError, is_hidden};

/// How a single file reached its destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMethod {
  /// A new hardlink was created.
  Linked,
  /// Linking was not possible, the bytes were copied.
  Copied,
  /// The destination already was the same file.
  Unchanged,
}

/// Counters for a tree materialization.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LinkStats {
  pub linked: usize,
  pub copied: usize,
  pub unchanged: usize,
  pub symlinks: usize,
  pub directories: usize,
}

impl LinkStats {
  pub fn files(&self) -> usize {
    self.linked + self.copied + self.unchanged
  }

  fn record(&mut self, method: LinkMethod) {
    match method {
      LinkMethod::Linked => self.linked += 1,
      LinkMethod::Copied => self.copied += 1,
      LinkMethod::Unchanged => self.unchanged += 1,
    }
  }
}

/// Place `src` at `dst` as a hardlink.
///
/// - `dst` already the same file as `src`: nothing to do
/// - `dst` another file: it is unlinked first
/// - linking impossible: falls back to a copy (permissions and mtime preserved)
pub fn hardcopy(src: &Path, dst: &Path) -> Result<LinkMethod, FsError> {
  match fs::symlink_metadata(dst) {
    Ok(dst_meta) => {
      let src_meta = fs::symlink_metadata(src).map_err(FsError::io("stat", src))?;
      if same_file(&src_meta, &dst_meta) {
        return Ok(LinkMethod::Unchanged);
      }
      fs::remove_file(dst).map_err(FsError::io("unlink", dst))?;
    }
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(FsError::io("stat", dst)(e)),
  }

  match fs::hard_link(src, dst) {
    Ok(()) => Ok(LinkMethod::Linked),
    Err(e) if link_unsupported(&e) => {
      copy_file(src, dst)?;
      Ok(LinkMethod::Copied)
    }
    Err(e) => Err(FsError::io("hard_link", dst)(e)),
  }
}

fn copy_file(src: &Path, dst: &Path) -> Result<(), FsError> {
  fs::copy(src, dst).map_err(FsError::io("copy", dst))?;
  let meta = fs::metadata(src).map_err(FsError::io("stat", src))?;
  let mtime = FileTime::from_last_modification_time(&meta);
  filetime::set_file_mtime(dst, mtime).map_err(FsError::io("set mtime", dst))
}

/// Materialize the contents of `src_root` inside `dst_root`.
///
/// Directories are created as needed (existing ones are reused), files go
/// through [`hardcopy`] and overwrite whatever is at the destination, symlinks
/// are recreated with the same target. With `skip_hidden_root`, hidden entries
/// directly inside `src_root` are left out; hidden entries deeper down are
/// always included.
pub fn link_tree(src_root: &Path, dst_root: &Path, skip_hidden_root: bool) -> Result<LinkStats, FsError> {
  let mut stats = LinkStats::default();
  fs::create_dir_all(dst_root).map_err(FsError::io("create_dir", dst_root))?;

  let walker = WalkDir::new(src_root)
    .min_depth(1)
    .follow_links(false)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| !(skip_hidden_root && e.depth() == 1 && is_hidden(e.file_name())));

  for entry in walker {
    let entry = entry.map_err(|e| FsError::Walk {
      path: src_root.to_path_buf(),
      message: e.to_string(),
    })?;
    let rel = entry.path().strip_prefix(src_root).unwrap_or(entry.path());
    let dst = dst_root.join(rel);
    let file_type = entry.file_type();

    if file_type.is_dir() {
      fs::create_dir_all(&dst).map_err(FsError::io("create_dir", &dst))?;
      stats.directories += 1;
    } else if file_type.is_symlink() {
      relink(entry.path(), &dst)?;
      stats.symlinks += 1;
    } else {
      stats.record(hardcopy(entry.path(), &dst)?);
    }
  }

  Ok(stats)
}

/// Recreate the symlink at `src` as `dst`, replacing a non-directory entry.
fn relink(src: &Path, dst: &Path) -> Result<(), FsError> {
  let target = fs::read_link(src).map_err(FsError::io("read_link", src))?;

  match fs::symlink_metadata(dst) {
    Ok(meta) if meta.is_dir() => return Err(FsError::io("symlink", dst)(io::ErrorKind::IsADirectory.into())),
    Ok(_) => fs::remove_file(dst).map_err(FsError::io("unlink", dst))?,
    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
    Err(e) => return Err(FsError::io("stat", dst)(e)),
  }

  create_symlink(src, &target, dst).map_err(FsError::io("symlink", dst))
}

#[cfg(unix)]
fn create_symlink(_src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
  std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn create_symlink(src: &Path, target: &Path, dst: &Path) -> io::Result<()> {
  // Windows needs to know whether the link points at a directory.
  if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
    std::os::windows::fs::symlink_dir(target, dst)
  } else {
    std::os::windows::fs::symlink_file(target, dst)
  }
}

fn link_unsupported(e: &io::Error) -> bool {
  matches!(
    e.kind(),
    io::ErrorKind::CrossesDevices | io::ErrorKind::Unsupported | io::ErrorKind::PermissionDenied
  )
}

#[cfg(unix)]
fn same_file(a: &fs::Metadata, b: &fs::Metadata) -> bool {
  use std::os::unix::fs::MetadataExt;
  a.dev() == b.dev() && a.ino() == b.ino()
}

#[cfg(not(unix))]
fn same_file(_a: &fs::Metadata, _b: &fs::Metadata) -> bool {
  false
}
