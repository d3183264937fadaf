//! Per-manifest pip package cache.
//!
//! Each manifest directory `X` in the build tree gets its own install target
//! `<overlay>/X`. After a successful install, the resolved requirements are
//! hardlinked into the target as a fingerprint; later builds skip the
//! manifest as long as the declared requirements are not newer than that
//! fingerprint. A failure at any step leaves no fingerprint behind, so the
//! next build retries from scratch.

pub mod types;

use std::fs;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::{ManifestPaths, Toolchain};
use crate::events::{BuildEvent, Reporter, StaleReason};
use crate::fs::{FsError, destroy, hardcopy};
use crate::process::{CommandRunner, CommandSpec, Invocation};

pub use types::{CacheError, CacheOutcome, Freshness};

/// Decide whether the packages for `paths` need to be rebuilt.
///
/// Timestamps are compared at whole-second granularity; equal seconds count
/// as up to date.
pub fn check_freshness(paths: &ManifestPaths) -> Result<Freshness, CacheError> {
  if !paths.package_path.is_dir() {
    return Ok(Freshness::Stale(StaleReason::ColdCache));
  }
  let Some(installed) = modified_secs(&paths.fingerprint)? else {
    return Ok(Freshness::Stale(StaleReason::MissingFingerprint));
  };
  match modified_secs(&paths.declared)? {
    Some(declared) if declared <= installed => Ok(Freshness::UpToDate),
    // A vanished manifest is left for the resolver to report.
    _ => Ok(Freshness::Stale(StaleReason::DeclaredChanged)),
  }
}

/// Make sure the package directory for `paths` matches its declared requirements.
///
/// Runs resolve, install and integrity check in that order when the cache is
/// stale. `runtime` is the isolated interpreter used for install and check.
pub async fn ensure_packages<R: CommandRunner>(
  runner: &R,
  reporter: &dyn Reporter,
  toolchain: &Toolchain,
  paths: &ManifestPaths,
  runtime: &Path,
) -> Result<CacheOutcome, CacheError> {
  let reason = match check_freshness(paths)? {
    Freshness::UpToDate => {
      reporter.report(BuildEvent::PackagesUpToDate {
        manifest: paths.manifest.clone(),
      });
      return Ok(CacheOutcome::Cached);
    }
    Freshness::Stale(reason) => reason,
  };
  reporter.report(BuildEvent::PackagesStale {
    manifest: paths.manifest.clone(),
    reason,
  });

  if reason != StaleReason::ColdCache {
    destroy(&paths.package_path, false)?;
  }
  fs::create_dir_all(&paths.package_path).map_err(FsError::io("create directory", &paths.package_path))?;

  for invocation in [
    resolve_invocation(toolchain, paths),
    install_invocation(runtime, paths),
    check_invocation(runtime, paths),
  ] {
    let response = runner.run(&invocation).await?;
    reporter.report(BuildEvent::CommandCompleted { response });
  }

  hardcopy(&paths.resolved, &paths.fingerprint)?;
  reporter.report(BuildEvent::PackagesInstalled {
    manifest: paths.manifest.clone(),
  });
  Ok(CacheOutcome::Installed)
}

/// `<host_python> -m piptools compile <declared> --output-file <resolved>`
pub fn resolve_invocation(toolchain: &Toolchain, paths: &ManifestPaths) -> Invocation {
  Invocation::new(CommandSpec::argv([
    toolchain.host_python.clone(),
    "-m".to_string(),
    "piptools".to_string(),
    "compile".to_string(),
    path_arg(&paths.declared),
    "--output-file".to_string(),
    path_arg(&paths.resolved),
  ]))
}

/// `<runtime> -m pip install --upgrade -r <resolved> -t <package_path>`
pub fn install_invocation(runtime: &Path, paths: &ManifestPaths) -> Invocation {
  Invocation::new(CommandSpec::argv([
    path_arg(runtime),
    "-m".to_string(),
    "pip".to_string(),
    "install".to_string(),
    "--upgrade".to_string(),
    "-r".to_string(),
    path_arg(&paths.resolved),
    "-t".to_string(),
    path_arg(&paths.package_path),
  ]))
}

/// `<runtime> -m pip check`, run inside the package directory with it on `PYTHONPATH`.
pub fn check_invocation(runtime: &Path, paths: &ManifestPaths) -> Invocation {
  Invocation::new(CommandSpec::argv([
    path_arg(runtime),
    "-m".to_string(),
    "pip".to_string(),
    "check".to_string(),
  ]))
  .cwd(&paths.package_path)
  .env("PYTHONPATH", ".")
}

fn path_arg(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

/// Modification time in whole seconds since the epoch, `None` if the file is absent.
fn modified_secs(path: &Path) -> Result<Option<i64>, CacheError> {
  let modified = match fs::metadata(path).and_then(|m| m.modified()) {
    Ok(modified) => modified,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(CacheError::Timestamp {
        path: path.to_path_buf(),
        source,
      });
    }
  };
  Ok(Some(epoch_secs(modified)))
}

fn epoch_secs(time: SystemTime) -> i64 {
  match time.duration_since(UNIX_EPOCH) {
    Ok(d) => d.as_secs() as i64,
    Err(e) => -(e.duration().as_secs() as i64),
  }
}
