//! Isolated Python runtime inside the build directory.
//!
//! The runtime is created once with `virtualenv` and reused for as long as
//! its interpreter exists. It is never upgraded or checked for drift.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::Toolchain;
use crate::consts::RUNTIME_DIR_NAME;
use crate::events::{BuildEvent, Reporter};
use crate::process::{CommandRunner, CommandSpec, Invocation, ProcessError};

/// Errors raised while provisioning the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
  #[error(transparent)]
  Process(#[from] ProcessError),

  /// The creation command succeeded but produced no interpreter.
  #[error("runtime interpreter missing after creation: {}", path.display())]
  MissingInterpreter { path: PathBuf },

  #[error("failed to resolve runtime path {}: {source}", path.display())]
  Io {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// The interpreter the build uses for installing and checking packages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuntimeStatus {
  /// Absolute path of the interpreter.
  pub interpreter: PathBuf,
  /// Whether this build created the runtime.
  pub created: bool,
}

/// Runtime directory of a build.
pub fn runtime_dir(build_dir: &Path) -> PathBuf {
  build_dir.join(RUNTIME_DIR_NAME)
}

/// Interpreter inside the runtime directory.
pub fn interpreter_path(build_dir: &Path) -> PathBuf {
  let dir = runtime_dir(build_dir);
  if cfg!(windows) {
    dir.join("Scripts").join("python.exe")
  } else {
    dir.join("bin").join("python")
  }
}

/// Reuse the runtime in `build_dir`, or create it when its interpreter is missing.
///
/// The returned interpreter path is absolute, since the integrity check runs
/// with a different working directory.
pub async fn ensure_runtime<R: CommandRunner>(
  runner: &R,
  reporter: &dyn Reporter,
  toolchain: &Toolchain,
  build_dir: &Path,
) -> Result<RuntimeStatus, RuntimeError> {
  let interpreter = interpreter_path(build_dir);
  let created = !interpreter.exists();

  if created {
    let dir = runtime_dir(build_dir);
    let invocation = Invocation::new(CommandSpec::argv([
      toolchain.virtualenv.clone(),
      dir.to_string_lossy().into_owned(),
    ]));
    let response = runner.run(&invocation).await?;
    reporter.report(BuildEvent::CommandCompleted { response });

    if !interpreter.exists() {
      return Err(RuntimeError::MissingInterpreter { path: interpreter });
    }
  }

  let interpreter = std::path::absolute(&interpreter).map_err(|source| RuntimeError::Io {
    path: interpreter.clone(),
    source,
  })?;
  reporter.report(if created {
    BuildEvent::RuntimeCreated {
      path: interpreter.clone(),
    }
  } else {
    BuildEvent::RuntimeReused {
      path: interpreter.clone(),
    }
  });

  Ok(RuntimeStatus { interpreter, created })
}
