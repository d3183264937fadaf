//! External command execution.
//!
//! Every subprocess the build starts (resolver, installer, integrity check,
//! runtime creation) goes through a [`CommandRunner`]. The runner blocks the
//! calling task until the process exits and returns its complete output,
//! captured line by line; there is no streaming, timeout or retry.

pub mod types;

use std::future::Future;
use std::process::{ExitStatus, Stdio};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::debug;

pub use types::{CommandSpec, Invocation, ProcessError, ProcessResponse};

/// Runs external commands.
///
/// The build engine only ever talks to this trait, so tests can substitute a
/// runner that simulates the toolchain and records what was asked of it.
pub trait CommandRunner: Send + Sync + 'static {
  /// Run the command to completion.
  ///
  /// Fails with [`ProcessError::CommandFailed`] when the exit code is non-zero
  /// and `raise_on_error` is set, and with [`ProcessError::MalformedCommand`]
  /// before spawning anything when the command is unusable.
  fn run(&self, invocation: &Invocation) -> impl Future<Output = Result<ProcessResponse, ProcessError>> + Send;
}

/// Runner backed by real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
  async fn run(&self, invocation: &Invocation) -> Result<ProcessResponse, ProcessError> {
    run_command(invocation).await
  }
}

/// Spawn `invocation` and capture stdout and stderr concurrently.
pub async fn run_command(invocation: &Invocation) -> Result<ProcessResponse, ProcessError> {
  invocation.command.check()?;
  let printable = invocation.command.to_string();

  let mut command = build_command(&invocation.command);
  command
    .current_dir(&invocation.cwd)
    .envs(&invocation.env)
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    // Dropping the future (e.g. a cancelled sibling task) must not leave the
    // child running.
    .kill_on_drop(true);

  debug!(command = %printable, cwd = %invocation.cwd.display(), "spawning process");

  let mut child = command.spawn().map_err(|source| ProcessError::Spawn {
    command: printable.clone(),
    cwd: invocation.cwd.clone(),
    source,
  })?;

  let io_err = |source| ProcessError::Io {
    command: printable.clone(),
    source,
  };

  let stdout = child.stdout.take();
  let stderr = child.stderr.take();
  let (stdout_lines, stderr_lines) = tokio::try_join!(read_lines(stdout), read_lines(stderr)).map_err(io_err)?;
  let status = child.wait().await.map_err(io_err)?;

  let response = ProcessResponse {
    command: printable,
    path: invocation.cwd.display().to_string(),
    exit_code: exit_code(status),
    stdout: stdout_lines,
    stderr: stderr_lines,
  };

  if invocation.raise_on_error && !response.success() {
    return Err(ProcessError::CommandFailed(Box::new(response)));
  }

  Ok(response)
}

fn build_command(spec: &CommandSpec) -> Command {
  match spec {
    CommandSpec::Argv(args) => {
      let mut command = Command::new(&args[0]);
      command.args(&args[1..]);
      command
    }
    CommandSpec::Shell(script) => {
      let (shell, flag) = shell();
      let mut command = Command::new(shell);
      command.arg(flag).arg(script);
      command
    }
  }
}

#[cfg(unix)]
fn shell() -> (&'static str, &'static str) {
  ("/bin/sh", "-c")
}

#[cfg(windows)]
fn shell() -> (&'static str, &'static str) {
  ("cmd.exe", "/C")
}

async fn read_lines<R>(stream: Option<R>) -> std::io::Result<Vec<String>>
where
  R: AsyncRead + Unpin,
{
  let mut lines = Vec::new();
  let Some(stream) = stream else {
    return Ok(lines);
  };

  let mut reader = BufReader::new(stream);
  let mut buf = Vec::new();
  loop {
    buf.clear();
    if reader.read_until(b'\n', &mut buf).await? == 0 {
      break;
    }
    lines.push(String::from_utf8_lossy(&buf).trim().to_string());
  }
  Ok(lines)
}

fn exit_code(status: ExitStatus) -> i32 {
  status.code().unwrap_or(-1)
}
