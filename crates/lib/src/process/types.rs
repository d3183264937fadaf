//! Types for external command execution.

use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A command to run: an argument vector spawned directly, or a string handed
/// to the platform shell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandSpec {
  Argv(Vec<String>),
  Shell(String),
}

impl CommandSpec {
  /// Build an argv command from anything string-like.
  pub fn argv<I, S>(args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    CommandSpec::Argv(args.into_iter().map(Into::into).collect())
  }

  pub fn shell(script: impl Into<String>) -> Self {
    CommandSpec::Shell(script.into())
  }

  /// Reject commands that cannot be spawned meaningfully.
  pub fn check(&self) -> Result<(), ProcessError> {
    let malformed = |reason: &str| ProcessError::MalformedCommand {
      reason: reason.to_string(),
    };

    match self {
      CommandSpec::Argv(args) => {
        let program = args.first().ok_or_else(|| malformed("argument list is empty"))?;
        if program.is_empty() {
          return Err(malformed("program name is empty"));
        }
        if args.iter().any(|a| a.contains('\0')) {
          return Err(malformed("argument contains a NUL byte"));
        }
      }
      CommandSpec::Shell(script) => {
        if script.trim().is_empty() {
          return Err(malformed("shell command is empty"));
        }
        if script.contains('\0') {
          return Err(malformed("shell command contains a NUL byte"));
        }
      }
    }
    Ok(())
  }
}

/// Printable form: the program's basename followed by every argument in
/// double quotes, or the shell string verbatim.
impl fmt::Display for CommandSpec {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CommandSpec::Argv(args) => {
        let Some((program, rest)) = args.split_first() else {
          return Ok(());
        };
        let name = Path::new(program)
          .file_name()
          .map(|n| n.to_string_lossy())
          .unwrap_or_else(|| program.into());
        write!(f, "{}", name)?;
        for arg in rest {
          write!(f, " \"{}\"", arg)?;
        }
        Ok(())
      }
      CommandSpec::Shell(script) => write!(f, "{}", script),
    }
  }
}

/// A single request to run a command.
#[derive(Debug, Clone)]
pub struct Invocation {
  pub command: CommandSpec,
  /// Working directory.
  pub cwd: PathBuf,
  /// Variables set on top of the inherited environment.
  pub env: BTreeMap<String, String>,
  /// Turn a non-zero exit code into [`ProcessError::CommandFailed`].
  pub raise_on_error: bool,
}

impl Invocation {
  pub fn new(command: CommandSpec) -> Self {
    Self {
      command,
      cwd: PathBuf::from("."),
      env: BTreeMap::new(),
      raise_on_error: true,
    }
  }

  pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
    self.cwd = cwd.into();
    self
  }

  pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.env.insert(key.into(), value.into());
    self
  }

  pub fn raise_on_error(mut self, raise: bool) -> Self {
    self.raise_on_error = raise;
    self
  }

  /// Argument vector of an argv command, empty for shell commands.
  pub fn args(&self) -> &[String] {
    match &self.command {
      CommandSpec::Argv(args) => args,
      CommandSpec::Shell(_) => &[],
    }
  }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessResponse {
  /// Printable command line.
  pub command: String,
  /// Working directory the command ran in.
  pub path: String,
  /// Exit code, `-1` when the process was terminated by a signal.
  pub exit_code: i32,
  pub stdout: Vec<String>,
  pub stderr: Vec<String>,
}

impl ProcessResponse {
  pub fn success(&self) -> bool {
    self.exit_code == 0
  }

  /// Pretty JSON form used in error messages.
  pub fn to_json(&self) -> String {
    serde_json::to_string_pretty(self).unwrap_or_else(|_| format!("{:?}", self))
  }
}

/// Errors that can occur when running an external command.
#[derive(Debug, Error)]
pub enum ProcessError {
  /// The command exited non-zero and the caller asked for that to be fatal.
  #[error("{}", .0.to_json())]
  CommandFailed(Box<ProcessResponse>),

  /// The command is not something that can be spawned.
  #[error("malformed command: {reason}")]
  MalformedCommand { reason: String },

  /// The program could not be started.
  #[error("failed to spawn {command} in {}: {source}", cwd.display())]
  Spawn {
    command: String,
    cwd: PathBuf,
    #[source]
    source: io::Error,
  },

  /// Reading output or waiting for the process failed.
  #[error("i/o error while running {command}: {source}")]
  Io {
    command: String,
    #[source]
    source: io::Error,
  },
}

impl ProcessError {
  /// The captured response, when the process actually ran.
  pub fn response(&self) -> Option<&ProcessResponse> {
    match self {
      ProcessError::CommandFailed(response) => Some(response),
      _ => None,
    }
  }
}
