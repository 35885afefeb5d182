//! Command runner.
//!
//! Executes one build command as a child process and reports which files
//! it read and wrote. The runner never touches the memo store; recording a
//! successful run is the orchestrator's job.

mod cmd;
pub mod observe;

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::command::{Command, absolutize};
use crate::memo::MemoError;

pub use observe::{DeclaredObserver, Observe, Observer, StraceObserver};

/// The files a command touched, as absolute paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
  pub reads: BTreeSet<PathBuf>,
  pub writes: BTreeSet<PathBuf>,
}

#[derive(Debug, Error)]
pub enum RunError {
  #[error("command '{program}' has an empty argument list")]
  EmptyCommand { program: String },

  #[error("missing input: {path}")]
  MissingInput { path: PathBuf },

  #[error("command failed ({}): {command}", describe_exit(.exit_code))]
  CommandFailed {
    command: String,
    exit_code: Option<i32>,
    stderr: String,
  },

  #[error("failed to start '{program}': {source}")]
  Spawn {
    program: String,
    #[source]
    source: io::Error,
  },

  #[error("command exited successfully but did not produce {path}")]
  OutputNotProduced { path: PathBuf },

  #[error("strace is not installed: {0}")]
  TracerUnavailable(#[source] io::Error),

  #[error("failed to read trace log {path}: {source}")]
  TraceLog {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("command task ended abnormally: {0}")]
  Interrupted(String),

  #[error("failed to record result: {0}")]
  Record(#[from] MemoError),
}

impl RunError {
  /// Captured standard error of a failed command, if any.
  pub fn stderr(&self) -> Option<&str> {
    match self {
      RunError::CommandFailed { stderr, .. } if !stderr.trim().is_empty() => Some(stderr),
      _ => None,
    }
  }
}

fn describe_exit(code: &Option<i32>) -> String {
  match code {
    Some(code) => format!("exit code {}", code),
    None => "killed by signal".to_string(),
  }
}

/// Run `command` in `root` and observe it with `observer`.
///
/// Declared inputs must exist before the run and the declared output must
/// exist after it. The declared output is always part of the write set.
pub async fn run_command(command: &Command, observer: Observer, root: &Path) -> Result<Observation, RunError> {
  if command.program().is_empty() || command.args().is_empty() {
    return Err(RunError::EmptyCommand {
      program: command.program().to_string(),
    });
  }

  for input in command.inputs() {
    let path = absolutize(root, input);
    if !path.exists() {
      return Err(RunError::MissingInput { path });
    }
  }

  let mut observation = observer.observe(command, root).await?;

  let output = absolutize(root, command.output());
  if !output.exists() {
    return Err(RunError::OutputNotProduced { path: output });
  }
  observation.writes.insert(output);

  debug!(
    id = %command.id(),
    reads = observation.reads.len(),
    writes = observation.writes.len(),
    "command observed"
  );
  Ok(observation)
}
