//! Child process execution.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info};

use super::RunError;

/// Build a process for `program args..` running in `cwd`.
///
/// Only the locale is pinned, so diagnostics and trace logs parse the same
/// everywhere. The rest of the environment is inherited.
pub(super) fn prepare<I, S>(program: &str, args: I, cwd: &Path) -> Command
where
  I: IntoIterator<Item = S>,
  S: AsRef<OsStr>,
{
  let mut process = Command::new(program);
  process
    .args(args)
    .current_dir(cwd)
    .env("LC_ALL", "C")
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);
  process
}

/// Spawn `process` and wait for it to exit.
///
/// `rendered` is the user-facing form of the command line, used in errors.
pub(super) async fn wait(mut process: Command, program: &str, rendered: &str) -> Result<(), RunError> {
  info!(command = %rendered, "running");

  let output = process.output().await.map_err(|source| RunError::Spawn {
    program: program.to_string(),
    source,
  })?;

  let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
  let stdout = String::from_utf8_lossy(&output.stdout);
  if !stdout.trim().is_empty() {
    debug!(stdout = %stdout.trim(), "command stdout");
  }

  if !output.status.success() {
    if !stderr.is_empty() {
      debug!(stderr = %stderr.trim(), "command stderr");
    }
    return Err(RunError::CommandFailed {
      command: rendered.to_string(),
      exit_code: output.status.code(),
      stderr,
    });
  }

  if !stderr.trim().is_empty() {
    debug!(stderr = %stderr.trim(), "command stderr");
  }

  Ok(())
}
