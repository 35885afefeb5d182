//! Observing what a command reads and writes.
//!
//! Two observers exist and a build uses exactly one of them:
//!
//! - [`DeclaredObserver`] trusts the command's declared inputs. Portable,
//!   but a header edit is only noticed if the header is declared.
//! - [`StraceObserver`] runs the command under `strace -f` and records every
//!   file under the project root that the process tree opened. Finds header
//!   dependencies on its own; Linux only.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{Observation, RunError, cmd};
use crate::command::{Command, absolutize};

const TRACED_CALLS: &str = "trace=open,openat,creat,rename,renameat,renameat2";

/// Runs a command and reports the files it touched.
pub trait Observe {
  fn observe(&self, command: &Command, root: &Path) -> impl Future<Output = Result<Observation, RunError>> + Send;
}

/// Observation by declaration: reads are the declared inputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclaredObserver;

impl Observe for DeclaredObserver {
  async fn observe(&self, command: &Command, root: &Path) -> Result<Observation, RunError> {
    let process = cmd::prepare(command.program(), command.args(), root);
    cmd::wait(process, command.program(), &command.to_string()).await?;

    Ok(Observation {
      reads: command.inputs().iter().map(|p| absolutize(root, p)).collect(),
      writes: BTreeSet::new(),
    })
  }
}

/// Observation by system call tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraceObserver;

impl Observe for StraceObserver {
  async fn observe(&self, command: &Command, root: &Path) -> Result<Observation, RunError> {
    let log = tempfile::Builder::new()
      .prefix("memake-trace-")
      .suffix(".log")
      .tempfile()
      .map_err(|source| RunError::TraceLog {
        path: std::env::temp_dir(),
        source,
      })?;
    let log_path = log.path().to_path_buf();

    let mut args: Vec<&str> = vec!["-f", "-qq", "-s", "4096", "-e", TRACED_CALLS, "-o"];
    let log_arg = log_path.to_string_lossy();
    args.push(&log_arg);
    args.push("--");
    args.push(command.program());
    args.extend(command.args().iter().map(String::as_str));

    let process = cmd::prepare("strace", &args, root);
    match cmd::wait(process, "strace", &command.to_string()).await {
      Ok(()) => {}
      Err(RunError::Spawn { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
        return Err(RunError::TracerUnavailable(source));
      }
      Err(e) => return Err(e),
    }

    let contents = std::fs::read_to_string(&log_path).map_err(|source| RunError::TraceLog {
      path: log_path.clone(),
      source,
    })?;
    let observation = parse_trace(&contents, root);
    debug!(
      id = %command.id(),
      reads = observation.reads.len(),
      writes = observation.writes.len(),
      "trace parsed"
    );
    Ok(observation)
  }
}

/// Which observer a build uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Observer {
  #[default]
  Declared,
  Strace,
}

impl Observe for Observer {
  async fn observe(&self, command: &Command, root: &Path) -> Result<Observation, RunError> {
    match self {
      Observer::Declared => DeclaredObserver.observe(command, root).await,
      Observer::Strace => StraceObserver.observe(command, root).await,
    }
  }
}

impl fmt::Display for Observer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Observer::Declared => write!(f, "declared"),
      Observer::Strace => write!(f, "strace"),
    }
  }
}

impl FromStr for Observer {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "declared" => Ok(Observer::Declared),
      "strace" => Ok(Observer::Strace),
      other => Err(format!("unknown observer: {}", other)),
    }
  }
}

/// Turn an `strace -f` log into the set of existing files under `root`
/// that were opened for reading or writing.
pub(crate) fn parse_trace(log: &str, root: &Path) -> Observation {
  let mut pending: HashMap<&str, String> = HashMap::new();
  let mut reads = BTreeSet::new();
  let mut writes = BTreeSet::new();

  for line in log.lines() {
    let (pid, rest) = split_pid(line);

    if rest.starts_with("+++") || rest.starts_with("---") {
      continue;
    }

    let call = if let Some(head) = rest.strip_suffix("<unfinished ...>") {
      pending.insert(pid, head.trim_end().to_string());
      continue;
    } else if rest.starts_with("<...") {
      let Some(head) = pending.remove(pid) else {
        continue;
      };
      let Some((_, tail)) = rest.split_once("resumed>") else {
        continue;
      };
      format!("{}{}", head, tail)
    } else {
      rest.to_string()
    };

    let Some(access) = parse_call(&call) else {
      continue;
    };
    trace!(?access, "traced access");
    match access {
      Access::Read(path) => {
        reads.insert(path);
      }
      Access::Write(path) => {
        writes.insert(path);
      }
    }
  }

  let keep = |path: PathBuf| {
    let path = normalize(&absolutize(root, &path));
    (path.starts_with(root) && path.is_file()).then_some(path)
  };

  Observation {
    reads: reads.into_iter().filter_map(keep).collect(),
    writes: writes.into_iter().filter_map(keep).collect(),
  }
}

#[derive(Debug, PartialEq, Eq)]
enum Access {
  Read(PathBuf),
  Write(PathBuf),
}

fn split_pid(line: &str) -> (&str, &str) {
  match line.split_once(' ') {
    Some((pid, rest)) if !pid.is_empty() && pid.bytes().all(|b| b.is_ascii_digit()) => (pid, rest.trim_start()),
    _ => ("", line),
  }
}

/// Parse one complete `name(args) = result` line.
fn parse_call(call: &str) -> Option<Access> {
  let (name, rest) = call.split_once('(')?;
  let (args, result) = rest.rsplit_once(" = ")?;
  if result.trim_start().starts_with('-') {
    return None;
  }
  let args = split_args(args.trim_end().strip_suffix(')')?);

  match name.trim() {
    "open" => classify(args.first()?, args.get(1)?),
    "openat" => {
      let path = args.get(1)?;
      if !is_cwd_relative(args.first()?, path) {
        return None;
      }
      classify(path, args.get(2)?)
    }
    "creat" => Some(Access::Write(PathBuf::from(args.first()?))),
    "rename" => Some(Access::Write(PathBuf::from(args.get(1)?))),
    "renameat" | "renameat2" => {
      let path = args.get(3)?;
      if !is_cwd_relative(args.get(2)?, path) {
        return None;
      }
      Some(Access::Write(PathBuf::from(path)))
    }
    _ => None,
  }
}

fn is_cwd_relative(dirfd: &str, path: &str) -> bool {
  dirfd == "AT_FDCWD" || Path::new(path).is_absolute()
}

fn classify(path: &str, flags: &str) -> Option<Access> {
  let writes = flags
    .split('|')
    .any(|flag| matches!(flag.trim(), "O_WRONLY" | "O_RDWR" | "O_CREAT" | "O_TRUNC"));
  let path = PathBuf::from(path);
  Some(if writes { Access::Write(path) } else { Access::Read(path) })
}

/// Split a syscall argument list on top-level commas, unquoting strings.
fn split_args(args: &str) -> Vec<String> {
  let mut out = Vec::new();
  let mut current = String::new();
  let mut chars = args.chars();

  while let Some(c) = chars.next() {
    match c {
      '"' => {
        while let Some(c) = chars.next() {
          match c {
            '"' => break,
            '\\' => match chars.next() {
              Some('n') => current.push('\n'),
              Some('t') => current.push('\t'),
              Some(other) => current.push(other),
              None => {}
            },
            other => current.push(other),
          }
        }
      }
      ',' => out.push(std::mem::take(&mut current).trim().to_string()),
      other => current.push(other),
    }
  }
  out.push(current.trim().to_string());
  out
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other),
    }
  }
  out
}
