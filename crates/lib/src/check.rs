//! Dependency checker.
//!
//! Decides whether a command must run by comparing the files it read and
//! wrote last time against their current state. Checking never touches the
//! memo store's contents or the filesystem beyond reading metadata.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::command::{Command, absolutize};
use crate::memo::{Fingerprint, FingerprintPolicy, MemoStore};

/// Why a command is, or is not, up to date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Staleness {
  UpToDate,
  /// The command has never succeeded under its current identity.
  NoRecord,
  InputMissing(PathBuf),
  InputChanged(PathBuf),
  OutputMissing(PathBuf),
  OutputChanged(PathBuf),
}

impl Staleness {
  pub fn must_run(&self) -> bool {
    !matches!(self, Staleness::UpToDate)
  }
}

impl fmt::Display for Staleness {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Staleness::UpToDate => write!(f, "up to date"),
      Staleness::NoRecord => write!(f, "no previous run"),
      Staleness::InputMissing(p) => write!(f, "input {} is gone", p.display()),
      Staleness::InputChanged(p) => write!(f, "input {} changed", p.display()),
      Staleness::OutputMissing(p) => write!(f, "output {} is missing", p.display()),
      Staleness::OutputChanged(p) => write!(f, "output {} was modified", p.display()),
    }
  }
}

/// Check `command` against its memo record.
///
/// A command is up to date only if it has a record, every file it read is
/// unchanged, and every file it wrote (plus its declared output) still
/// exists as it was left.
pub fn check(store: &MemoStore, command: &Command, root: &Path) -> Staleness {
  let Some(record) = store.lookup(command.id()) else {
    return Staleness::NoRecord;
  };
  let policy = store.policy();

  for (path, recorded) in &record.reads {
    match current(path, policy) {
      None => return Staleness::InputMissing(path.clone()),
      Some(fp) if &fp != recorded => return Staleness::InputChanged(path.clone()),
      Some(_) => {}
    }
  }

  for (path, recorded) in &record.writes {
    match current(path, policy) {
      None => return Staleness::OutputMissing(path.clone()),
      Some(fp) if &fp != recorded => return Staleness::OutputChanged(path.clone()),
      Some(_) => {}
    }
  }

  let declared = absolutize(root, command.output());
  if !record.writes.contains_key(&declared) && !declared.exists() {
    return Staleness::OutputMissing(declared);
  }

  trace!(id = %command.id(), "command up to date");
  Staleness::UpToDate
}

/// Shorthand for `check(..).must_run()`.
pub fn should_run(store: &MemoStore, command: &Command, root: &Path) -> bool {
  check(store, command, root).must_run()
}

fn current(path: &Path, policy: FingerprintPolicy) -> Option<Fingerprint> {
  Fingerprint::compute(path, policy).ok()
}
