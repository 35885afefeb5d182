//! Advisory lock on a memo directory.
//!
//! `build`, `clean` and `install` hold the lock exclusively and record who
//! they are in the lock file; `plan` holds it shared. A second exclusive
//! request fails at once and names the holder instead of waiting.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
  /// Planning: any number of readers.
  Shared,
  /// Anything that runs commands or rewrites the store.
  Exclusive,
}

/// The invocation holding an exclusive lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockHolder {
  pub pid: u32,
  /// `build`, `clean` or `install`.
  pub operation: String,
  /// Project root of the holder; several projects may share a memo dir.
  pub root: PathBuf,
  /// Requested targets; empty means all.
  #[serde(default)]
  pub targets: Vec<String>,
  pub since_unix: u64,
}

impl LockHolder {
  /// Describe the current process running `operation` on `root`.
  pub fn current(operation: &str, root: &Path, targets: &[String]) -> Self {
    Self {
      pid: std::process::id(),
      operation: operation.to_string(),
      root: root.to_path_buf(),
      targets: targets.to_vec(),
      since_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
    }
  }
}

impl fmt::Display for LockHolder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "`{}` of {}", self.operation, self.root.display())?;
    if !self.targets.is_empty() {
      write!(f, " [{}]", self.targets.join(", "))?;
    }
    write!(f, " by pid {} since unix time {}", self.pid, self.since_unix)
  }
}

fn describe(holder: &Option<LockHolder>) -> String {
  match holder {
    Some(holder) => holder.to_string(),
    None => "holder unknown".to_string(),
  }
}

#[derive(Debug, Error)]
pub enum LockError {
  #[error(
    "memo directory is busy: {}\nif no memake process is running, remove {}",
    describe(.holder),
    .lock_path.display()
  )]
  Busy {
    holder: Option<LockHolder>,
    lock_path: PathBuf,
  },

  #[error("failed to {action} {path}: {source}")]
  Io {
    action: &'static str,
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}

/// A held lock on a memo directory, released when dropped.
#[derive(Debug)]
pub struct MemoLock {
  _file: File,
  path: PathBuf,
}

impl MemoLock {
  /// Lock `memo_dir` without blocking, creating the directory if needed.
  ///
  /// With `LockMode::Exclusive`, `holder` is written to the lock file so a
  /// refused invocation can report it.
  pub fn acquire(memo_dir: &Path, mode: LockMode, holder: &LockHolder) -> Result<Self, LockError> {
    let io_err = |action, path: &Path| {
      let path = path.to_path_buf();
      move |source| LockError::Io { action, path, source }
    };

    fs::create_dir_all(memo_dir).map_err(io_err("create", memo_dir))?;
    let path = memo_dir.join(LOCK_FILENAME);
    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&path)
      .map_err(io_err("open", &path))?;

    match try_lock(&file, mode) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
        return Err(LockError::Busy {
          holder: read_holder(&path),
          lock_path: path,
        });
      }
      Err(e) => return Err(io_err("lock", &path)(e)),
    }

    if mode == LockMode::Exclusive {
      let content = serde_json::to_vec_pretty(holder).map_err(|e| io_err("write", &path)(io::Error::other(e)))?;
      let mut writer = &file;
      file.set_len(0).map_err(io_err("write", &path))?;
      writer.write_all(&content).map_err(io_err("write", &path))?;
    }

    debug!(path = ?path, mode = ?mode, operation = %holder.operation, "memo directory locked");
    Ok(MemoLock { _file: file, path })
  }

  pub fn lock_path(&self) -> &Path {
    &self.path
  }
}

/// The last exclusive holder recorded in the lock file, if readable.
fn read_holder(path: &Path) -> Option<LockHolder> {
  let content = fs::read(path).ok()?;
  serde_json::from_slice(&content).ok()
}

#[cfg(unix)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};

  let operation = if mode == LockMode::Exclusive {
    FlockOperation::NonBlockingLockExclusive
  } else {
    FlockOperation::NonBlockingLockShared
  };
  flock(file, operation).map_err(io::Error::from)
}

#[cfg(windows)]
fn try_lock(file: &File, mode: LockMode) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};
  use windows_sys::Win32::System::IO::OVERLAPPED;

  let mut flags = LOCKFILE_FAIL_IMMEDIATELY;
  if mode == LockMode::Exclusive {
    flags |= LOCKFILE_EXCLUSIVE_LOCK;
  }

  // SAFETY: the handle is owned by `file` and stays open for the call;
  // OVERLAPPED is plain data and valid when zeroed.
  let locked = unsafe {
    let mut overlapped: OVERLAPPED = std::mem::zeroed();
    LockFileEx(file.as_raw_handle() as _, flags, 0, 1, 0, &mut overlapped)
  };
  if locked != 0 {
    Ok(())
  } else {
    let err = io::Error::last_os_error();
    // ERROR_LOCK_VIOLATION
    if err.raw_os_error() == Some(33) {
      Err(io::Error::from(io::ErrorKind::WouldBlock))
    } else {
      Err(err)
    }
  }
}
