use std::path::{Path, PathBuf};

use crate::consts::{MEMO_DIR_ENV, MEMO_DIR_NAME};

/// Returns the memo directory for the project rooted at `root`.
///
/// `MEMAKE_MEMO_DIR` takes precedence over the default `<root>/.memake`.
pub fn memo_dir(root: &Path) -> PathBuf {
  match std::env::var_os(MEMO_DIR_ENV) {
    Some(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => root.join(MEMO_DIR_NAME),
  }
}

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Default installation prefix: `~/.local`, or `/usr/local` without a home.
pub fn default_prefix() -> PathBuf {
  home_dir()
    .map(|home| home.join(".local"))
    .unwrap_or_else(|| PathBuf::from("/usr/local"))
}

/// Directory programs are installed into under `prefix`.
pub fn bin_dir(prefix: &Path) -> PathBuf {
  prefix.join("bin")
}
