//! Types persisted by the memo store.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::command::Command;
use crate::util::hash::hash_file;

/// Current on-disk format version for `store.json` and record files.
pub const MEMO_FORMAT_VERSION: u32 = 1;

/// How file state is compared between runs.
///
/// A store uses exactly one policy for all of its records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintPolicy {
  /// Modification time plus size.
  #[default]
  Mtime,
  /// SHA-256 of the contents.
  Hash,
}

impl fmt::Display for FingerprintPolicy {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FingerprintPolicy::Mtime => write!(f, "mtime"),
      FingerprintPolicy::Hash => write!(f, "hash"),
    }
  }
}

impl FromStr for FingerprintPolicy {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "mtime" => Ok(FingerprintPolicy::Mtime),
      "hash" => Ok(FingerprintPolicy::Hash),
      other => Err(format!("unknown fingerprint policy: {}", other)),
    }
  }
}

/// The state of one file at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Fingerprint {
  Mtime { secs: u64, nanos: u32, size: u64 },
  Hash { sha256: String },
}

impl Fingerprint {
  /// Fingerprint `path` under `policy`.
  pub fn compute(path: &Path, policy: FingerprintPolicy) -> io::Result<Self> {
    match policy {
      FingerprintPolicy::Mtime => {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified()?.duration_since(UNIX_EPOCH).unwrap_or_default();
        Ok(Fingerprint::Mtime {
          secs: modified.as_secs(),
          nanos: modified.subsec_nanos(),
          size: metadata.len(),
        })
      }
      FingerprintPolicy::Hash => Ok(Fingerprint::Hash {
        sha256: hash_file(path)?,
      }),
    }
  }

  /// The policy this fingerprint was taken under.
  pub fn policy(&self) -> FingerprintPolicy {
    match self {
      Fingerprint::Mtime { .. } => FingerprintPolicy::Mtime,
      Fingerprint::Hash { .. } => FingerprintPolicy::Hash,
    }
  }
}

/// The identifying fields of a recorded command, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedCommand {
  pub program: String,
  pub args: Vec<String>,
  pub output: PathBuf,
}

/// What a command read and wrote the last time it succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
  pub version: u32,
  pub policy: FingerprintPolicy,
  pub command: RecordedCommand,
  pub reads: BTreeMap<PathBuf, Fingerprint>,
  pub writes: BTreeMap<PathBuf, Fingerprint>,
}

impl CommandRecord {
  /// Fingerprint the observed read and write sets of a command that just
  /// succeeded. A path in both sets is recorded as a write only.
  pub fn capture(
    command: &Command,
    reads: &BTreeSet<PathBuf>,
    writes: &BTreeSet<PathBuf>,
    policy: FingerprintPolicy,
  ) -> Result<Self, MemoError> {
    let fingerprint = |path: &PathBuf| {
      Fingerprint::compute(path, policy)
        .map(|fp| (path.clone(), fp))
        .map_err(|source| MemoError::Fingerprint {
          path: path.clone(),
          source,
        })
    };

    let writes = writes.iter().map(&fingerprint).collect::<Result<BTreeMap<_, _>, _>>()?;
    let reads = reads
      .iter()
      .filter(|path| !writes.contains_key(*path))
      .map(&fingerprint)
      .collect::<Result<BTreeMap<_, _>, _>>()?;

    Ok(Self {
      version: MEMO_FORMAT_VERSION,
      policy,
      command: RecordedCommand {
        program: command.program().to_string(),
        args: command.args().to_vec(),
        output: command.output().to_path_buf(),
      },
      reads,
      writes,
    })
  }

  /// True if every fingerprint in the record was taken under `policy`.
  pub fn uses_policy(&self, policy: FingerprintPolicy) -> bool {
    self.policy == policy
      && self
        .reads
        .values()
        .chain(self.writes.values())
        .all(|fp| fp.policy() == policy)
  }
}

/// Contents of `store.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMeta {
  pub version: u32,
  pub policy: FingerprintPolicy,
}

/// Errors from the memo store.
#[derive(Debug, Error)]
pub enum MemoError {
  #[error("memo store at {path} was written with fingerprint policy '{stored}', not '{requested}'; run clean first")]
  PolicyMismatch {
    path: PathBuf,
    stored: FingerprintPolicy,
    requested: FingerprintPolicy,
  },

  #[error("memo store at {0} was opened read-only")]
  ReadOnly(PathBuf),

  #[error("failed to create memo directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write {path}: {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to remove {path}: {source}")]
  Remove {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to serialize memo data: {0}")]
  Serialize(#[from] serde_json::Error),

  #[error("failed to fingerprint {path}: {source}")]
  Fingerprint {
    path: PathBuf,
    #[source]
    source: io::Error,
  },
}
