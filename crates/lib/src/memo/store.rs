//! Persistent memo store.
//!
//! # Storage Layout
//!
//! ```text
//! {memo_dir}/
//! ├── .lock              # MemoLock, held for the duration of a build
//! ├── store.json         # StoreMeta: format version + fingerprint policy
//! └── records/
//!     └── <id>.json      # One CommandRecord per command identity
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so a
//! process killed mid-write leaves either the old record or the new one.
//! Anything unreadable on load is dropped with a warning: the affected
//! commands simply run again.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::command::CommandId;
use crate::util::hash::ObjectHash;

use super::types::{CommandRecord, FingerprintPolicy, MEMO_FORMAT_VERSION, MemoError, StoreMeta};

const META_FILENAME: &str = "store.json";
const RECORDS_DIR: &str = "records";

/// Disk-backed map from command identity to the record of its last
/// successful run.
///
/// Lookups take a read lock and may run concurrently; writes to disk are
/// serialized by a separate writer mutex.
#[derive(Debug)]
pub struct MemoStore {
  dir: PathBuf,
  policy: FingerprintPolicy,
  writable: bool,
  records: RwLock<HashMap<CommandId, CommandRecord>>,
  writer: Mutex<()>,
}

impl MemoStore {
  /// Open the store in `dir`, creating it if needed.
  ///
  /// With `requested = None` the store keeps whatever policy it was created
  /// with (mtime for a new store). A requested policy that differs from the
  /// persisted one is rejected: one store never mixes policies.
  pub fn open(dir: &Path, requested: Option<FingerprintPolicy>) -> Result<Self, MemoError> {
    Self::load(dir, requested, true)
  }

  /// Open the store without touching the disk.
  ///
  /// No header is written and nothing is pruned; a missing or untrusted
  /// store reads as empty. Every mutating method fails with `ReadOnly`.
  pub fn open_read_only(dir: &Path, requested: Option<FingerprintPolicy>) -> Result<Self, MemoError> {
    Self::load(dir, requested, false)
  }

  fn load(dir: &Path, requested: Option<FingerprintPolicy>, writable: bool) -> Result<Self, MemoError> {
    if writable {
      fs::create_dir_all(dir).map_err(|source| MemoError::CreateDir {
        path: dir.to_path_buf(),
        source,
      })?;
    }

    let meta_path = dir.join(META_FILENAME);
    let stored = match read_meta(&meta_path) {
      Ok(meta) => meta,
      Err(reason) => {
        warn!(path = ?meta_path, reason = %reason, "memo store corrupt, starting from empty history");
        None
      }
    };

    let records_dir = dir.join(RECORDS_DIR);
    let trusted = stored.is_some();
    let policy = match (stored, requested) {
      (Some(meta), Some(requested)) if meta.policy != requested => {
        return Err(MemoError::PolicyMismatch {
          path: dir.to_path_buf(),
          stored: meta.policy,
          requested,
        });
      }
      (Some(meta), _) => meta.policy,
      (None, requested) => {
        let policy = requested.unwrap_or_default();
        if writable {
          // History without a valid header cannot be trusted
          remove_dir_if_exists(&records_dir)?;
          write_json_atomic(
            &meta_path,
            &StoreMeta {
              version: MEMO_FORMAT_VERSION,
              policy,
            },
          )?;
        }
        policy
      }
    };

    if writable {
      fs::create_dir_all(&records_dir).map_err(|source| MemoError::CreateDir {
        path: records_dir.clone(),
        source,
      })?;
    }

    let records = if trusted {
      load_records(&records_dir, policy, writable)
    } else {
      HashMap::new()
    };
    info!(dir = ?dir, policy = %policy, records = records.len(), writable, "opened memo store");

    Ok(Self {
      dir: dir.to_path_buf(),
      policy,
      writable,
      records: RwLock::new(records),
      writer: Mutex::new(()),
    })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  /// The fingerprint policy every record in this store uses.
  pub fn policy(&self) -> FingerprintPolicy {
    self.policy
  }

  /// The record for `id`, if the command has succeeded before.
  pub fn lookup(&self, id: &CommandId) -> Option<CommandRecord> {
    self.read_records().get(id).cloned()
  }

  /// Replace the record for `id`.
  ///
  /// The record file is written before the in-memory entry changes, so a
  /// failed write leaves the store as it was. A record fingerprinted under
  /// another policy is rejected.
  pub fn update(&self, id: &CommandId, record: CommandRecord) -> Result<(), MemoError> {
    self.ensure_writable()?;
    if !record.uses_policy(self.policy) {
      let requested = record
        .reads
        .values()
        .chain(record.writes.values())
        .map(|fp| fp.policy())
        .find(|p| *p != self.policy)
        .unwrap_or(record.policy);
      return Err(MemoError::PolicyMismatch {
        path: self.dir.clone(),
        stored: self.policy,
        requested,
      });
    }
    let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

    write_json_atomic(&self.record_path(id), &record)?;
    self.write_records().insert(id.clone(), record);

    debug!(id = %id, "memo record updated");
    Ok(())
  }

  /// Forget `id`, so the command is treated as never having run.
  pub fn invalidate(&self, id: &CommandId) -> Result<(), MemoError> {
    self.ensure_writable()?;
    let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

    let path = self.record_path(id);
    match fs::remove_file(&path) {
      Ok(()) => debug!(id = %id, "memo record invalidated"),
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(source) => return Err(MemoError::Remove { path, source }),
    }
    self.write_records().remove(id);
    Ok(())
  }

  /// Every path any recorded command wrote.
  pub fn all_recorded_outputs(&self) -> BTreeSet<PathBuf> {
    self
      .read_records()
      .values()
      .flat_map(|record| record.writes.keys().cloned())
      .collect()
  }

  /// Records whose written files all lie under `root`, with those files.
  pub fn recorded_outputs_under(&self, root: &Path) -> Vec<(CommandId, BTreeSet<PathBuf>)> {
    let mut owned: Vec<_> = self
      .read_records()
      .iter()
      .filter(|(_, record)| record.writes.keys().all(|path| path.starts_with(root)))
      .map(|(id, record)| (id.clone(), record.writes.keys().cloned().collect()))
      .collect();
    owned.sort();
    owned
  }

  /// Drop every record and the store header.
  pub fn clear(&self) -> Result<(), MemoError> {
    self.ensure_writable()?;
    let _guard = self.writer.lock().unwrap_or_else(|e| e.into_inner());

    remove_dir_if_exists(&self.dir.join(RECORDS_DIR))?;
    let meta_path = self.dir.join(META_FILENAME);
    match fs::remove_file(&meta_path) {
      Ok(()) => {}
      Err(e) if e.kind() == io::ErrorKind::NotFound => {}
      Err(source) => return Err(MemoError::Remove { path: meta_path, source }),
    }
    self.write_records().clear();

    info!(dir = ?self.dir, "memo store cleared");
    Ok(())
  }

  pub fn len(&self) -> usize {
    self.read_records().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  fn ensure_writable(&self) -> Result<(), MemoError> {
    if self.writable {
      Ok(())
    } else {
      Err(MemoError::ReadOnly(self.dir.clone()))
    }
  }

  fn record_path(&self, id: &CommandId) -> PathBuf {
    self.dir.join(RECORDS_DIR).join(format!("{}.json", id.0))
  }

  fn read_records(&self) -> std::sync::RwLockReadGuard<'_, HashMap<CommandId, CommandRecord>> {
    self.records.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write_records(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<CommandId, CommandRecord>> {
    self.records.write().unwrap_or_else(|e| e.into_inner())
  }
}

/// Read `store.json`.
///
/// `Ok(None)` means no store exists yet; `Err(reason)` means the file exists
/// but cannot be trusted.
fn read_meta(path: &Path) -> Result<Option<StoreMeta>, String> {
  let content = match fs::read_to_string(path) {
    Ok(content) => content,
    Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
    Err(e) => return Err(e.to_string()),
  };

  let meta: StoreMeta = serde_json::from_str(&content).map_err(|e| e.to_string())?;
  if meta.version != MEMO_FORMAT_VERSION {
    return Err(format!("unsupported format version {}", meta.version));
  }
  Ok(Some(meta))
}

/// Load every valid record in `dir`. With `prune`, leftovers from
/// interrupted writes are deleted.
fn load_records(dir: &Path, policy: FingerprintPolicy, prune: bool) -> HashMap<CommandId, CommandRecord> {
  let mut records = HashMap::new();

  let entries = match fs::read_dir(dir) {
    Ok(entries) => entries,
    Err(e) => {
      warn!(dir = ?dir, error = %e, "failed to list memo records, starting from empty history");
      return records;
    }
  };

  for entry in entries.flatten() {
    let path = entry.path();
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
      continue;
    };
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
      if prune {
        // Leftover from an interrupted write
        let _ = fs::remove_file(&path);
      }
      continue;
    }

    let parsed = fs::read_to_string(&path)
      .map_err(|e| e.to_string())
      .and_then(|content| serde_json::from_str::<CommandRecord>(&content).map_err(|e| e.to_string()));

    match parsed {
      Ok(record) if record.version == MEMO_FORMAT_VERSION && record.uses_policy(policy) => {
        records.insert(ObjectHash(stem.to_string()), record);
      }
      Ok(_) => {
        warn!(path = ?path, "ignoring memo record with foreign version or policy");
      }
      Err(e) => {
        warn!(path = ?path, error = %e, "ignoring corrupt memo record");
      }
    }
  }

  records
}

/// Write `value` as JSON to `path` via a temporary file in the same directory.
fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), MemoError> {
  let dir = path.parent().unwrap_or_else(|| Path::new("."));
  let write_err = |source| MemoError::Write {
    path: path.to_path_buf(),
    source,
  };

  let content = serde_json::to_vec_pretty(value)?;
  let mut temp = NamedTempFile::new_in(dir).map_err(write_err)?;
  temp.write_all(&content).map_err(write_err)?;
  temp.as_file().sync_all().map_err(write_err)?;
  temp.persist(path).map_err(|e| write_err(e.error))?;
  Ok(())
}

fn remove_dir_if_exists(path: &Path) -> Result<(), MemoError> {
  match fs::remove_dir_all(path) {
    Ok(()) => Ok(()),
    Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
    Err(source) => Err(MemoError::Remove {
      path: path.to_path_buf(),
      source,
    }),
  }
}
