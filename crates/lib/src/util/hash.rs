//! Hashing utilities for command identities and file fingerprints.
//!
//! This module provides:
//! - `ObjectHash`: A truncated 20-character hash identifying a command
//! - `hash_file()`: The full hex SHA-256 of a file, for content fingerprints

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consts::OBJ_HASH_PREFIX_LEN;

pub type HashError = serde_json::Error;

/// A hash identifying a unique object, such as a build command.
///
/// The hash is a 20-character truncated SHA-256 of the JSON-serialized struct.
///
/// # Format
///
/// The hash is a lowercase hexadecimal string, e.g., `"a1b2c3d4e5f6789012ab"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectHash(pub String);

impl std::fmt::Display for ObjectHash {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait Hashable: Serialize {
  fn compute_hash(&self) -> Result<ObjectHash, HashError> {
    let serialized = serde_json::to_string(self)?;
    let mut hasher = Sha256::new();
    hasher.update(serialized.as_bytes());
    let full = format!("{:x}", hasher.finalize());
    Ok(ObjectHash(full[..OBJ_HASH_PREFIX_LEN].to_string()))
  }
}

/// Lowercase hex SHA-256 of a file's contents.
pub fn hash_file(path: &Path) -> io::Result<String> {
  let mut hasher = Sha256::new();
  io::copy(&mut fs::File::open(path)?, &mut hasher)?;
  Ok(format!("{:x}", hasher.finalize()))
}
