//! Build memo store.
//!
//! Remembers, per command identity, which files the command read and wrote
//! (with fingerprints) the last time it succeeded. The dependency checker
//! consults it to skip commands whose inputs are unchanged; clean consults
//! it to find build outputs.

pub mod lock;
pub mod store;
pub mod types;

pub use lock::{LockError, LockHolder, LockMode, MemoLock};
pub use store::MemoStore;
pub use types::{CommandRecord, Fingerprint, FingerprintPolicy, MemoError};
