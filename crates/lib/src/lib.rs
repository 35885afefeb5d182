//! memake-lib: an incremental build engine for C programs assembled from
//! shared source modules.
//!
//! The pieces, leaves first:
//! - `runner`: runs one compile or link command and observes the files it touches
//! - `memo`: the persistent record of each command's last successful run
//! - `check`: decides from the record whether a command must run again
//! - `plan`: expands a project file into compile and link commands
//! - `execute`: runs commands in dependency order, in parallel, gated by `check`
//! - `ops`: the `build`, `plan`, `clean` and `install` operations

pub mod check;
pub mod command;
pub mod consts;
pub mod execute;
pub mod memo;
pub mod ops;
pub mod plan;
pub mod platform;
pub mod runner;
pub mod util;
