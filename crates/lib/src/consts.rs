/// Length of the truncated hex digest used for command identities.
pub const OBJ_HASH_PREFIX_LEN: usize = 20;

/// Default memo directory name, relative to the project root.
pub const MEMO_DIR_NAME: &str = ".memake";

/// Environment variable overriding the memo directory.
pub const MEMO_DIR_ENV: &str = "MEMAKE_MEMO_DIR";

/// Default project file name.
pub const PROJECT_FILENAME: &str = "memake.json";
