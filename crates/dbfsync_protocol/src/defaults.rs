//! Canonical default values shared by the reader, loader and driver.

pub const DEFAULT_TABLE_PREFIX: &str = "ubs";
pub const DEFAULT_SOURCE_ROOT: &str = "C:/";
pub const DEFAULT_SOURCE_SUBPATH: &str = "Sample";
pub const DEFAULT_LOCK_DIR: &str = "locks";
pub const DEFAULT_DATABASE_NAME: &str = "your_database";

/// Rows per INSERT round trip.
pub const DEFAULT_BATCH_SIZE: usize = 1_000;
/// Rows per round trip when a batch was rejected as oversized.
pub const DEFAULT_OVERSIZE_SUB_BATCH: usize = 100;
/// Byte cap applied to every string on the first insert attempt.
pub const DEFAULT_STRING_CAP_BYTES: usize = 10_000;
/// Byte cap applied to every string when retrying an oversized batch.
pub const DEFAULT_OVERSIZE_STRING_CAP_BYTES: usize = 1_000;

pub const DEFAULT_LOAD_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF_SECS: u64 = 2;

/// Session idle timeout (8 hours); legacy files can take minutes to stream.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 28_800;
pub const DEFAULT_NET_TIMEOUT_SECS: u64 = 600;

/// Reader progress cadence in records.
pub const READ_PROGRESS_EVERY: u64 = 10_000;
