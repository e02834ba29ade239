//! Cross-process lock between the local and remote sync agents.
//!
//! The two agents are separate processes (and historically separate
//! languages) that coordinate through a pair of small text files per
//! agent in a shared directory. An agent refuses to start while the other
//! one holds a live lock; a lock whose holder has died is reclaimed.
//!
//! ```no_run
//! use dbfsync_lock::{LockType, OsProcessProbe, SyncLockManager};
//!
//! let locks = SyncLockManager::new("locks", Box::new(OsProcessProbe));
//! let _guard = locks.acquire_guard(LockType::Local)?;
//! // ... run the sync; the lock is released when the guard drops
//! # Ok::<(), dbfsync_lock::LockError>(())
//! ```

mod error;
mod lock;
mod probe;

pub use error::LockError;
pub use lock::{
    LockPaths, LockState, LockStatus, LockType, SyncLockGuard, SyncLockManager, PID_WRITE_GRACE,
};
pub use probe::{Liveness, OsProcessProbe, ProcessProbe};
