use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::lock::LockType;

/// Errors from lock operations.
///
/// Every variant means "do not start": an I/O failure while touching the
/// lock files is treated the same as a conflict.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("{lock_type} sync is already running{}", pid_suffix(.pid))]
    Held { lock_type: LockType, pid: Option<u32> },

    #[error("{peer} sync is running{}, refusing to start", pid_suffix(.pid))]
    PeerRunning { peer: LockType, pid: Option<u32> },

    #[error("Another acquirer holds {}, try again", .path.display())]
    Busy { path: PathBuf },

    #[error("Failed to create lock file {}: {source}", .path.display())]
    CreateFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Lock file I/O failed for {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl LockError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True when another holder is in the way, false for I/O failures.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::Held { .. } | Self::PeerRunning { .. } | Self::Busy { .. }
        )
    }
}

fn pid_suffix(pid: &Option<u32>) -> String {
    match pid {
        Some(pid) => format!(" (pid {pid})"),
        None => String::new(),
    }
}
