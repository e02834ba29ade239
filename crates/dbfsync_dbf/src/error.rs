//! Error types for whole-file decode failures.
//!
//! Per-field and per-record problems never surface here; they degrade to
//! null values or skipped slots inside the decoders.

use std::path::{Path, PathBuf};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReadError>;

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid header: {0}")]
    Header(String),

    #[error("Table declares no fields")]
    NoFields,

    #[error("Field {field} has invalid type byte 0x{byte:02x}")]
    InvalidFieldType { field: String, byte: u8 },

    #[error("record length mismatch: header says {declared}, fields sum to {computed}")]
    RecordLengthMismatch { declared: usize, computed: usize },

    #[error("File truncated: expected at least {expected} bytes, found {actual}")]
    Truncated { expected: u64, actual: u64 },

    #[error("All decoders failed for {path}: {last}")]
    Exhausted { path: PathBuf, last: Box<ReadError> },
}

impl ReadError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn header(msg: impl Into<String>) -> Self {
        Self::Header(msg.into())
    }
}
