//! Shared data model for the DBF sync engine.
//!
//! Every stage of a run speaks these types:
//!
//! ```text
//! reader (dbfsync_dbf) → SyncDataset → filters (dbfsync) → loader (dbfsync_sinks)
//! ```
//!
//! Progress reporting goes through [`ProgressSink`], which the supervising
//! GUI consumes as scraped stdout lines.

pub mod defaults;
pub mod naming;
pub mod progress;
pub mod types;

pub use naming::{file_stem, target_table_name};
pub use progress::{format_count, rate_per_sec, NullProgress, ProgressSink, RecordingProgress};
pub use types::{
    format_float, FieldDescriptor, FieldType, IdentityParseError, Record, SyncDataset,
    TableIdentity, TableSchema, Value,
};
