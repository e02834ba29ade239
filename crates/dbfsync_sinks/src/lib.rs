//! Relational destinations for the DBF sync engine.
//!
//! - [`schema`] maps legacy field types to column types and renders DDL
//!   per [`Dialect`].
//! - [`BulkLoader`] replaces a table's contents in fixed-size batches,
//!   recovering from oversized payloads and dropped connections.
//! - [`SqlxDestination`] talks to MySQL, PostgreSQL or SQLite through the
//!   sqlx `Any` driver; [`MemoryDestination`] keeps everything in memory
//!   and can inject faults.

pub mod error;
pub mod loader;
pub mod memory;
pub mod schema;
pub mod sqlx_store;
pub mod store;
pub mod sync_log;
pub mod value;

pub use error::{LoadError, StoreError};
pub use loader::{BulkLoader, LoadReport, LoaderOptions};
pub use memory::{MemoryDestination, MemoryTable};
pub use schema::{columns_for, create_table_sql, map_schema, Column, ColumnType, Dialect};
pub use sqlx_store::{SessionOptions, SqlxDestination};
pub use store::{Destination, DestinationSession};
pub use sync_log::{ensure_sync_log, record_sync, SYNC_LOG_TABLE};
pub use value::{coerce, truncate_to_bytes};
