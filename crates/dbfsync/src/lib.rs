//! Sync agent that copies legacy DBF tables into a relational database.
//!
//! A run reads every table in the configured plan, applies the per-table
//! business filters and replaces the matching destination table:
//!
//! ```text
//! {root}/{group}/{subpath}/{table}.dbf
//!     → DbfReader (strict, then lenient)
//!     → FilterRegistry (date cutoff, keep-latest, pass-through)
//!     → BulkLoader → {prefix}_{group}_{table}
//! ```

pub mod config;
pub mod filter;
pub mod progress;
pub mod runner;

pub use config::{ConfigError, Overrides, PlannedTable, SyncConfig};
pub use filter::{CutoffDate, FilterOutcome, FilterRegistry, FilterRule, FilterSpec};
pub use progress::StdoutProgress;
pub use runner::{SyncReport, SyncRunner, TableFailure, TableOutcome};
