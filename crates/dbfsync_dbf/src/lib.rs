//! Legacy fixed-record table reader.
//!
//! [`DbfReader`] runs a chain of [`TableDecoder`]s over a file: the
//! [`StrictDecoder`] first, which refuses any structural inconsistency,
//! then the [`LenientDecoder`], which pads short records and stops at end
//! of file. Decoded values are normalized into a [`SyncDataset`]. When
//! every decoder fails the reader returns an empty dataset instead of an
//! error.
//!
//! [`SyncDataset`]: dbfsync_protocol::SyncDataset

pub mod decode;
pub mod error;
pub mod header;
pub mod lenient;
pub mod normalize;
pub mod reader;
pub mod repair;
pub mod strict;

pub use decode::{RawRecord, RawTable, RawValue};
pub use error::{ReadError, Result};
pub use header::DbfHeader;
pub use lenient::LenientDecoder;
pub use normalize::{is_date_field_name, normalize, normalize_table, normalize_value};
pub use reader::{DbfReader, TableDecoder};
pub use repair::{repair_file, RepairReport};
pub use strict::StrictDecoder;
