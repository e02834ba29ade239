//! Test fixtures for the DBF sync engine.
//!
//! [`DbfFixture`] writes legacy fixed-record table files byte by byte so
//! tests can produce exactly the corruption they need: deleted rows,
//! truncated tails, bad type bytes, header counts that lie.
//!
//! ```rust,ignore
//! use dbfsync_test_utils::DbfFixture;
//!
//! let path = DbfFixture::new()
//!     .character("CUSTNO", 10)
//!     .numeric("AMOUNT", 10, 2)
//!     .date("DATE")
//!     .record(["C001", "12.50", "20251212"])
//!     .deleted(["C002", "1.00", "20251201"])
//!     .write_to(dir.path().join("arcust.dbf"))?;
//! ```

use byteorder::{LittleEndian, WriteBytesExt};
use chrono::{NaiveDate, NaiveDateTime, Timelike};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub use tempfile::TempDir;

const HEADER_LEN: usize = 32;
const DESCRIPTOR_LEN: usize = 32;
const FIELD_TERMINATOR: u8 = 0x0D;
const EOF_MARKER: u8 = 0x1A;
const DELETED_FLAG: u8 = b'*';
const ACTIVE_FLAG: u8 = b' ';

/// Julian day number of 1970-01-01.
const JDN_UNIX_EPOCH: i64 = 2_440_588;

#[derive(Debug, Clone)]
struct FixtureField {
    name: String,
    type_byte: u8,
    length: u16,
    decimals: u8,
}

/// Raw content for one field of one record.
#[derive(Debug, Clone)]
pub enum Cell {
    Text(String),
    Bytes(Vec<u8>),
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

impl From<String> for Cell {
    fn from(v: String) -> Self {
        Cell::Text(v)
    }
}

impl From<Vec<u8>> for Cell {
    fn from(v: Vec<u8>) -> Self {
        Cell::Bytes(v)
    }
}

#[derive(Debug, Clone)]
enum FixtureRecord {
    Cells { deleted: bool, cells: Vec<Cell> },
    Raw(Vec<u8>),
}

/// Builder for a legacy binary table file.
#[derive(Debug, Clone, Default)]
pub struct DbfFixture {
    fields: Vec<FixtureField>,
    records: Vec<FixtureRecord>,
    declared_records: Option<u32>,
    declared_record_length: Option<u16>,
    truncate_tail: usize,
    omit_eof_marker: bool,
}

impl DbfFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field with an arbitrary type byte (use this for corrupt types).
    pub fn field(mut self, name: &str, type_byte: u8, length: u16, decimals: u8) -> Self {
        self.fields.push(FixtureField {
            name: name.to_string(),
            type_byte,
            length,
            decimals,
        });
        self
    }

    /// Character field. Lengths above 255 use the high-byte-in-decimals layout.
    pub fn character(self, name: &str, length: u16) -> Self {
        self.field(name, b'C', length, 0)
    }

    pub fn numeric(self, name: &str, length: u16, decimals: u8) -> Self {
        self.field(name, b'N', length, decimals)
    }

    pub fn float(self, name: &str, length: u16, decimals: u8) -> Self {
        self.field(name, b'F', length, decimals)
    }

    pub fn date(self, name: &str) -> Self {
        self.field(name, b'D', 8, 0)
    }

    pub fn datetime(self, name: &str) -> Self {
        self.field(name, b'T', 8, 0)
    }

    pub fn logical(self, name: &str) -> Self {
        self.field(name, b'L', 1, 0)
    }

    pub fn memo(self, name: &str) -> Self {
        self.field(name, b'M', 10, 0)
    }

    /// Append an active record. Text cells are laid out the way legacy
    /// writers do: numerics right-aligned, everything else left-aligned,
    /// padded with spaces.
    pub fn record<I, C>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.records.push(FixtureRecord::Cells {
            deleted: false,
            cells: cells.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Append a record carrying the deletion flag.
    pub fn deleted<I, C>(mut self, cells: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        self.records.push(FixtureRecord::Cells {
            deleted: true,
            cells: cells.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Append raw record bytes (flag byte included), written as-is.
    pub fn raw_record(mut self, bytes: Vec<u8>) -> Self {
        self.records.push(FixtureRecord::Raw(bytes));
        self
    }

    /// Override the record count written to the header.
    pub fn declare_records(mut self, count: u32) -> Self {
        self.declared_records = Some(count);
        self
    }

    /// Override the record length written to the header.
    pub fn declare_record_length(mut self, length: u16) -> Self {
        self.declared_record_length = Some(length);
        self
    }

    /// Cut this many bytes off the end of the file.
    pub fn truncate_tail(mut self, bytes: usize) -> Self {
        self.truncate_tail = bytes;
        self
    }

    pub fn without_eof_marker(mut self) -> Self {
        self.omit_eof_marker = true;
        self
    }

    pub fn record_length(&self) -> u16 {
        1 + self.fields.iter().map(|f| f.length).sum::<u16>()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let header_len = (HEADER_LEN + DESCRIPTOR_LEN * self.fields.len() + 1) as u16;
        let record_count = self
            .declared_records
            .unwrap_or(self.records.len() as u32);
        let record_length = self.declared_record_length.unwrap_or(self.record_length());

        out.push(0x03);
        out.extend_from_slice(&[125, 12, 12]);
        write_u32(&mut out, record_count);
        write_u16(&mut out, header_len);
        write_u16(&mut out, record_length);
        out.resize(HEADER_LEN, 0);

        for field in &self.fields {
            let start = out.len();
            let mut name = field.name.as_bytes().to_vec();
            name.truncate(10);
            name.resize(11, 0);
            out.extend_from_slice(&name);
            out.push(field.type_byte);
            out.extend_from_slice(&[0, 0, 0, 0]);
            if field.type_byte == b'C' && field.length > 255 {
                out.push((field.length & 0xff) as u8);
                out.push((field.length >> 8) as u8);
            } else {
                out.push(field.length.min(255) as u8);
                out.push(field.decimals);
            }
            out.resize(start + DESCRIPTOR_LEN, 0);
        }
        out.push(FIELD_TERMINATOR);

        for record in &self.records {
            match record {
                FixtureRecord::Raw(bytes) => out.extend_from_slice(bytes),
                FixtureRecord::Cells { deleted, cells } => {
                    out.push(if *deleted { DELETED_FLAG } else { ACTIVE_FLAG });
                    for (idx, field) in self.fields.iter().enumerate() {
                        let width = field.length as usize;
                        let bytes = match cells.get(idx) {
                            Some(Cell::Bytes(b)) => fit(b.clone(), width, 0),
                            Some(Cell::Text(t)) => layout_text(field.type_byte, t, width),
                            None => vec![b' '; width],
                        };
                        out.extend_from_slice(&bytes);
                    }
                }
            }
        }

        if !self.omit_eof_marker {
            out.push(EOF_MARKER);
        }
        let keep = out.len().saturating_sub(self.truncate_tail);
        out.truncate(keep);
        out
    }

    pub fn write_to(&self, path: impl AsRef<Path>) -> io::Result<PathBuf> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_bytes())?;
        Ok(path.to_path_buf())
    }
}

/// Binary timestamp cell: Julian day number then milliseconds since midnight.
pub fn datetime_cell(value: NaiveDateTime) -> Vec<u8> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default();
    let days = (value.date() - epoch).num_days() + JDN_UNIX_EPOCH;
    let millis = value.time().num_seconds_from_midnight() * 1_000
        + value.time().nanosecond() / 1_000_000;
    let mut out = Vec::with_capacity(8);
    let _ = out.write_u32::<LittleEndian>(days as u32);
    let _ = out.write_u32::<LittleEndian>(millis);
    out
}

/// Write `n` into a fresh temp dir as `<group>/<subpath>/<table>.dbf`
/// and return the root; mirrors the layout the driver scans.
pub fn write_source_tree(
    root: &Path,
    group: &str,
    subpath: &str,
    table: &str,
    fixture: &DbfFixture,
) -> io::Result<PathBuf> {
    fixture.write_to(root.join(group).join(subpath).join(format!("{table}.dbf")))
}

fn layout_text(type_byte: u8, text: &str, width: usize) -> Vec<u8> {
    let bytes = text.as_bytes();
    if bytes.len() >= width {
        return bytes[..width].to_vec();
    }
    let pad = vec![b' '; width - bytes.len()];
    match type_byte {
        b'N' | b'F' => [pad, bytes.to_vec()].concat(),
        _ => [bytes.to_vec(), pad].concat(),
    }
}

fn fit(mut bytes: Vec<u8>, width: usize, fill: u8) -> Vec<u8> {
    bytes.resize(width, fill);
    bytes
}

fn write_u16(out: &mut Vec<u8>, value: u16) {
    let _ = out.write_u16::<LittleEndian>(value);
}

fn write_u32(out: &mut Vec<u8>, value: u32) {
    let _ = out.write_u32::<LittleEndian>(value);
}
