//! Offline rewrite of a damaged table file.
//!
//! Short slots are padded, over-long tails cut, deleted records dropped,
//! and the header record count rewritten to match what was kept. The
//! original is copied to `<file>.backup` first.

use byteorder::{LittleEndian, WriteBytesExt};
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{ReadError, Result};
use crate::header::{DbfHeader, DELETED_FLAG, EOF_MARKER};
use crate::lenient::read_slot;

const RECORD_COUNT_OFFSET: u64 = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport {
    pub output: PathBuf,
    pub backup: PathBuf,
    pub kept: u32,
    pub padded: u32,
    pub deleted: u32,
}

/// `<path><suffix>`, keeping the original extension.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

pub fn repair_file(input: &Path, output: Option<&Path>) -> Result<RepairReport> {
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| with_suffix(input, ".repaired"));
    let backup = with_suffix(input, ".backup");

    fs::copy(input, &backup).map_err(|e| ReadError::io(&backup, e))?;
    info!(input = %input.display(), backup = %backup.display(), "backup created");

    let mut reader = BufReader::new(File::open(input).map_err(|e| ReadError::io(input, e))?);
    let header = DbfHeader::read_from(&mut reader, input)?;
    let stride = match header.record_length as usize {
        0 => header.schema.record_length(),
        declared => declared,
    };

    reader
        .seek(SeekFrom::Start(0))
        .map_err(|e| ReadError::io(input, e))?;
    let mut header_bytes = vec![0u8; header.header_length as usize];
    reader
        .read_exact(&mut header_bytes)
        .map_err(|e| ReadError::io(input, e))?;

    let out_file = File::create(&output).map_err(|e| ReadError::io(&output, e))?;
    let mut writer = BufWriter::new(out_file);
    writer
        .write_all(&header_bytes)
        .map_err(|e| ReadError::io(&output, e))?;

    let mut slot = vec![0u8; stride];
    let mut report = RepairReport {
        output: output.clone(),
        backup,
        kept: 0,
        padded: 0,
        deleted: 0,
    };

    for index in 0..header.record_count {
        let n = read_slot(&mut reader, &mut slot).map_err(|e| ReadError::io(input, e))?;
        if n == 0 || (n == 1 && slot[0] == EOF_MARKER) {
            warn!(record = index, "end of file reached before declared record count");
            break;
        }
        if n < stride {
            slot[n..].fill(0);
            report.padded += 1;
        }
        if slot[0] == DELETED_FLAG {
            report.deleted += 1;
            continue;
        }
        writer.write_all(&slot).map_err(|e| ReadError::io(&output, e))?;
        report.kept += 1;
    }

    writer
        .write_u8(EOF_MARKER)
        .map_err(|e| ReadError::io(&output, e))?;
    writer
        .seek(SeekFrom::Start(RECORD_COUNT_OFFSET))
        .map_err(|e| ReadError::io(&output, e))?;
    writer
        .write_u32::<LittleEndian>(report.kept)
        .map_err(|e| ReadError::io(&output, e))?;
    writer.flush().map_err(|e| ReadError::io(&output, e))?;

    info!(
        output = %report.output.display(),
        kept = report.kept,
        padded = report.padded,
        deleted = report.deleted,
        "repair completed"
    );
    Ok(report)
}
