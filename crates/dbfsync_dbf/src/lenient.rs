//! Fallback decoder working straight off the record stride.
//!
//! Trusts only the header's record count and length. Short slots are
//! padded with NUL bytes, and reading stops at end of file.

use dbfsync_protocol::ProgressSink;
use std::fs::File;
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::{debug, warn};

use crate::decode::{decode_record, RawTable};
use crate::error::{ReadError, Result};
use crate::header::{DbfHeader, DELETED_FLAG, EOF_MARKER};
use crate::reader::{ReadProgress, TableDecoder};

#[derive(Debug, Default, Clone, Copy)]
pub struct LenientDecoder;

impl TableDecoder for LenientDecoder {
    fn name(&self) -> &'static str {
        "lenient"
    }

    fn decode(&self, path: &Path, progress: &dyn ProgressSink) -> Result<RawTable> {
        let file = File::open(path).map_err(|e| ReadError::io(path, e))?;
        let mut reader = BufReader::new(file);

        let header = DbfHeader::read_from(&mut reader, path)?;
        if header.schema.is_empty() {
            return Err(ReadError::NoFields);
        }

        let stride = match header.record_length as usize {
            0 => header.schema.record_length(),
            declared => declared,
        };
        if stride != header.schema.record_length() {
            debug!(
                path = %path.display(),
                declared = stride,
                computed = header.schema.record_length(),
                "record stride differs from field layout"
            );
        }

        reader
            .seek(SeekFrom::Start(header.data_offset()))
            .map_err(|e| ReadError::io(path, e))?;

        let mut ticker = ReadProgress::new(progress);
        let mut slot = vec![0u8; stride];
        let mut records = Vec::new();
        let mut padded = 0u64;

        for index in 0..header.record_count {
            let n = read_slot(&mut reader, &mut slot).map_err(|e| ReadError::io(path, e))?;
            if n == 0 || (n == 1 && slot[0] == EOF_MARKER) {
                warn!(
                    path = %path.display(),
                    read = index,
                    declared = header.record_count,
                    "table ended before declared record count"
                );
                break;
            }
            if n < stride {
                slot[n..].fill(0);
                padded += 1;
                warn!(
                    path = %path.display(),
                    record = index,
                    padded_bytes = stride - n,
                    "short record padded"
                );
            }
            if slot[0] == DELETED_FLAG {
                continue;
            }
            records.push(decode_record(&header.schema, &slot));
            ticker.tick();
        }

        if padded > 0 {
            debug!(path = %path.display(), padded, "lenient decode repaired records");
        }

        Ok(RawTable {
            schema: header.schema,
            records,
        })
    }
}

/// Fill `buf` as far as the file allows, returning the bytes read.
pub(crate) fn read_slot<R: Read>(reader: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
