//! Primary decoder. Rejects any structural inconsistency outright so the
//! lenient decoder gets a chance at the file.

use dbfsync_protocol::{FieldType, ProgressSink};
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use crate::decode::{decode_record, RawTable};
use crate::error::{ReadError, Result};
use crate::header::{DbfHeader, DELETED_FLAG};
use crate::reader::{ReadProgress, TableDecoder};

#[derive(Debug, Default, Clone, Copy)]
pub struct StrictDecoder;

impl StrictDecoder {
    fn validate(header: &DbfHeader, file_len: u64) -> Result<()> {
        if !header.terminated {
            return Err(ReadError::header("field descriptor list is not terminated"));
        }
        if header.schema.is_empty() {
            return Err(ReadError::NoFields);
        }
        for field in header.schema.fields() {
            if let FieldType::Other(byte) = field.field_type {
                if !byte.is_ascii_alphabetic() {
                    return Err(ReadError::InvalidFieldType {
                        field: field.name.clone(),
                        byte,
                    });
                }
            }
        }

        let computed = header.schema.record_length();
        let declared = header.record_length as usize;
        if computed != declared {
            return Err(ReadError::RecordLengthMismatch { declared, computed });
        }

        let expected = header.data_offset() + header.record_count as u64 * declared as u64;
        if file_len < expected {
            return Err(ReadError::Truncated {
                expected,
                actual: file_len,
            });
        }
        Ok(())
    }
}

impl TableDecoder for StrictDecoder {
    fn name(&self) -> &'static str {
        "strict"
    }

    fn decode(&self, path: &Path, progress: &dyn ProgressSink) -> Result<RawTable> {
        let file = File::open(path).map_err(|e| ReadError::io(path, e))?;
        let file_len = file.metadata().map_err(|e| ReadError::io(path, e))?.len();
        let mut reader = BufReader::new(file);

        let header = DbfHeader::read_from(&mut reader, path)?;
        Self::validate(&header, file_len)?;

        reader
            .seek(SeekFrom::Start(header.data_offset()))
            .map_err(|e| ReadError::io(path, e))?;

        let mut ticker = ReadProgress::new(progress);
        let mut slot = vec![0u8; header.record_length as usize];
        let mut records = Vec::with_capacity(header.record_count as usize);
        for _ in 0..header.record_count {
            reader
                .read_exact(&mut slot)
                .map_err(|e| ReadError::io(path, e))?;
            if slot[0] == DELETED_FLAG {
                continue;
            }
            records.push(decode_record(&header.schema, &slot));
            ticker.tick();
        }

        Ok(RawTable {
            schema: header.schema,
            records,
        })
    }
}
