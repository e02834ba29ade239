//! File header and field descriptor parsing shared by both decoders.

use byteorder::{LittleEndian, ReadBytesExt};
use dbfsync_protocol::{FieldDescriptor, FieldType, TableSchema};
use std::io::{ErrorKind, Read};
use std::path::Path;

use crate::error::{ReadError, Result};

pub const HEADER_LEN: usize = 32;
pub const DESCRIPTOR_LEN: usize = 32;
pub const FIELD_TERMINATOR: u8 = 0x0D;
pub const DELETED_FLAG: u8 = 0x2A;
pub const EOF_MARKER: u8 = 0x1A;

/// Fixed header plus the field descriptor list.
#[derive(Debug, Clone)]
pub struct DbfHeader {
    pub version: u8,
    pub record_count: u32,
    pub header_length: u16,
    pub record_length: u16,
    pub schema: TableSchema,
    /// False when the descriptor area ran out before the terminator byte.
    pub terminated: bool,
}

impl DbfHeader {
    /// Parse from the start of a table file, leaving the reader somewhere
    /// inside the header. Callers seek to `header_length` before reading
    /// records.
    pub fn read_from<R: Read>(reader: &mut R, path: &Path) -> Result<Self> {
        let io_err = |e: std::io::Error| {
            if e.kind() == ErrorKind::UnexpectedEof {
                ReadError::header("header too short")
            } else {
                ReadError::io(path, e)
            }
        };

        let version = reader.read_u8().map_err(io_err)?;
        let mut last_update = [0u8; 3];
        reader.read_exact(&mut last_update).map_err(io_err)?;
        let record_count = reader.read_u32::<LittleEndian>().map_err(io_err)?;
        let header_length = reader.read_u16::<LittleEndian>().map_err(io_err)?;
        let record_length = reader.read_u16::<LittleEndian>().map_err(io_err)?;
        let mut reserved = [0u8; HEADER_LEN - 12];
        reader.read_exact(&mut reserved).map_err(io_err)?;

        if (header_length as usize) <= HEADER_LEN {
            return Err(ReadError::header(format!(
                "header length {header_length} leaves no room for field descriptors"
            )));
        }

        let area_len = header_length as usize - HEADER_LEN;
        let mut area = Vec::with_capacity(area_len);
        reader
            .by_ref()
            .take(area_len as u64)
            .read_to_end(&mut area)
            .map_err(|e| ReadError::io(path, e))?;

        let (fields, terminated) = parse_descriptors(&area);

        Ok(Self {
            version,
            record_count,
            header_length,
            record_length,
            schema: TableSchema::new(fields),
            terminated,
        })
    }

    /// Offset of the first record slot.
    pub fn data_offset(&self) -> u64 {
        self.header_length as u64
    }
}

fn parse_descriptors(area: &[u8]) -> (Vec<FieldDescriptor>, bool) {
    let mut fields = Vec::new();
    let mut pos = 0;
    while pos < area.len() && area[pos] != FIELD_TERMINATOR {
        let Some(raw) = area.get(pos..pos + DESCRIPTOR_LEN) else {
            break;
        };
        fields.push(parse_descriptor(raw));
        pos += DESCRIPTOR_LEN;
    }
    let terminated = area.get(pos) == Some(&FIELD_TERMINATOR);
    (fields, terminated)
}

fn parse_descriptor(raw: &[u8]) -> FieldDescriptor {
    let name_bytes = &raw[..11];
    let name_end = name_bytes.iter().position(|b| *b == 0).unwrap_or(name_bytes.len());
    let name = String::from_utf8_lossy(&name_bytes[..name_end]).trim().to_string();

    let type_byte = raw[11];
    let field_type = FieldType::from_code(type_byte);
    let (length, decimal_count) = match field_type {
        // Wide character fields keep the high length byte in the decimals slot.
        FieldType::Character => (u16::from(raw[16]) | (u16::from(raw[17]) << 8), 0),
        _ => (u16::from(raw[16]), raw[17]),
    };

    FieldDescriptor::new(name, field_type, length, decimal_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbfsync_test_utils::DbfFixture;
    use std::io::Cursor;

    #[test]
    fn parses_fields_in_disk_order() {
        let bytes = DbfFixture::new()
            .character("CUSTNO", 10)
            .numeric("AMOUNT", 12, 2)
            .date("DATE")
            .record(["C1", "1.50", "20251212"])
            .to_bytes();

        let header = DbfHeader::read_from(&mut Cursor::new(bytes), Path::new("t.dbf")).unwrap();
        assert_eq!(header.record_count, 1);
        assert_eq!(header.record_length, 31);
        assert!(header.terminated);
        let names: Vec<_> = header.schema.names().collect();
        assert_eq!(names, vec!["CUSTNO", "AMOUNT", "DATE"]);
        assert_eq!(header.schema.fields()[1].decimal_count, 2);
    }

    #[test]
    fn wide_character_length_uses_high_byte() {
        let bytes = DbfFixture::new().character("NOTES", 300).to_bytes();
        let header = DbfHeader::read_from(&mut Cursor::new(bytes), Path::new("t.dbf")).unwrap();
        let field = &header.schema.fields()[0];
        assert_eq!(field.length, 300);
        assert_eq!(field.decimal_count, 0);
    }

    #[test]
    fn unknown_type_byte_is_kept_as_other() {
        let bytes = DbfFixture::new().field("ODD", 0x00, 4, 0).to_bytes();
        let header = DbfHeader::read_from(&mut Cursor::new(bytes), Path::new("t.dbf")).unwrap();
        assert_eq!(header.schema.fields()[0].field_type, FieldType::Other(0));
    }

    #[test]
    fn short_header_is_an_error() {
        let err = DbfHeader::read_from(&mut Cursor::new(vec![3u8; 10]), Path::new("t.dbf"))
            .unwrap_err();
        assert!(err.to_string().contains("header too short"));
    }
}
