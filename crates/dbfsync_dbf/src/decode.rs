//! Per-field decoding of record slots.
//!
//! Every function here is total: bytes that cannot be decoded become
//! [`RawValue::Null`] for that field only.

use byteorder::{ByteOrder, LittleEndian};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use dbfsync_protocol::{FieldDescriptor, FieldType, TableSchema};

/// Julian day number of 0001-01-01 minus one (proleptic Gregorian day 0).
const JDN_CE_OFFSET: i64 = 1_721_425;
const MILLIS_PER_DAY: u32 = 86_400_000;

/// A decoded field before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Text(String),
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    /// Block references and other payloads with no textual meaning here.
    Bytes(Vec<u8>),
}

/// One non-deleted record slot, positionally aligned with the schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    values: Vec<RawValue>,
}

impl RawRecord {
    pub fn new(values: Vec<RawValue>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[RawValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<RawValue> {
        self.values
    }
}

/// Output of a decoder.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub schema: TableSchema,
    pub records: Vec<RawRecord>,
}

/// Decode a full record slot (deletion flag included).
pub fn decode_record(schema: &TableSchema, slot: &[u8]) -> RawRecord {
    let mut offset = 1;
    let values = schema
        .fields()
        .iter()
        .map(|field| {
            let len = field.length as usize;
            let end = (offset + len).min(slot.len());
            let bytes = slot.get(offset..end).unwrap_or(&[]);
            offset += len;
            decode_field(field, bytes)
        })
        .collect();
    RawRecord::new(values)
}

pub fn decode_field(field: &FieldDescriptor, bytes: &[u8]) -> RawValue {
    let decoded = match field.field_type {
        FieldType::Character => decode_character(bytes),
        FieldType::Numeric => decode_number(bytes, field.decimal_count == 0),
        FieldType::Float => decode_number(bytes, false),
        FieldType::Date => decode_date(bytes),
        FieldType::DateTime => decode_datetime(bytes),
        FieldType::Logical => decode_text(bytes),
        FieldType::Other(b'I') => decode_i32(bytes),
        FieldType::Other(b'B') | FieldType::Other(b'O') => decode_f64(bytes),
        FieldType::Other(b'Y') => decode_currency(bytes),
        FieldType::Other(b'M') | FieldType::Other(b'G') | FieldType::Other(b'P') => {
            Some(RawValue::Bytes(bytes.to_vec()))
        }
        FieldType::Other(_) => decode_text(bytes),
    };
    decoded.unwrap_or(RawValue::Null)
}

/// Lossy text: invalid sequences are dropped rather than replaced.
pub fn decode_permissive(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

fn strip_nul(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().copied().filter(|b| *b != 0).collect()
}

fn decode_character(bytes: &[u8]) -> Option<RawValue> {
    let text = decode_permissive(&strip_nul(bytes));
    let text = text.trim_end();
    if text.is_empty() {
        None
    } else {
        Some(RawValue::Text(text.to_string()))
    }
}

fn decode_text(bytes: &[u8]) -> Option<RawValue> {
    let text = decode_permissive(&strip_nul(bytes));
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(RawValue::Text(text.to_string()))
    }
}

fn decode_number(bytes: &[u8], integral: bool) -> Option<RawValue> {
    let cleaned = strip_nul(bytes);
    let text = std::str::from_utf8(&cleaned).ok()?.trim();
    if text.is_empty() {
        return None;
    }
    if integral {
        if let Ok(v) = text.parse::<i64>() {
            return Some(RawValue::Integer(v));
        }
    }
    text.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(RawValue::Number)
}

fn decode_date(bytes: &[u8]) -> Option<RawValue> {
    let cleaned = strip_nul(bytes);
    let text = std::str::from_utf8(&cleaned).ok()?.trim();
    if text.is_empty() || text == "00000000" {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y%m%d")
        .ok()
        .map(RawValue::Date)
}

fn decode_datetime(bytes: &[u8]) -> Option<RawValue> {
    if bytes.len() < 8 || bytes[..8].iter().all(|b| *b == 0) {
        return None;
    }
    let day = LittleEndian::read_u32(&bytes[0..4]) as i64;
    let millis = LittleEndian::read_u32(&bytes[4..8]);
    if day == 0 {
        return None;
    }
    let days_ce = i32::try_from(day - JDN_CE_OFFSET).ok()?;
    let date = NaiveDate::from_num_days_from_ce_opt(days_ce)?;
    let time = if millis < MILLIS_PER_DAY {
        NaiveTime::from_num_seconds_from_midnight_opt(millis / 1_000, (millis % 1_000) * 1_000_000)
            .unwrap_or_default()
    } else {
        NaiveTime::default()
    };
    Some(RawValue::DateTime(date.and_time(time)))
}

fn decode_i32(bytes: &[u8]) -> Option<RawValue> {
    (bytes.len() >= 4).then(|| RawValue::Integer(LittleEndian::read_i32(bytes) as i64))
}

fn decode_f64(bytes: &[u8]) -> Option<RawValue> {
    if bytes.len() < 8 {
        return None;
    }
    let v = LittleEndian::read_f64(bytes);
    v.is_finite().then_some(RawValue::Number(v))
}

fn decode_currency(bytes: &[u8]) -> Option<RawValue> {
    (bytes.len() >= 8).then(|| RawValue::Number(LittleEndian::read_i64(bytes) as f64 / 10_000.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(ft: FieldType, length: u16, decimals: u8) -> FieldDescriptor {
        FieldDescriptor::new("F", ft, length, decimals)
    }

    #[test]
    fn character_strips_nul_and_trailing_space() {
        let f = field(FieldType::Character, 8, 0);
        assert_eq!(decode_field(&f, b"AB\0C    "), RawValue::Text("ABC".into()));
        assert_eq!(decode_field(&f, b"  lead  "), RawValue::Text("  lead".into()));
        assert_eq!(decode_field(&f, b"\0\0\0    "), RawValue::Null);
    }

    #[test]
    fn numeric_parses_integers_and_decimals() {
        assert_eq!(
            decode_field(&field(FieldType::Numeric, 6, 0), b"   42 "),
            RawValue::Integer(42)
        );
        assert_eq!(
            decode_field(&field(FieldType::Numeric, 6, 2), b" 1.50\0"),
            RawValue::Number(1.5)
        );
        assert_eq!(decode_field(&field(FieldType::Numeric, 4, 0), b"****"), RawValue::Null);
        assert_eq!(decode_field(&field(FieldType::Float, 4, 0), b"    "), RawValue::Null);
    }

    #[test]
    fn date_sentinels_become_null() {
        let f = field(FieldType::Date, 8, 0);
        assert_eq!(
            decode_field(&f, b"20251212"),
            RawValue::Date(NaiveDate::from_ymd_opt(2025, 12, 12).unwrap())
        );
        assert_eq!(decode_field(&f, b"00000000"), RawValue::Null);
        assert_eq!(decode_field(&f, b"        "), RawValue::Null);
        assert_eq!(decode_field(&f, b"20251399"), RawValue::Null);
    }

    #[test]
    fn datetime_reads_julian_day_and_millis() {
        let f = field(FieldType::DateTime, 8, 0);
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2_440_588u32.to_le_bytes());
        bytes.extend_from_slice(&(3_600_000u32 + 500).to_le_bytes());
        let expected = NaiveDate::from_ymd_opt(1970, 1, 1)
            .unwrap()
            .and_hms_milli_opt(1, 0, 0, 500)
            .unwrap();
        assert_eq!(decode_field(&f, &bytes), RawValue::DateTime(expected));
        assert_eq!(decode_field(&f, &[0u8; 8]), RawValue::Null);
        assert_eq!(decode_field(&f, &[1u8; 3]), RawValue::Null);
    }

    #[test]
    fn binary_numeric_types() {
        assert_eq!(
            decode_field(&field(FieldType::Other(b'I'), 4, 0), &(-7i32).to_le_bytes()),
            RawValue::Integer(-7)
        );
        assert_eq!(
            decode_field(&field(FieldType::Other(b'B'), 8, 0), &2.25f64.to_le_bytes()),
            RawValue::Number(2.25)
        );
        assert_eq!(
            decode_field(&field(FieldType::Other(b'Y'), 8, 4), &125_000i64.to_le_bytes()),
            RawValue::Number(12.5)
        );
    }

    #[test]
    fn memo_reference_kept_as_bytes() {
        let f = field(FieldType::Other(b'M'), 4, 0);
        assert_eq!(decode_field(&f, &[1, 0, 0, 0]), RawValue::Bytes(vec![1, 0, 0, 0]));
    }

    #[test]
    fn logical_is_text() {
        let f = field(FieldType::Logical, 1, 0);
        assert_eq!(decode_field(&f, b"T"), RawValue::Text("T".into()));
        assert_eq!(decode_field(&f, b" "), RawValue::Null);
    }

    #[test]
    fn short_slot_leaves_missing_fields_null() {
        let schema = TableSchema::new(vec![
            field(FieldType::Character, 3, 0),
            field(FieldType::Numeric, 3, 0),
        ]);
        let record = decode_record(&schema, b" AB");
        assert_eq!(
            record.values(),
            &[RawValue::Text("AB".into()), RawValue::Null]
        );
    }

    #[test]
    fn permissive_decode_drops_invalid_bytes() {
        assert_eq!(decode_permissive(b"caf\xe9 ok"), "caf ok");
    }
}
