//! Raw decoded values → transport-safe [`Value`]s.
//!
//! Pure and total. The output record always has one value per schema field.

use dbfsync_protocol::{Record, SyncDataset, TableSchema, Value};

use crate::decode::{decode_permissive, RawRecord, RawTable, RawValue};

/// Field names whose byte payloads stay textual even when they look numeric.
pub const DATE_FIELD_NAMES: &[&str] = &[
    "DATE",
    "SODATE",
    "EXPDATE",
    "UPDATED_ON",
    "CREATED_ON",
    "GSTDATE",
    "CR_AP_DATE",
    "DUEDATE",
];

pub fn is_date_field_name(name: &str) -> bool {
    let upper = name.trim().to_ascii_uppercase();
    DATE_FIELD_NAMES.contains(&upper.as_str()) || upper.ends_with("DATE")
}

/// Normalize one record against its schema. Missing trailing values become null.
pub fn normalize(schema: &TableSchema, raw: RawRecord) -> Record {
    let mut raw_values = raw.into_values().into_iter();
    let values = schema
        .fields()
        .iter()
        .map(|field| normalize_value(&field.name, raw_values.next().unwrap_or(RawValue::Null)))
        .collect();
    Record::new(values)
}

pub fn normalize_table(table: RawTable) -> SyncDataset {
    let RawTable { schema, records } = table;
    let rows = records
        .into_iter()
        .map(|raw| normalize(&schema, raw))
        .collect();
    SyncDataset::new(schema, rows)
}

pub fn normalize_value(field_name: &str, raw: RawValue) -> Value {
    match raw {
        RawValue::Null => Value::Null,
        RawValue::Date(d) => Value::Text(d.format("%Y-%m-%d").to_string()),
        RawValue::DateTime(dt) => Value::Text(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
        RawValue::Integer(v) => Value::Integer(v),
        RawValue::Number(v) if v.is_finite() => Value::Float(v),
        RawValue::Number(_) => Value::Null,
        RawValue::Text(s) => clean_text(&s).map(Value::Text).unwrap_or(Value::Null),
        RawValue::Bytes(bytes) => {
            let Some(text) = clean_text(&decode_permissive(&bytes)) else {
                return Value::Null;
            };
            if is_date_field_name(field_name) {
                return Value::Text(text);
            }
            match text.parse::<f64>() {
                Ok(v) if v.is_finite() => Value::Float(v),
                _ => Value::Text(text),
            }
        }
    }
}

/// Strip NUL and control characters, trim, and map empty to `None`.
pub fn clean_text(s: &str) -> Option<String> {
    let stripped: String = s
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\t' | '\n' | '\r'))
        .collect();
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use dbfsync_protocol::{FieldDescriptor, FieldType};
    use proptest::prelude::*;

    #[test]
    fn dates_become_iso_strings() {
        let d = NaiveDate::from_ymd_opt(2025, 12, 12).unwrap();
        assert_eq!(normalize_value("DATE", RawValue::Date(d)), Value::from("2025-12-12"));
        let dt = d.and_hms_opt(8, 30, 0).unwrap();
        assert_eq!(
            normalize_value("UPDATED_ON", RawValue::DateTime(dt)),
            Value::from("2025-12-12T08:30:00")
        );
    }

    #[test]
    fn strings_are_trimmed_and_emptied_to_null() {
        assert_eq!(normalize_value("NAME", RawValue::Text("  Acme\0 ".into())), Value::from("Acme"));
        assert_eq!(normalize_value("NAME", RawValue::Text(" \0 ".into())), Value::Null);
    }

    #[test]
    fn numbers_pass_through() {
        assert_eq!(normalize_value("QTY", RawValue::Integer(3)), Value::Integer(3));
        assert_eq!(normalize_value("AMT", RawValue::Number(2.5)), Value::Float(2.5));
        assert_eq!(normalize_value("AMT", RawValue::Number(f64::NAN)), Value::Null);
    }

    #[test]
    fn byte_payloads_coerce_unless_date_named() {
        assert_eq!(
            normalize_value("MEMO", RawValue::Bytes(b"     12\0".to_vec())),
            Value::Float(12.0)
        );
        assert_eq!(
            normalize_value("DUEDATE", RawValue::Bytes(b"20251212".to_vec())),
            Value::from("20251212")
        );
        assert_eq!(
            normalize_value("MEMO", RawValue::Bytes(b"note\xff".to_vec())),
            Value::from("note")
        );
        assert_eq!(normalize_value("MEMO", RawValue::Bytes(vec![0, 0, 0, 0])), Value::Null);
    }

    #[test]
    fn record_keeps_schema_width() {
        let schema = TableSchema::new(vec![
            FieldDescriptor::new("A", FieldType::Character, 4, 0),
            FieldDescriptor::new("B", FieldType::Numeric, 4, 0),
        ]);
        let record = normalize(&schema, RawRecord::new(vec![RawValue::Text("x".into())]));
        assert_eq!(record.values(), &[Value::from("x"), Value::Null]);
    }

    #[test]
    fn date_name_pattern() {
        assert!(is_date_field_name("sodate"));
        assert!(is_date_field_name("CREATED_ON"));
        assert!(is_date_field_name("POSTDATE"));
        assert!(!is_date_field_name("AMOUNT"));
    }

    proptest! {
        #[test]
        fn text_never_carries_nul_or_padding(s in ".*") {
            match normalize_value("NAME", RawValue::Text(s)) {
                Value::Null => {}
                Value::Text(t) => {
                    prop_assert!(!t.contains('\0'));
                    prop_assert!(!t.is_empty());
                    prop_assert_eq!(t.trim(), t.as_str());
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }

        #[test]
        fn bytes_never_fail(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let v = normalize_value("MEMO", RawValue::Bytes(bytes));
            if let Value::Text(t) = v {
                prop_assert!(!t.contains('\0'));
            }
        }
    }
}
