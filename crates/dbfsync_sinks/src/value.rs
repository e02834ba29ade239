//! Per-column value coercion and byte-capped string truncation.

use dbfsync_protocol::{Record, Value};

use crate::schema::{Column, ColumnType};

/// Longest prefix of `s` that fits in `cap` bytes without splitting a char.
pub fn truncate_to_bytes(s: &str, cap: usize) -> &str {
    if s.len() <= cap {
        return s;
    }
    let mut end = cap;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Shape a value to what its destination column accepts. Values that
/// cannot be represented become NULL rather than failing the batch.
pub fn coerce(value: &Value, column_type: ColumnType) -> Value {
    match (column_type, value) {
        (_, Value::Null) => Value::Null,
        (ColumnType::VarChar(_) | ColumnType::Text, v) => v.to_text().map(Value::Text).unwrap_or_default(),
        (ColumnType::Integer, Value::Integer(v)) => Value::Integer(*v),
        (ColumnType::Integer, Value::Float(v)) => float_to_int(*v),
        (ColumnType::Integer, Value::Bool(v)) => Value::Integer(i64::from(*v)),
        (ColumnType::Integer, Value::Text(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| s.parse::<f64>().map(float_to_int).unwrap_or_default())
        }
        (ColumnType::Float | ColumnType::Decimal(..), Value::Integer(v)) => Value::Float(*v as f64),
        (ColumnType::Float | ColumnType::Decimal(..), Value::Float(v)) => Value::Float(*v),
        (ColumnType::Float | ColumnType::Decimal(..), Value::Bool(v)) => {
            Value::Float(if *v { 1.0 } else { 0.0 })
        }
        (ColumnType::Float | ColumnType::Decimal(..), Value::Text(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Value::Float)
            .unwrap_or_default(),
        (ColumnType::Boolean, Value::Bool(v)) => Value::Bool(*v),
        (ColumnType::Boolean, Value::Integer(v)) => Value::Bool(*v != 0),
        (ColumnType::Boolean, Value::Float(v)) => Value::Bool(*v != 0.0),
        (ColumnType::Boolean, Value::Text(s)) => parse_logical(s).map(Value::Bool).unwrap_or_default(),
    }
}

fn float_to_int(v: f64) -> Value {
    if v.is_finite() && v.abs() < i64::MAX as f64 {
        Value::Integer(v.round() as i64)
    } else {
        Value::Null
    }
}

/// Legacy logical letters. `?` and anything else is unknown.
pub fn parse_logical(s: &str) -> Option<bool> {
    match s.trim() {
        "T" | "t" | "Y" | "y" => Some(true),
        "F" | "f" | "N" | "n" => Some(false),
        _ => None,
    }
}

/// Coerce a record to its columns and cap every string at `string_cap` bytes.
pub fn prepare_row(record: &Record, columns: &[Column], string_cap: usize) -> Vec<Value> {
    columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let value = record.get(idx).unwrap_or(&Value::Null);
            match coerce(value, column.column_type) {
                Value::Text(s) if s.len() > string_cap => {
                    Value::Text(truncate_to_bytes(&s, string_cap).to_string())
                }
                other => other,
            }
        })
        .collect()
}

/// Rough wire size of a row, used for payload limits.
pub fn payload_bytes(row: &[Value]) -> usize {
    row.iter()
        .map(|v| match v {
            Value::Null => 4,
            Value::Bool(_) => 1,
            Value::Integer(_) | Value::Float(_) => 8,
            Value::Text(s) => s.len(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_to_bytes("hello", 10), "hello");
        assert_eq!(truncate_to_bytes("hello", 3), "hel");
        // "é" is two bytes
        assert_eq!(truncate_to_bytes("aé", 2), "a");
        assert_eq!(truncate_to_bytes("日本", 4), "日");
        assert_eq!(truncate_to_bytes("日本", 0), "");
    }

    #[test]
    fn coercion_follows_column_type() {
        assert_eq!(coerce(&Value::Float(3.0), ColumnType::Integer), Value::Integer(3));
        assert_eq!(coerce(&Value::from(" 42 "), ColumnType::Integer), Value::Integer(42));
        assert_eq!(coerce(&Value::from("abc"), ColumnType::Integer), Value::Null);
        assert_eq!(coerce(&Value::Integer(7), ColumnType::Decimal(10, 2)), Value::Float(7.0));
        assert_eq!(coerce(&Value::Float(12.5), ColumnType::VarChar(20)), Value::from("12.5"));
        assert_eq!(coerce(&Value::from("T"), ColumnType::Boolean), Value::Bool(true));
        assert_eq!(coerce(&Value::from("?"), ColumnType::Boolean), Value::Null);
        assert_eq!(coerce(&Value::Null, ColumnType::Text), Value::Null);
    }

    #[test]
    fn prepare_row_pads_and_caps() {
        let columns = vec![
            Column { name: "A".into(), column_type: ColumnType::Text },
            Column { name: "B".into(), column_type: ColumnType::Integer },
        ];
        let record = Record::new(vec![Value::from("x".repeat(50))]);
        let row = prepare_row(&record, &columns, 10);
        assert_eq!(row, vec![Value::from("x".repeat(10)), Value::Null]);
    }

    proptest! {
        #[test]
        fn truncated_strings_fit_the_cap(s in "\\PC{0,200}", cap in 0usize..300) {
            let t = truncate_to_bytes(&s, cap);
            prop_assert!(t.len() <= cap);
            prop_assert!(s.starts_with(t));
            if s.len() <= cap {
                prop_assert_eq!(t, s.as_str());
            }
        }
    }
}
