//! Core data model passed between the reader, the filters and the loader.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::naming::file_stem;

// ============================================================================
// Field schema
// ============================================================================

/// Legacy field type, decoded from the descriptor's type byte.
///
/// Unrecognized bytes never fail; they land in `Other` carrying the raw byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Character,
    Numeric,
    Float,
    Date,
    DateTime,
    Logical,
    Other(u8),
}

impl FieldType {
    pub fn from_code(code: u8) -> Self {
        match code {
            b'C' => Self::Character,
            b'N' => Self::Numeric,
            b'F' => Self::Float,
            b'D' => Self::Date,
            b'T' | b'@' => Self::DateTime,
            b'L' => Self::Logical,
            other => Self::Other(other),
        }
    }

    /// Type byte as a printable character (`?` for non-printable bytes).
    pub fn code(&self) -> char {
        match self {
            Self::Character => 'C',
            Self::Numeric => 'N',
            Self::Float => 'F',
            Self::Date => 'D',
            Self::DateTime => 'T',
            Self::Logical => 'L',
            Self::Other(b) if b.is_ascii_graphic() => *b as char,
            Self::Other(_) => '?',
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One column of a legacy table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub field_type: FieldType,
    pub length: u16,
    pub decimal_count: u8,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, field_type: FieldType, length: u16, decimal_count: u8) -> Self {
        Self {
            name: name.into(),
            field_type,
            length,
            decimal_count,
        }
    }
}

/// Ordered field list; on-disk order is output column order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableSchema {
    fields: Vec<FieldDescriptor>,
}

impl TableSchema {
    pub fn new(fields: Vec<FieldDescriptor>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Position of a field by name. Exact match wins over a case-insensitive one.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .or_else(|| self.fields.iter().position(|f| f.name.eq_ignore_ascii_case(name)))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Bytes per record slot: the deletion flag plus every field.
    pub fn record_length(&self) -> usize {
        1 + self.fields.iter().map(|f| f.length as usize).sum::<usize>()
    }
}

// ============================================================================
// Values and records
// ============================================================================

/// Transport-safe scalar. Never a byte blob, never carries an embedded NUL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Textual form used by comparisons (filters, keys). `None` for null.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(v) => Some(if *v { "T" } else { "F" }.to_string()),
            Value::Integer(v) => Some(v.to_string()),
            Value::Float(v) => Some(format_float(*v)),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Render a float without a trailing `.0` when it is integral.
pub fn format_float(v: f64) -> String {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// A normalized row, positionally aligned with its dataset's schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record {
    values: Vec<Value>,
}

impl Record {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// The unit passed Reader → Filter → Loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncDataset {
    pub structure: TableSchema,
    pub rows: Vec<Record>,
}

impl SyncDataset {
    pub fn new(structure: TableSchema, rows: Vec<Record>) -> Self {
        Self { structure, rows }
    }

    /// What the reader returns when every decode strategy failed.
    pub fn empty() -> Self {
        Self::default()
    }

    /// True when there is nothing worth loading.
    pub fn is_empty(&self) -> bool {
        self.structure.is_empty() || self.rows.is_empty()
    }

    /// Same schema, different rows.
    pub fn with_rows(self, rows: Vec<Record>) -> Self {
        Self {
            structure: self.structure,
            rows,
        }
    }

    pub fn value<'a>(&self, record: &'a Record, field: &str) -> Option<&'a Value> {
        self.structure
            .index_of(field)
            .and_then(|idx| record.get(idx))
    }
}

// ============================================================================
// Table identity
// ============================================================================

/// `(source group, table stem)`, compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableIdentity {
    group: String,
    table: String,
}

impl TableIdentity {
    pub fn new(group: &str, table: &str) -> Self {
        Self {
            group: group.trim().to_ascii_lowercase(),
            table: file_stem(table.trim()).to_ascii_lowercase(),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// File name as found on disk (`<table>.dbf`).
    pub fn file_name(&self) -> String {
        format!("{}.dbf", self.table)
    }
}

impl fmt::Display for TableIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group, self.table)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid table identity '{0}': expected GROUP/table")]
pub struct IdentityParseError(String);

impl FromStr for TableIdentity {
    type Err = IdentityParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((group, table)) if !group.trim().is_empty() && !table.trim().is_empty() => {
                Ok(Self::new(group, table))
            }
            _ => Err(IdentityParseError(s.to_string())),
        }
    }
}

impl TryFrom<String> for TableIdentity {
    type Error = IdentityParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TableIdentity> for String {
    fn from(value: TableIdentity) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_byte_becomes_other() {
        assert_eq!(FieldType::from_code(b'C'), FieldType::Character);
        assert_eq!(FieldType::from_code(b'T'), FieldType::DateTime);
        assert_eq!(FieldType::from_code(b'M'), FieldType::Other(b'M'));
        assert_eq!(FieldType::from_code(0), FieldType::Other(0));
        assert_eq!(FieldType::Other(0).code(), '?');
    }

    #[test]
    fn schema_lookup_prefers_exact_match() {
        let schema = TableSchema::new(vec![
            FieldDescriptor::new("date", FieldType::Character, 8, 0),
            FieldDescriptor::new("DATE", FieldType::Date, 8, 0),
        ]);
        assert_eq!(schema.index_of("DATE"), Some(1));
        assert_eq!(schema.index_of("Date"), Some(0));
        assert_eq!(schema.index_of("REFNO"), None);
        assert_eq!(schema.record_length(), 17);
    }

    #[test]
    fn value_serializes_as_plain_json_scalars() {
        let record = Record::new(vec![
            Value::Null,
            Value::from("A001"),
            Value::from(12_i64),
            Value::from(1.5),
            Value::from(true),
        ]);
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"[null,"A001",12,1.5,true]"#);
    }

    #[test]
    fn float_text_drops_integral_fraction() {
        assert_eq!(Value::Float(20251212.0).to_text().as_deref(), Some("20251212"));
        assert_eq!(Value::Float(1.25).to_text().as_deref(), Some("1.25"));
    }

    #[test]
    fn identity_parses_group_and_table() {
        let id: TableIdentity = "UBSSTK2015/ICTRAN.DBF".parse().unwrap();
        assert_eq!(id.group(), "ubsstk2015");
        assert_eq!(id.table(), "ictran");
        assert_eq!(id.to_string(), "ubsstk2015/ictran");
        assert!("ictran".parse::<TableIdentity>().is_err());
        assert!("/ictran".parse::<TableIdentity>().is_err());
    }

    #[test]
    fn dataset_value_uses_schema_position() {
        let schema = TableSchema::new(vec![
            FieldDescriptor::new("REFNO", FieldType::Character, 10, 0),
            FieldDescriptor::new("DATE", FieldType::Date, 8, 0),
        ]);
        let record = Record::new(vec![Value::from("SO1"), Value::from("2025-12-12")]);
        let dataset = SyncDataset::new(schema, vec![record.clone()]);
        assert_eq!(dataset.value(&record, "DATE"), Some(&Value::from("2025-12-12")));
        assert_eq!(dataset.value(&record, "AGENNO"), None);
        assert!(!dataset.is_empty());
        assert!(SyncDataset::empty().is_empty());
    }
}
