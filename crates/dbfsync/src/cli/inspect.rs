use anyhow::{Context, Result};
use dbfsync_dbf::{normalize_table, DbfHeader, DbfReader};
use dbfsync_protocol::{NullProgress, SyncDataset};
use serde_json::{json, Map, Value as JsonValue};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Print a table's header, schema and first `rows` records as JSON.
pub fn run(path: &Path, rows: usize) -> Result<()> {
    let report = inspect(path, rows)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn inspect(path: &Path, rows: usize) -> Result<JsonValue> {
    let file = File::open(path).with_context(|| format!("Cannot open {}", path.display()))?;
    let header = DbfHeader::read_from(&mut BufReader::new(file), path)
        .with_context(|| format!("Cannot read header of {}", path.display()))?;

    let (decoded, error) = match DbfReader::default().read_raw(path, &NullProgress) {
        Ok(table) => (normalize_table(table), None),
        Err(e) => (SyncDataset::empty(), Some(e.to_string())),
    };

    let fields: Vec<JsonValue> = header
        .schema
        .fields()
        .iter()
        .map(|f| {
            json!({
                "name": f.name,
                "type": f.field_type.code().to_string(),
                "length": f.length,
                "decimals": f.decimal_count,
            })
        })
        .collect();

    let sample: Vec<JsonValue> = decoded
        .rows
        .iter()
        .take(rows)
        .map(|record| -> Result<JsonValue, serde_json::Error> {
            let object: Map<String, JsonValue> = decoded
                .structure
                .names()
                .zip(record.values())
                .map(|(name, value)| Ok((name.to_string(), serde_json::to_value(value)?)))
                .collect::<Result<Map<String, JsonValue>, serde_json::Error>>()?;
            Ok(JsonValue::Object(object))
        })
        .collect::<Result<Vec<_>, serde_json::Error>>()?;

    Ok(json!({
        "path": path.display().to_string(),
        "version": header.version,
        "declared_records": header.record_count,
        "header_length": header.header_length,
        "record_length": header.record_length,
        "fields": fields,
        "records_read": decoded.rows.len(),
        "rows": sample,
        "error": error,
    }))
}
