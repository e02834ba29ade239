use crate::TableIdentity;

/// Deterministic destination table name for a source table.
///
/// `{prefix}_{group}_{stem}`, all lowercase. Repeated runs for the same
/// identity always land in the same physical table.
pub fn target_table_name(prefix: &str, identity: &TableIdentity) -> String {
    format!(
        "{}_{}_{}",
        prefix.to_ascii_lowercase(),
        identity.group(),
        identity.table()
    )
}

/// Strip a trailing `.dbf` extension (any case) from a file name.
pub fn file_stem(file_name: &str) -> &str {
    let len = file_name.len();
    match file_name.get(len.saturating_sub(4)..) {
        Some(ext) if len > 4 && ext.eq_ignore_ascii_case(".dbf") => &file_name[..len - 4],
        _ => file_name,
    }
}
