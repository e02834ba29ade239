//! Legacy field types → relational column types, and the DDL built from them.

use dbfsync_protocol::{FieldDescriptor, FieldType, TableSchema};
use std::fmt;

use crate::error::StoreError;

const MAX_VARCHAR: u16 = 255;
const DEFAULT_DECIMAL_PRECISION: u16 = 10;

/// Destination SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Pick a dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self, StoreError> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "mysql" | "mariadb" => Ok(Self::MySql),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(StoreError::InvalidInput(format!(
                "unsupported database URL scheme '{other}'"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgresql",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn quote_ident(&self, name: &str) -> String {
        let quote = match self {
            Self::MySql => '`',
            Self::Postgres | Self::Sqlite => '"',
        };
        let mut escaped = String::with_capacity(name.len() + 2);
        escaped.push(quote);
        for ch in name.chars() {
            if ch == quote {
                escaped.push(quote);
            }
            escaped.push(ch);
        }
        escaped.push(quote);
        escaped
    }

    /// Placeholder for the 1-based parameter `index`.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            Self::Postgres => format!("${index}"),
            Self::MySql | Self::Sqlite => "?".to_string(),
        }
    }

    /// Bound parameters allowed in a single statement.
    pub fn max_params(&self) -> usize {
        match self {
            Self::MySql | Self::Postgres => 65_535,
            Self::Sqlite => 32_766,
        }
    }

    pub fn truncate_sql(&self, table: &str) -> String {
        match self {
            Self::Sqlite => format!("DELETE FROM {}", self.quote_ident(table)),
            Self::MySql | Self::Postgres => format!("TRUNCATE TABLE {}", self.quote_ident(table)),
        }
    }

    /// Single-parameter query returning the count of tables with that name.
    pub fn table_exists_sql(&self) -> &'static str {
        match self {
            Self::MySql => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_name = ?"
            }
            Self::Postgres => {
                "SELECT COUNT(*) FROM information_schema.tables \
                 WHERE table_schema = current_schema() AND table_name = $1"
            }
            Self::Sqlite => "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
        }
    }

    /// Statements run on every new connection.
    pub fn session_statements(&self, idle_timeout_secs: u64, net_timeout_secs: u64) -> Vec<String> {
        match self {
            Self::MySql => vec![
                format!("SET SESSION wait_timeout = {idle_timeout_secs}"),
                format!("SET SESSION interactive_timeout = {idle_timeout_secs}"),
                format!("SET SESSION net_read_timeout = {net_timeout_secs}"),
                format!("SET SESSION net_write_timeout = {net_timeout_secs}"),
            ],
            Self::Postgres => vec![
                "SET statement_timeout = 0".to_string(),
                format!(
                    "SET idle_in_transaction_session_timeout = {}",
                    idle_timeout_secs * 1_000
                ),
            ],
            Self::Sqlite => vec![format!("PRAGMA busy_timeout = {}", net_timeout_secs * 1_000)],
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dialect-independent column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    VarChar(u16),
    Text,
    Decimal(u16, u8),
    Integer,
    Float,
    Boolean,
}

impl ColumnType {
    pub fn for_field(field: &FieldDescriptor) -> Self {
        match field.field_type {
            FieldType::Character if field.length <= MAX_VARCHAR => {
                Self::VarChar(if field.length == 0 { MAX_VARCHAR } else { field.length })
            }
            FieldType::Character => Self::Text,
            FieldType::Numeric if field.decimal_count > 0 => {
                let precision = if field.length == 0 {
                    DEFAULT_DECIMAL_PRECISION
                } else {
                    field.length
                };
                Self::Decimal(precision.max(field.decimal_count as u16), field.decimal_count)
            }
            FieldType::Numeric => Self::Integer,
            FieldType::Float => Self::Float,
            // Untyped on purpose: legacy sentinel dates fail native validation.
            FieldType::Date | FieldType::DateTime => Self::VarChar(MAX_VARCHAR),
            FieldType::Logical => Self::Boolean,
            FieldType::Other(_) => Self::Text,
        }
    }

    pub fn render(&self, dialect: Dialect) -> String {
        match (self, dialect) {
            (Self::VarChar(n), _) => format!("VARCHAR({n})"),
            (Self::Text, _) => "TEXT".to_string(),
            (Self::Decimal(p, s), _) => format!("DECIMAL({p},{s})"),
            (Self::Integer, Dialect::MySql) => "INT".to_string(),
            (Self::Integer, _) => "INTEGER".to_string(),
            (Self::Float, Dialect::MySql) => "FLOAT".to_string(),
            (Self::Float, _) => "REAL".to_string(),
            (Self::Boolean, _) => "BOOLEAN".to_string(),
        }
    }
}

/// A destination column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
}

pub fn columns_for(schema: &TableSchema) -> Vec<Column> {
    schema
        .fields()
        .iter()
        .map(|field| Column {
            name: field.name.clone(),
            column_type: ColumnType::for_field(field),
        })
        .collect()
}

pub fn create_table_sql(dialect: Dialect, table: &str, columns: &[Column]) -> String {
    let defs = columns
        .iter()
        .map(|c| format!("{} {}", dialect.quote_ident(&c.name), c.column_type.render(dialect)))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        dialect.quote_ident(table),
        defs
    )
}

/// `CREATE TABLE IF NOT EXISTS` for a parsed table schema.
pub fn map_schema(dialect: Dialect, table: &str, schema: &TableSchema) -> Result<String, StoreError> {
    if schema.is_empty() {
        return Err(StoreError::InvalidInput(format!("table {table} has no fields")));
    }
    Ok(create_table_sql(dialect, table, &columns_for(schema)))
}
