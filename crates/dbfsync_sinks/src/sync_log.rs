//! The `sync_logs` bookkeeping table: one row per completed run.

use dbfsync_protocol::Value;

use crate::error::StoreError;
use crate::schema::Dialect;
use crate::store::DestinationSession;

pub const SYNC_LOG_TABLE: &str = "sync_logs";

pub fn create_sync_log_sql(dialect: Dialect) -> String {
    let table = dialect.quote_ident(SYNC_LOG_TABLE);
    match dialect {
        Dialect::MySql => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             `id` INT AUTO_INCREMENT PRIMARY KEY, \
             `synced_at` DATETIME NOT NULL)"
        ),
        Dialect::Postgres => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             \"id\" SERIAL PRIMARY KEY, \
             \"synced_at\" TIMESTAMP NOT NULL)"
        ),
        Dialect::Sqlite => format!(
            "CREATE TABLE IF NOT EXISTS {table} (\
             \"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
             \"synced_at\" TEXT NOT NULL)"
        ),
    }
}

pub async fn ensure_sync_log(
    session: &mut dyn DestinationSession,
    dialect: Dialect,
) -> Result<(), StoreError> {
    session.execute(&create_sync_log_sql(dialect)).await?;
    Ok(())
}

pub fn insert_sync_log_sql(dialect: Dialect) -> String {
    let placeholder = match dialect {
        // text parameters need an explicit cast into a TIMESTAMP column
        Dialect::Postgres => format!("CAST({} AS TIMESTAMP)", dialect.placeholder(1)),
        Dialect::MySql | Dialect::Sqlite => dialect.placeholder(1),
    };
    format!(
        "INSERT INTO {} ({}) VALUES ({placeholder})",
        dialect.quote_ident(SYNC_LOG_TABLE),
        dialect.quote_ident("synced_at"),
    )
}

/// Append a completion row. `synced_at` is `YYYY-MM-DD HH:MM:SS`.
pub async fn record_sync(
    session: &mut dyn DestinationSession,
    dialect: Dialect,
    synced_at: &str,
) -> Result<(), StoreError> {
    let valid = synced_at.len() == 19
        && synced_at
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '-' | ':' | ' '));
    if !valid {
        return Err(StoreError::InvalidInput(format!(
            "malformed sync timestamp '{synced_at}'"
        )));
    }
    session
        .execute_with(&insert_sync_log_sql(dialect), &[Value::from(synced_at)])
        .await?;
    Ok(())
}
