//! Error types for destination stores and the bulk loader.

use sqlx::mysql::MySqlDatabaseError;
use thiserror::Error;

/// Destination store error, classified by recovery path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Could not open a connection at all.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// The connection dropped mid-run. Retried per table.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The destination rejected a payload as too large. Retried per batch.
    #[error("Payload too large: {0}")]
    Oversize(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// MySQL server and client error numbers (not SQLSTATE).
const OVERSIZE_CODES: &[u16] = &[1153, 1301];
const CONNECTION_LOST_CODES: &[u16] = &[2006, 2013];

impl StoreError {
    pub fn is_oversize(&self) -> bool {
        matches!(self, Self::Oversize(_))
    }

    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::ConnectionLost(_))
    }

    /// Classify a driver message and its MySQL error number, if any.
    pub fn classify(mysql_code: Option<u16>, message: String) -> Self {
        let lower = message.to_ascii_lowercase();
        if mysql_code.is_some_and(|c| OVERSIZE_CODES.contains(&c))
            || lower.contains("packet")
            || lower.contains("too large")
        {
            Self::Oversize(message)
        } else if mysql_code.is_some_and(|c| CONNECTION_LOST_CODES.contains(&c))
            || lower.contains("lost connection")
            || lower.contains("gone away")
            || lower.contains("broken pipe")
            || lower.contains("connection reset")
        {
            Self::ConnectionLost(message)
        } else {
            Self::Database(message)
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => Self::ConnectionLost(err.to_string()),
            sqlx::Error::Database(db) => {
                // `code()` is the SQLSTATE; the vendor number lives on the MySQL error.
                let mysql_code = db
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(MySqlDatabaseError::number);
                Self::classify(mysql_code, db.message().to_string())
            }
            _ => Self::classify(None, err.to_string()),
        }
    }
}

/// A table load that could not be completed.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Table {table} has no columns")]
    EmptySchema { table: String },

    #[error("Loading {table} failed after {attempts} attempt(s): {source}")]
    Store {
        table: String,
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_packet_errors_as_oversize() {
        let e = StoreError::classify(
            Some(1153),
            "Got a packet bigger than 'max_allowed_packet' bytes".into(),
        );
        assert!(e.is_oversize());
        // ER_TOO_BIG_STRING, matched on the number alone
        let e = StoreError::classify(Some(1301), "Result of repeat() was larger".into());
        assert!(e.is_oversize());
        let e = StoreError::classify(None, "request entity too large".into());
        assert!(e.is_oversize());
    }

    #[test]
    fn classifies_lost_connections() {
        let e = StoreError::classify(
            Some(2013),
            "Lost connection to MySQL server during query".into(),
        );
        assert!(e.is_connection_lost());
        assert!(StoreError::classify(Some(2006), "server closed".into()).is_connection_lost());
        let e = StoreError::classify(None, "MySQL server has gone away".into());
        assert!(e.is_connection_lost());
    }

    #[test]
    fn everything_else_is_a_database_error() {
        let e = StoreError::classify(Some(1064), "You have an error in your SQL syntax".into());
        assert_eq!(e, StoreError::Database("You have an error in your SQL syntax".into()));
    }

    #[tokio::test]
    async fn non_mysql_database_errors_classify_by_message() {
        sqlx::any::install_default_drivers();
        let pool = sqlx::AnyPool::connect("sqlite::memory:").await.unwrap();
        let err = sqlx::query("SELECT * FROM missing")
            .execute(&pool)
            .await
            .unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(_)));
        assert!(matches!(
            StoreError::from(err),
            StoreError::Database(message) if message.contains("no such table")
        ));
    }

    #[test]
    fn io_errors_mean_connection_lost() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        assert!(StoreError::from(sqlx::Error::Io(io)).is_connection_lost());
        assert!(StoreError::from(sqlx::Error::PoolTimedOut).is_connection_lost());
    }
}
