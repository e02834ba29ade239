//! sqlx-backed destination over the `Any` driver (MySQL, PostgreSQL, SQLite).

use async_trait::async_trait;
use dbfsync_protocol::defaults::{DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_NET_TIMEOUT_SECS};
use dbfsync_protocol::Value;
use sqlx::any::{AnyArguments, AnyPoolOptions};
use sqlx::query::Query;
use sqlx::{Any, AnyPool};
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, info, Instrument};

use crate::error::StoreError;
use crate::schema::{create_table_sql, Column, ColumnType, Dialect};
use crate::store::{Destination, DestinationSession};

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub idle_timeout_secs: u64,
    pub net_timeout_secs: u64,
    pub connect_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout_secs: DEFAULT_IDLE_TIMEOUT_SECS,
            net_timeout_secs: DEFAULT_NET_TIMEOUT_SECS,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Connects by URL; the dialect follows the URL scheme.
#[derive(Debug, Clone)]
pub struct SqlxDestination {
    url: String,
    dialect: Dialect,
    options: SessionOptions,
}

impl SqlxDestination {
    pub fn new(url: impl Into<String>, options: SessionOptions) -> Result<Self, StoreError> {
        let url = url.into();
        let dialect = Dialect::from_url(&url)?;
        Ok(Self {
            url,
            dialect,
            options,
        })
    }
}

#[async_trait]
impl Destination for SqlxDestination {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> Result<Box<dyn DestinationSession>, StoreError> {
        sqlx::any::install_default_drivers();

        let statements = self
            .dialect
            .session_statements(self.options.idle_timeout_secs, self.options.net_timeout_secs);

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .min_connections(0)
            .acquire_timeout(self.options.connect_timeout)
            .idle_timeout(None)
            .max_lifetime(None)
            .after_connect(move |conn, _meta| {
                let statements = statements.clone();
                Box::pin(async move {
                    for sql in &statements {
                        sqlx::query(sql).execute(&mut *conn).await?;
                    }
                    Ok(())
                })
            })
            .connect(&self.url)
            .await
            .map_err(|e| StoreError::Connect(e.to_string()))?;

        info!(dialect = %self.dialect, "connected to destination");
        Ok(Box::new(SqlxSession {
            pool,
            dialect: self.dialect,
        }))
    }
}

pub struct SqlxSession {
    pool: AnyPool,
    dialect: Dialect,
}

impl SqlxSession {
    fn insert_sql(&self, table: &str, columns: &[Column], rows: usize) -> String {
        let quoted_cols = columns
            .iter()
            .map(|c| self.dialect.quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let mut param = 0;
        let values_clause = (0..rows)
            .map(|_| {
                let placeholders = columns
                    .iter()
                    .map(|_| {
                        param += 1;
                        self.dialect.placeholder(param)
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({placeholders})")
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.dialect.quote_ident(table),
            quoted_cols,
            values_clause
        )
    }
}

#[async_trait]
impl DestinationSession for SqlxSession {
    async fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar(self.dialect.table_exists_sql())
            .bind(table.to_string())
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    async fn truncate(&mut self, table: &str) -> Result<(), StoreError> {
        let sql = self.dialect.truncate_sql(table);
        debug!(%table, "resetting table");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<(), StoreError> {
        let sql = create_table_sql(self.dialect, table, columns);
        debug!(%table, sql = %sql, "ensuring table");
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[Column],
        rows: &[Vec<Value>],
    ) -> Result<u64, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }
        if columns.is_empty() {
            return Err(StoreError::InvalidInput(
                "insert_batch requires at least one column".to_string(),
            ));
        }
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(StoreError::InvalidInput(format!(
                    "Row {} has {} values, expected {}",
                    index,
                    row.len(),
                    columns.len()
                )));
            }
        }

        let rows_per_statement = (self.dialect.max_params() / columns.len()).max(1);
        let span = debug_span!(
            "db.insert_batch",
            table = %table,
            rows = rows.len(),
            duration_ms = tracing::field::Empty
        );
        let start = Instant::now();

        let total = async {
            let mut tx = self.pool.begin().await?;
            let mut total = 0;
            for chunk in rows.chunks(rows_per_statement) {
                let sql = self.insert_sql(table, columns, chunk.len());
                let mut query = sqlx::query(&sql);
                for row in chunk {
                    for (value, column) in row.iter().zip(columns) {
                        query = bind_value(query, value, column.column_type);
                    }
                }
                total += query.execute(&mut *tx).await?.rows_affected();
            }
            tx.commit().await?;
            Ok::<u64, StoreError>(total)
        }
        .instrument(span.clone())
        .await?;

        span.record("duration_ms", start.elapsed().as_millis() as u64);
        Ok(total)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        Ok(sqlx::query(sql).execute(&self.pool).await?.rows_affected())
    }

    async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        let mut query = sqlx::query(sql);
        for value in params {
            // untyped NULLs go out as text
            query = bind_value(query, value, ColumnType::Text);
        }
        Ok(query.execute(&self.pool).await?.rows_affected())
    }

    async fn close(self: Box<Self>) {
        self.pool.close().await;
    }
}

/// NULLs are bound with the column's type so strict backends accept them.
fn bind_value<'q>(
    query: Query<'q, Any, AnyArguments<'q>>,
    value: &Value,
    column_type: ColumnType,
) -> Query<'q, Any, AnyArguments<'q>> {
    match value {
        Value::Null => match column_type {
            ColumnType::Integer => query.bind(None::<i64>),
            ColumnType::Float | ColumnType::Decimal(..) => query.bind(None::<f64>),
            ColumnType::Boolean => query.bind(None::<bool>),
            ColumnType::VarChar(_) | ColumnType::Text => query.bind(None::<String>),
        },
        Value::Bool(v) => query.bind(*v),
        Value::Integer(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(s) => query.bind(s.clone()),
    }
}
