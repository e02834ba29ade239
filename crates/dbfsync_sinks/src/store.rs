//! Destination store abstraction.
//!
//! A [`Destination`] hands out sessions; one session is used per table
//! load attempt and closed afterwards. `insert_batch` commits its rows as
//! one unit, so a failed batch leaves nothing behind.

use async_trait::async_trait;
use dbfsync_protocol::Value;

use crate::error::StoreError;
use crate::schema::{Column, Dialect};

#[async_trait]
pub trait Destination: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn connect(&self) -> Result<Box<dyn DestinationSession>, StoreError>;
}

#[async_trait]
pub trait DestinationSession: Send {
    async fn table_exists(&mut self, table: &str) -> Result<bool, StoreError>;

    /// Remove every row, keeping the table.
    async fn truncate(&mut self, table: &str) -> Result<(), StoreError>;

    /// `CREATE TABLE IF NOT EXISTS`.
    async fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<(), StoreError>;

    /// Insert and commit `rows`. Each row is aligned with `columns`.
    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[Column],
        rows: &[Vec<Value>],
    ) -> Result<u64, StoreError>;

    /// Run a statement with no parameters.
    async fn execute(&mut self, sql: &str) -> Result<u64, StoreError>;

    /// Run a statement, binding `params` to its placeholders in order.
    async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError>;

    async fn close(self: Box<Self>);
}
