//! In-memory destination with fault injection, for dry runs and tests.

use async_trait::async_trait;
use dbfsync_protocol::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;
use crate::schema::{create_table_sql, Column, Dialect};
use crate::store::{Destination, DestinationSession};
use crate::value::payload_bytes;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Default)]
struct Faults {
    max_payload_bytes: Option<usize>,
    failing_connects: u32,
    dropped_batches: u32,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: BTreeMap<String, MemoryTable>,
    statements: Vec<String>,
    parameters: Vec<Vec<Value>>,
    faults: Faults,
    connections: u32,
    batches: u32,
}

/// Shared handle; clones see the same tables.
#[derive(Debug, Clone, Default)]
pub struct MemoryDestination {
    state: Arc<Mutex<MemoryState>>,
    dialect: Dialect,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any batch whose rough payload exceeds `bytes` as oversized.
    pub fn with_max_payload_bytes(self, bytes: usize) -> Self {
        self.lock().faults.max_payload_bytes = Some(bytes);
        self
    }

    /// Fail the next `n` connection attempts.
    pub fn fail_next_connects(&self, n: u32) {
        self.lock().faults.failing_connects = n;
    }

    /// Drop the connection on the next `n` batch inserts.
    pub fn drop_next_batches(&self, n: u32) {
        self.lock().faults.dropped_batches = n;
    }

    pub fn table(&self, name: &str) -> Option<MemoryTable> {
        self.lock().tables.get(name).cloned()
    }

    pub fn rows(&self, name: &str) -> Vec<Vec<Value>> {
        self.table(name).map(|t| t.rows).unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.lock().tables.keys().cloned().collect()
    }

    /// Every statement seen, in order, rendered in the configured dialect.
    pub fn statements(&self) -> Vec<String> {
        self.lock().statements.clone()
    }

    /// Parameters of each bound statement, in order.
    pub fn bound_parameters(&self) -> Vec<Vec<Value>> {
        self.lock().parameters.clone()
    }

    pub fn connections(&self) -> u32 {
        self.lock().connections
    }

    /// Successful batch inserts so far.
    pub fn batches(&self) -> u32 {
        self.lock().batches
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panicked test thread must not cascade into unrelated assertions.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn connect(&self) -> Result<Box<dyn DestinationSession>, StoreError> {
        let mut state = self.lock();
        if state.faults.failing_connects > 0 {
            state.faults.failing_connects -= 1;
            return Err(StoreError::Connect("injected connect failure".to_string()));
        }
        state.connections += 1;
        Ok(Box::new(MemorySession {
            destination: self.clone(),
        }))
    }
}

struct MemorySession {
    destination: MemoryDestination,
}

#[async_trait]
impl DestinationSession for MemorySession {
    async fn table_exists(&mut self, table: &str) -> Result<bool, StoreError> {
        Ok(self.destination.lock().tables.contains_key(table))
    }

    async fn truncate(&mut self, table: &str) -> Result<(), StoreError> {
        let sql = self.destination.dialect.truncate_sql(table);
        let mut state = self.destination.lock();
        state.statements.push(sql);
        match state.tables.get_mut(table) {
            Some(t) => {
                t.rows.clear();
                Ok(())
            }
            None => Err(StoreError::Database(format!("Table '{table}' doesn't exist"))),
        }
    }

    async fn create_table(&mut self, table: &str, columns: &[Column]) -> Result<(), StoreError> {
        let sql = create_table_sql(self.destination.dialect, table, columns);
        let mut state = self.destination.lock();
        state.statements.push(sql);
        state
            .tables
            .entry(table.to_string())
            .or_insert_with(|| MemoryTable {
                columns: columns.to_vec(),
                rows: Vec::new(),
            });
        Ok(())
    }

    async fn insert_batch(
        &mut self,
        table: &str,
        columns: &[Column],
        rows: &[Vec<Value>],
    ) -> Result<u64, StoreError> {
        let mut state = self.destination.lock();
        if state.faults.dropped_batches > 0 {
            state.faults.dropped_batches -= 1;
            return Err(StoreError::ConnectionLost(
                "Lost connection to server during query".to_string(),
            ));
        }
        if let Some(limit) = state.faults.max_payload_bytes {
            let size: usize = rows.iter().map(|r| payload_bytes(r)).sum();
            if size > limit {
                return Err(StoreError::Oversize(format!(
                    "Got a packet bigger than 'max_allowed_packet' bytes ({size} > {limit})"
                )));
            }
        }
        let Some(target) = state.tables.get_mut(table) else {
            return Err(StoreError::Database(format!("Table '{table}' doesn't exist")));
        };
        if target.columns.len() != columns.len() {
            return Err(StoreError::InvalidInput(format!(
                "table {table} has {} columns, batch has {}",
                target.columns.len(),
                columns.len()
            )));
        }
        target.rows.extend(rows.iter().cloned());
        state.batches += 1;
        Ok(rows.len() as u64)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64, StoreError> {
        self.destination.lock().statements.push(sql.to_string());
        Ok(0)
    }

    async fn execute_with(&mut self, sql: &str, params: &[Value]) -> Result<u64, StoreError> {
        let mut state = self.destination.lock();
        state.statements.push(sql.to_string());
        state.parameters.push(params.to_vec());
        Ok(1)
    }

    async fn close(self: Box<Self>) {}
}
