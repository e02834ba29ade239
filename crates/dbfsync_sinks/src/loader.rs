//! Bulk loader: reset, ensure schema, then chunked inserts with recovery.
//!
//! Oversized batches are retried locally as smaller sub-batches with a
//! tighter string cap. A lost connection restarts the whole table, up to
//! `max_attempts` times.

use dbfsync_protocol::defaults::{
    DEFAULT_BATCH_SIZE, DEFAULT_LOAD_ATTEMPTS, DEFAULT_OVERSIZE_STRING_CAP_BYTES,
    DEFAULT_OVERSIZE_SUB_BATCH, DEFAULT_RETRY_BACKOFF_SECS, DEFAULT_STRING_CAP_BYTES,
};
use dbfsync_protocol::{format_count, ProgressSink, Record, TableSchema};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, info_span, warn, Instrument};

use crate::error::{LoadError, StoreError};
use crate::schema::{columns_for, Column};
use crate::store::{Destination, DestinationSession};
use crate::value::prepare_row;

#[derive(Debug, Clone)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub oversize_sub_batch: usize,
    pub string_cap_bytes: usize,
    pub oversize_string_cap_bytes: usize,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            oversize_sub_batch: DEFAULT_OVERSIZE_SUB_BATCH,
            string_cap_bytes: DEFAULT_STRING_CAP_BYTES,
            oversize_string_cap_bytes: DEFAULT_OVERSIZE_STRING_CAP_BYTES,
            max_attempts: DEFAULT_LOAD_ATTEMPTS,
            retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: u64,
    pub elapsed: Duration,
    pub attempts: u32,
}

pub struct BulkLoader {
    destination: Arc<dyn Destination>,
    progress: Arc<dyn ProgressSink>,
    options: LoaderOptions,
}

impl BulkLoader {
    pub fn new(
        destination: Arc<dyn Destination>,
        progress: Arc<dyn ProgressSink>,
        options: LoaderOptions,
    ) -> Self {
        Self {
            destination,
            progress,
            options,
        }
    }

    /// Replace the contents of `table` with `rows`.
    pub async fn load(
        &self,
        table: &str,
        schema: &TableSchema,
        rows: &[Record],
    ) -> Result<LoadReport, LoadError> {
        if schema.is_empty() {
            return Err(LoadError::EmptySchema {
                table: table.to_string(),
            });
        }
        let columns = columns_for(schema);
        let span = info_span!("load_table", table = %table, rows = rows.len());

        async {
            let start = Instant::now();
            let max_attempts = self.options.max_attempts.max(1);
            let mut attempt = 1;
            loop {
                match self.load_once(table, &columns, rows).await {
                    Ok(inserted) => {
                        info!(inserted, attempt, elapsed_ms = start.elapsed().as_millis() as u64, "table loaded");
                        return Ok(LoadReport {
                            inserted,
                            elapsed: start.elapsed(),
                            attempts: attempt,
                        });
                    }
                    Err(e) if e.is_connection_lost() && attempt < max_attempts => {
                        warn!(attempt, max_attempts, error = %e, "connection lost, retrying table");
                        self.progress.message(&format!(
                            "⚠️  Connection lost, retrying {table} ({}/{max_attempts})...",
                            attempt + 1
                        ));
                        tokio::time::sleep(self.options.retry_backoff).await;
                        attempt += 1;
                    }
                    Err(e) => {
                        return Err(LoadError::Store {
                            table: table.to_string(),
                            attempts: attempt,
                            source: e,
                        });
                    }
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn load_once(
        &self,
        table: &str,
        columns: &[Column],
        rows: &[Record],
    ) -> Result<u64, StoreError> {
        let mut session = self.destination.connect().await?;
        let result = self.load_with(session.as_mut(), table, columns, rows).await;
        session.close().await;
        result
    }

    async fn load_with(
        &self,
        session: &mut dyn DestinationSession,
        table: &str,
        columns: &[Column],
        rows: &[Record],
    ) -> Result<u64, StoreError> {
        if session.table_exists(table).await? {
            session.truncate(table).await?;
        }
        session.create_table(table, columns).await?;

        let total = rows.len();
        let mut inserted = 0u64;
        let mut processed = 0usize;
        for chunk in rows.chunks(self.options.batch_size.max(1)) {
            let batch: Vec<_> = chunk
                .iter()
                .map(|r| prepare_row(r, columns, self.options.string_cap_bytes))
                .collect();
            match session.insert_batch(table, columns, &batch).await {
                Ok(n) => inserted += n,
                Err(StoreError::Oversize(msg)) => {
                    warn!(rows = chunk.len(), error = %msg, "batch too large, retrying in sub-batches");
                    inserted += self.insert_oversized(session, table, columns, chunk).await?;
                }
                Err(e) => return Err(e),
            }
            processed += chunk.len();
            let pct = processed as f64 * 100.0 / total as f64;
            self.progress.records(
                processed as u64,
                &format!(
                    "📈 Progress: {}/{} ({:.1}%)",
                    format_count(processed as u64),
                    format_count(total as u64),
                    pct
                ),
            );
        }
        Ok(inserted)
    }

    async fn insert_oversized(
        &self,
        session: &mut dyn DestinationSession,
        table: &str,
        columns: &[Column],
        chunk: &[Record],
    ) -> Result<u64, StoreError> {
        let mut inserted = 0;
        for sub in chunk.chunks(self.options.oversize_sub_batch.max(1)) {
            let batch: Vec<_> = sub
                .iter()
                .map(|r| prepare_row(r, columns, self.options.oversize_string_cap_bytes))
                .collect();
            inserted += session.insert_batch(table, columns, &batch).await?;
        }
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryDestination;
    use dbfsync_protocol::{FieldDescriptor, FieldType, RecordingProgress, Value};

    fn schema() -> TableSchema {
        TableSchema::new(vec![
            FieldDescriptor::new("REFNO", FieldType::Character, 10, 0),
            FieldDescriptor::new("NOTES", FieldType::Character, 300, 0),
        ])
    }

    fn rows(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(vec![Value::from(format!("R{i}")), Value::Null]))
            .collect()
    }

    fn loader(dest: &MemoryDestination, progress: Arc<RecordingProgress>) -> BulkLoader {
        let options = LoaderOptions {
            batch_size: 10,
            oversize_sub_batch: 2,
            string_cap_bytes: 500,
            oversize_string_cap_bytes: 50,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1),
        };
        BulkLoader::new(Arc::new(dest.clone()), progress, options)
    }

    #[tokio::test]
    async fn batches_and_reports_progress() {
        let dest = MemoryDestination::new();
        let progress = Arc::new(RecordingProgress::new());
        let report = loader(&dest, progress.clone())
            .load("t", &schema(), &rows(25))
            .await
            .unwrap();

        assert_eq!(report.inserted, 25);
        assert_eq!(report.attempts, 1);
        assert_eq!(dest.batches(), 3);
        assert!(progress.contains("📈 Progress: 10/25 (40.0%)"));
        assert!(progress.contains("📈 Progress: 25/25 (100.0%)"));
    }

    #[tokio::test]
    async fn nulls_stay_null() {
        let dest = MemoryDestination::new();
        loader(&dest, Arc::new(RecordingProgress::new()))
            .load("t", &schema(), &rows(1))
            .await
            .unwrap();
        assert_eq!(dest.rows("t"), vec![vec![Value::from("R0"), Value::Null]]);
    }

    #[tokio::test]
    async fn oversize_batch_is_split_and_truncated() {
        let dest = MemoryDestination::new().with_max_payload_bytes(200);
        let mut data = rows(4);
        data[1] = Record::new(vec![Value::from("BIG"), Value::from("é".repeat(400))]);

        let report = loader(&dest, Arc::new(RecordingProgress::new()))
            .load("t", &schema(), &data)
            .await
            .unwrap();

        assert_eq!(report.inserted, 4);
        assert_eq!(report.attempts, 1);
        let stored = dest.rows("t");
        assert_eq!(stored.len(), 4);
        let notes = stored[1][1].as_str().unwrap();
        assert!(notes.len() <= 50);
        assert_eq!(notes, "é".repeat(25));
    }

    #[tokio::test]
    async fn oversize_that_persists_fails_the_table() {
        let dest = MemoryDestination::new().with_max_payload_bytes(1);
        let err = loader(&dest, Arc::new(RecordingProgress::new()))
            .load("t", &schema(), &rows(3))
            .await
            .unwrap_err();
        match err {
            LoadError::Store { attempts, source, .. } => {
                assert_eq!(attempts, 1);
                assert!(source.is_oversize());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn lost_connection_restarts_the_table() {
        let dest = MemoryDestination::new();
        dest.drop_next_batches(2);
        let progress = Arc::new(RecordingProgress::new());

        let report = loader(&dest, progress.clone())
            .load("t", &schema(), &rows(15))
            .await
            .unwrap();

        assert_eq!(report.attempts, 3);
        assert_eq!(report.inserted, 15);
        assert_eq!(dest.rows("t").len(), 15);
        assert_eq!(dest.connections(), 3);
        assert!(progress.contains("retrying t (2/3)"));
    }

    #[tokio::test]
    async fn lost_connection_exhausts_attempts() {
        let dest = MemoryDestination::new();
        dest.drop_next_batches(10);
        let err = loader(&dest, Arc::new(RecordingProgress::new()))
            .load("t", &schema(), &rows(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Store { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn connect_failure_is_not_retried() {
        let dest = MemoryDestination::new();
        dest.fail_next_connects(1);
        let err = loader(&dest, Arc::new(RecordingProgress::new()))
            .load("t", &schema(), &rows(5))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadError::Store { attempts: 1, source: StoreError::Connect(_), .. }
        ));
    }

    #[tokio::test]
    async fn second_load_replaces_first() {
        let dest = MemoryDestination::new();
        let l = loader(&dest, Arc::new(RecordingProgress::new()));
        l.load("t", &schema(), &rows(7)).await.unwrap();
        let second = vec![Record::new(vec![Value::from("ONLY"), Value::Null])];
        l.load("t", &schema(), &second).await.unwrap();

        assert_eq!(dest.rows("t"), vec![vec![Value::from("ONLY"), Value::Null]]);
        assert!(dest
            .statements()
            .iter()
            .any(|s| s == "TRUNCATE TABLE `t`"));
    }

    #[tokio::test]
    async fn empty_schema_is_rejected() {
        let dest = MemoryDestination::new();
        let err = loader(&dest, Arc::new(RecordingProgress::new()))
            .load("t", &TableSchema::default(), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::EmptySchema { .. }));
    }
}
