//! The table loop: read, filter and load every planned table in order.
//!
//! A table that is missing, empty or fails to load is reported and
//! skipped; only a destination that cannot be reached at all during setup
//! stops the run.

use anyhow::{Context, Result};
use chrono::Local;
use dbfsync_dbf::DbfReader;
use dbfsync_protocol::{format_count, rate_per_sec, target_table_name, ProgressSink};
use dbfsync_sinks::{ensure_sync_log, record_sync, BulkLoader, Destination};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::{PlannedTable, SourceConfig, SyncConfig};
use crate::filter::{CutoffDate, FilterRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableFailure {
    pub table: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableOutcome {
    Loaded { records: u64 },
    Missing,
    NoData,
    Failed(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    /// Tables loaded successfully.
    pub processed: usize,
    pub total: usize,
    pub elapsed: Duration,
    pub records: u64,
    pub skipped_records: u64,
    pub missing: Vec<String>,
    pub failures: Vec<TableFailure>,
}

impl SyncReport {
    pub fn records_per_sec(&self) -> f64 {
        rate_per_sec(self.records, self.elapsed)
    }
}

pub struct SyncRunner {
    source: SourceConfig,
    table_prefix: String,
    cutoff: Option<CutoffDate>,
    reader: DbfReader,
    filters: FilterRegistry,
    loader: BulkLoader,
    destination: Arc<dyn Destination>,
    progress: Arc<dyn ProgressSink>,
}

impl SyncRunner {
    pub fn new(
        config: &SyncConfig,
        destination: Arc<dyn Destination>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            source: config.source.clone(),
            table_prefix: config.table_prefix.clone(),
            cutoff: config.cutoff.clone(),
            reader: DbfReader::default(),
            filters: config.filter_registry(),
            loader: BulkLoader::new(
                Arc::clone(&destination),
                Arc::clone(&progress),
                config.loader.clone(),
            ),
            destination,
            progress,
        }
    }

    fn say(&self, line: &str) {
        self.progress.message(line);
    }

    /// Sync `tables` in order and print the run summary.
    pub async fn run_sync(&self, tables: &[PlannedTable]) -> Result<SyncReport> {
        let start = Instant::now();
        let total = tables.len();
        self.say(&format!(
            "🚀 Starting DBF sync: {} tables from {}",
            total,
            self.source.root.display()
        ));
        if let Some(cutoff) = &self.cutoff {
            self.say(&format!("📅 Filter cutoff date: {cutoff}"));
        }

        self.prepare_sync_log()
            .await
            .context("Cannot reach the destination database")?;

        let mut report = SyncReport {
            total,
            ..SyncReport::default()
        };
        for (index, table) in tables.iter().enumerate() {
            let span = info_span!("sync_table", table = %table.identity);
            let (outcome, skipped) = self.sync_table(table, index, total).instrument(span).await;
            report.skipped_records += skipped as u64;
            match outcome {
                TableOutcome::Loaded { records } => {
                    report.processed += 1;
                    report.records += records;
                }
                TableOutcome::Missing => report.missing.push(table.label()),
                TableOutcome::NoData => {}
                TableOutcome::Failed(error) => report.failures.push(TableFailure {
                    table: table.label(),
                    error,
                }),
            }
        }

        self.finish_sync_log().await;
        report.elapsed = start.elapsed();
        self.print_summary(&report);
        info!(
            processed = report.processed,
            total = report.total,
            failed = report.failures.len(),
            records = report.records,
            "sync finished"
        );
        Ok(report)
    }

    async fn sync_table(
        &self,
        table: &PlannedTable,
        index: usize,
        total: usize,
    ) -> (TableOutcome, usize) {
        let label = table.label();
        self.say(&format!("📁 [{}/{}] Processing {}...", index + 1, total, label));

        let path = self.source.path_for(table);
        if !path.is_file() {
            warn!(path = %path.display(), "source file not found");
            self.say(&format!("⚠️  File {} not found, skipping...", path.display()));
            return (TableOutcome::Missing, 0);
        }

        let start = Instant::now();
        let dataset = self.reader.read(&path, self.progress.as_ref());
        if dataset.is_empty() {
            self.say(&format!("⚠️  No data in {label}, skipping..."));
            return (TableOutcome::NoData, 0);
        }

        let outcome = self
            .filters
            .filter(dataset, &table.identity, self.cutoff.as_ref());
        if outcome.skipped > 0 {
            self.say(&format!(
                "⏭️  Skipped {} records ({} remaining)",
                format_count(outcome.skipped as u64),
                format_count(outcome.dataset.rows.len() as u64)
            ));
        }

        let target = target_table_name(&self.table_prefix, &table.identity);
        let dataset = outcome.dataset;
        match self
            .loader
            .load(&target, &dataset.structure, &dataset.rows)
            .await
        {
            Ok(load) => {
                let elapsed = start.elapsed();
                self.say(&format!(
                    "✅ {} completed in {:.2}s ({} records)",
                    label,
                    elapsed.as_secs_f64(),
                    format_count(load.inserted)
                ));
                self.say(&format!(
                    "📊 Performance: {:.0} records/sec ({} records in {:.2}s)",
                    rate_per_sec(load.inserted, elapsed),
                    format_count(load.inserted),
                    elapsed.as_secs_f64()
                ));
                (
                    TableOutcome::Loaded {
                        records: load.inserted,
                    },
                    outcome.skipped,
                )
            }
            Err(e) => {
                error!(table = %target, error = %e, "table load failed");
                self.say(&format!("❌ Error processing {label}: {e}"));
                (TableOutcome::Failed(e.to_string()), outcome.skipped)
            }
        }
    }

    async fn prepare_sync_log(&self) -> Result<()> {
        let mut session = self.destination.connect().await?;
        let result = ensure_sync_log(session.as_mut(), self.destination.dialect()).await;
        session.close().await;
        result.context("Failed to create sync log table")
    }

    /// Failure to record the run is logged, never fatal.
    async fn finish_sync_log(&self) {
        let synced_at = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let dialect = self.destination.dialect();
        let result = async {
            let mut session = self.destination.connect().await?;
            let result = record_sync(session.as_mut(), dialect, &synced_at).await;
            session.close().await;
            result
        }
        .await;
        if let Err(e) = result {
            warn!(error = %e, "failed to record sync completion");
        }
    }

    fn print_summary(&self, report: &SyncReport) {
        let secs = report.elapsed.as_secs_f64();
        self.say("🎉 SYNC COMPLETED!");
        self.say(&format!("⏱️  Total time: {secs:.2} seconds"));
        self.say(&format!(
            "📊 Files processed: {}/{}",
            report.processed, report.total
        ));
        if report.processed > 0 {
            self.say(&format!(
                "⚡ Average per file: {:.2}s",
                secs / report.processed as f64
            ));
        }
        if report.records > 0 {
            self.say(&format!(
                "📊 Records loaded: {} ({:.0} records/sec)",
                format_count(report.records),
                report.records_per_sec()
            ));
        }
        if !report.failures.is_empty() {
            self.say(&format!("❌ Failed tables: {}", report.failures.len()));
            for failure in &report.failures {
                self.say(&format!("   - {}: {}", failure.table, failure.error));
            }
        }
    }
}
