use anyhow::{Context, Result};
use dbfsync::{PlannedTable, StdoutProgress, SyncConfig, SyncRunner};
use dbfsync_lock::{LockType, OsProcessProbe, SyncLockManager};
use dbfsync_protocol::{ProgressSink, TableIdentity};
use dbfsync_sinks::{Destination, MemoryDestination, SqlxDestination};
use std::sync::Arc;
use tracing::info;

#[derive(Debug)]
pub struct SyncArgs {
    pub lock: LockType,
    pub dry_run: bool,
    /// `GROUP/table` entries replacing the configured plan.
    pub tables: Vec<String>,
}

pub async fn run(config: SyncConfig, args: SyncArgs) -> Result<()> {
    let progress: Arc<dyn ProgressSink> = Arc::new(StdoutProgress);
    let tables = select_tables(&config, &args.tables)?;

    let locks = SyncLockManager::new(&config.lock_dir, Box::new(OsProcessProbe));
    let guard = match locks.acquire_guard(args.lock) {
        Ok(guard) => guard,
        Err(e) => {
            progress.message(&format!("❌ Cannot start {} sync: {e}", args.lock));
            return Err(e).context("Sync lock not acquired");
        }
    };

    let destination: Arc<dyn Destination> = if args.dry_run {
        progress.message("🧪 Dry run: loading into memory, the database is not touched");
        Arc::new(MemoryDestination::new())
    } else {
        info!(url = %config.database.redacted_url(), "using destination database");
        Arc::new(
            SqlxDestination::new(config.database.url()?, config.session.clone())
                .context("Invalid destination database URL")?,
        )
    };

    let runner = SyncRunner::new(&config, destination, Arc::clone(&progress));
    let result = runner.run_sync(&tables).await;
    guard.release();
    result.map(|_| ())
}

fn select_tables(config: &SyncConfig, requested: &[String]) -> Result<Vec<PlannedTable>> {
    if requested.is_empty() {
        return Ok(config.tables());
    }
    requested
        .iter()
        .map(|entry| {
            entry
                .parse::<TableIdentity>()
                .with_context(|| format!("Bad --table value '{entry}'"))?;
            let (group, table) = entry
                .split_once('/')
                .with_context(|| format!("Bad --table value '{entry}'"))?;
            Ok(PlannedTable::new(group.trim(), table.trim()))
        })
        .collect()
}
