use anyhow::Result;
use dbfsync_lock::{LockState, LockType, OsProcessProbe, SyncLockManager};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ReleaseTarget {
    Local,
    Remote,
    All,
}

impl ReleaseTarget {
    fn lock_types(self) -> &'static [LockType] {
        match self {
            ReleaseTarget::Local => &[LockType::Local],
            ReleaseTarget::Remote => &[LockType::Remote],
            ReleaseTarget::All => &LockType::ALL,
        }
    }
}

fn manager(dir: &Path) -> SyncLockManager {
    SyncLockManager::new(dir, Box::new(OsProcessProbe))
}

pub fn status(dir: &Path) -> Result<()> {
    let locks = manager(dir);
    println!("🔒 Lock directory: {}", dir.display());
    for lock_type in LockType::ALL {
        let status = locks.status(lock_type);
        let since = status
            .acquired_at
            .as_deref()
            .map(|at| format!(" since {at}"))
            .unwrap_or_default();
        let state = match status.state {
            LockState::Free => "free".to_string(),
            LockState::Running { pid: Some(pid) } => format!("running (pid {pid}){since}"),
            LockState::Running { pid: None } => format!("running (pid unknown){since}"),
            LockState::Stale { pid: Some(pid) } => format!("stale (pid {pid} is gone){since}"),
            LockState::Stale { pid: None } => format!("stale (no pid recorded){since}"),
        };
        println!(
            "   {} [{}]: {}",
            lock_type,
            status.paths.marker.display(),
            state
        );
    }
    Ok(())
}

/// Force-remove lock files, for recovery after a crash.
pub fn release(dir: &Path, target: ReleaseTarget) -> Result<()> {
    let locks = manager(dir);
    for lock_type in target.lock_types() {
        if locks.is_running(*lock_type) {
            println!("⚠️  {lock_type} sync looks alive; removing its lock anyway");
        }
        locks.release(*lock_type);
        println!("🔓 Released {lock_type} sync lock");
    }
    Ok(())
}
