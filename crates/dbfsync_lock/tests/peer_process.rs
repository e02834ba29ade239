//! Lock exchange against a real peer process and the OS liveness probe.
#![cfg(unix)]

use dbfsync_lock::{LockPaths, LockState, LockType, OsProcessProbe, SyncLockManager};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn write_peer_lock(dir: &std::path::Path, lock_type: LockType, pid: u32) -> LockPaths {
    let paths = LockPaths::new(dir, lock_type);
    fs::write(&paths.marker, "2025-12-12 08:00:00").unwrap();
    fs::write(&paths.pid, pid.to_string()).unwrap();
    paths
}

#[test]
fn live_remote_peer_blocks_local_until_it_exits() {
    let dir = TempDir::new().unwrap();
    let mut peer = Command::new("sleep").arg("30").spawn().unwrap();
    let peer_files = write_peer_lock(dir.path(), LockType::Remote, peer.id());

    let locks = SyncLockManager::new(dir.path(), Box::new(OsProcessProbe));
    assert!(locks.is_running(LockType::Remote));
    assert!(!locks.acquire(LockType::Local));

    peer.kill().unwrap();
    peer.wait().unwrap();

    assert!(locks.acquire(LockType::Local));
    assert!(!peer_files.marker.exists());
    assert!(!peer_files.pid.exists());
    assert_eq!(
        fs::read_to_string(locks.paths(LockType::Local).pid).unwrap(),
        std::process::id().to_string()
    );
    locks.release(LockType::Local);
}

#[test]
fn crashed_holder_of_the_same_type_is_reclaimed() {
    let dir = TempDir::new().unwrap();
    let mut crashed = Command::new("true").spawn().unwrap();
    let pid = crashed.id();
    crashed.wait().unwrap();
    write_peer_lock(dir.path(), LockType::Local, pid);

    let locks = SyncLockManager::new(dir.path(), Box::new(OsProcessProbe));
    assert_eq!(
        locks.state(LockType::Local),
        LockState::Stale { pid: Some(pid) }
    );
    let guard = locks.acquire_guard(LockType::Local).unwrap();
    assert!(locks.is_running(LockType::Local));
    guard.release();
    assert_eq!(locks.state(LockType::Local), LockState::Free);
}
