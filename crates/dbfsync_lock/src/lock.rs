//! Two-file lock shared by the local and remote sync agents.
//!
//! Each lock type owns a marker (`<stem>_sync.lock`, acquisition time) and
//! a pid record (`<stem>_sync.pid`). The stems match the peer agents that
//! still read these files, so the names and contents are fixed.

use chrono::Local;
use fs2::FileExt;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::error::LockError;
use crate::probe::{Liveness, ProcessProbe};

/// How long a marker without a pid record is assumed to belong to a holder
/// that is still writing it.
pub const PID_WRITE_GRACE: Duration = Duration::from_secs(10);

/// How long an acquire waits for another acquirer in the same directory.
pub const GUARD_WAIT: Duration = Duration::from_secs(2);

const GUARD_POLL: Duration = Duration::from_millis(25);

/// Advisory lock serialising check, reclaim and create across our own
/// processes. The peer agents do not know about it.
const GUARD_FILE: &str = "sync.guard";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    Local,
    Remote,
}

impl LockType {
    pub const ALL: [LockType; 2] = [LockType::Local, LockType::Remote];

    pub fn as_str(self) -> &'static str {
        match self {
            LockType::Local => "local",
            LockType::Remote => "remote",
        }
    }

    /// File stem used by the agent that owns this lock type.
    pub fn file_stem(self) -> &'static str {
        match self {
            LockType::Local => "python",
            LockType::Remote => "php",
        }
    }

    pub fn other(self) -> LockType {
        match self {
            LockType::Local => LockType::Remote,
            LockType::Remote => LockType::Local,
        }
    }
}

impl fmt::Display for LockType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" | "python" => Ok(LockType::Local),
            "remote" | "php" => Ok(LockType::Remote),
            other => Err(format!("unknown lock type '{other}' (expected local or remote)")),
        }
    }
}

/// Marker and pid record for one lock type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockPaths {
    pub lock_type: LockType,
    pub marker: PathBuf,
    pub pid: PathBuf,
}

impl LockPaths {
    pub fn new(dir: &Path, lock_type: LockType) -> Self {
        let stem = lock_type.file_stem();
        Self {
            lock_type,
            marker: dir.join(format!("{stem}_sync.lock")),
            pid: dir.join(format!("{stem}_sync.pid")),
        }
    }

    /// Remove both files. Missing files are fine; other failures are logged.
    fn remove(&self) {
        for path in [&self.marker, &self.pid] {
            match fs::remove_file(path) {
                Ok(()) => debug!("Removed {}", path.display()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove lock file {}: {}", path.display(), e),
            }
        }
    }
}

fn read_pid(path: &Path) -> io::Result<Option<u32>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(text.trim().parse::<u32>().ok()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn file_age(path: &Path) -> Option<Duration> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|t| SystemTime::now().duration_since(t).ok())
}

/// Move `from` aside. `Ok(false)` if it was already gone.
fn move_aside(from: &Path, to: &Path) -> Result<bool, LockError> {
    match fs::rename(from, to) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(LockError::io(from, e)),
    }
}

/// Put a moved-aside file back unless something new already took its place.
fn restore(moved: &Path, original: &Path) {
    match fs::hard_link(moved, original) {
        Ok(()) => discard(moved),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => discard(moved),
        Err(e) => {
            debug!("hard link {} failed ({}), renaming back", moved.display(), e);
            if let Err(e) = fs::rename(moved, original) {
                warn!("Failed to restore {}: {}", original.display(), e);
            }
        }
    }
}

fn discard(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    /// No marker file.
    Free,
    /// Holder is alive, could not be probed, or is still writing its pid.
    Running { pid: Option<u32> },
    /// Holder is gone; the files may be reclaimed.
    Stale { pid: Option<u32> },
}

impl LockState {
    pub fn is_running(self) -> bool {
        matches!(self, LockState::Running { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockStatus {
    pub paths: LockPaths,
    pub acquired_at: Option<String>,
    pub state: LockState,
}

pub struct SyncLockManager {
    dir: PathBuf,
    probe: Box<dyn ProcessProbe>,
    holder_pid: u32,
    guard_wait: Duration,
}

impl fmt::Debug for SyncLockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncLockManager")
            .field("dir", &self.dir)
            .field("holder_pid", &self.holder_pid)
            .finish()
    }
}

impl SyncLockManager {
    pub fn new(dir: impl Into<PathBuf>, probe: Box<dyn ProcessProbe>) -> Self {
        Self {
            dir: dir.into(),
            probe,
            holder_pid: std::process::id(),
            guard_wait: GUARD_WAIT,
        }
    }

    /// Record `pid` instead of the current process id when acquiring.
    pub fn with_holder_pid(mut self, pid: u32) -> Self {
        self.holder_pid = pid;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn paths(&self, lock_type: LockType) -> LockPaths {
        LockPaths::new(&self.dir, lock_type)
    }

    /// Try to take `lock_type`. Any failure, including I/O trouble, is `false`.
    pub fn acquire(&self, lock_type: LockType) -> bool {
        match self.try_acquire(lock_type) {
            Ok(()) => true,
            Err(e) => {
                warn!("Could not acquire {} sync lock: {}", lock_type, e);
                false
            }
        }
    }

    /// Like [`acquire`](Self::acquire) but returns a guard that releases on drop.
    pub fn acquire_guard(&self, lock_type: LockType) -> Result<SyncLockGuard, LockError> {
        self.try_acquire(lock_type)?;
        Ok(SyncLockGuard {
            paths: self.paths(lock_type),
            released: false,
        })
    }

    /// Delete both files if present. Never fails.
    pub fn release(&self, lock_type: LockType) {
        self.paths(lock_type).remove();
        info!("Released {} sync lock", lock_type);
    }

    pub fn is_running(&self, lock_type: LockType) -> bool {
        self.state(lock_type).is_running()
    }

    pub fn status(&self, lock_type: LockType) -> LockStatus {
        let paths = self.paths(lock_type);
        let acquired_at = fs::read_to_string(&paths.marker)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        LockStatus {
            acquired_at,
            state: self.state(lock_type),
            paths,
        }
    }

    pub fn state(&self, lock_type: LockType) -> LockState {
        let paths = self.paths(lock_type);
        let marker_age = match fs::metadata(&paths.marker) {
            Ok(meta) => meta
                .modified()
                .ok()
                .and_then(|t| SystemTime::now().duration_since(t).ok()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return LockState::Free,
            Err(e) => {
                warn!("Cannot inspect {}: {}", paths.marker.display(), e);
                return LockState::Running { pid: None };
            }
        };

        let pid = match read_pid(&paths.pid) {
            Ok(pid) => pid,
            Err(e) => {
                warn!("Cannot read {}: {}", paths.pid.display(), e);
                return LockState::Running { pid: None };
            }
        };

        match pid {
            Some(pid) => match self.probe.liveness(pid) {
                Liveness::Dead => LockState::Stale { pid: Some(pid) },
                Liveness::Alive | Liveness::Unknown => LockState::Running { pid: Some(pid) },
            },
            None if marker_age.is_some_and(|age| age < PID_WRITE_GRACE) => {
                LockState::Running { pid: None }
            }
            None => LockState::Stale { pid: None },
        }
    }

    fn try_acquire(&self, lock_type: LockType) -> Result<(), LockError> {
        fs::create_dir_all(&self.dir).map_err(|e| LockError::io(&self.dir, e))?;
        // Held until return; closing the file drops the advisory lock.
        let _guard = self.lock_guard_file()?;

        let peer = lock_type.other();
        match self.state(peer) {
            LockState::Running { pid } => return Err(LockError::PeerRunning { peer, pid }),
            LockState::Stale { pid } => {
                info!("Removing stale {} sync lock (pid {:?})", peer, pid);
                let peer_paths = self.paths(peer);
                if !self.reclaim(&peer_paths, pid)? {
                    let pid = read_pid(&peer_paths.pid).ok().flatten();
                    return Err(LockError::PeerRunning { peer, pid });
                }
            }
            LockState::Free => {}
        }

        let paths = self.paths(lock_type);
        let mut reclaimed = false;
        loop {
            match self.create_marker(&paths) {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(LockError::CreateFailed {
                        path: paths.marker.clone(),
                        source: e,
                    })
                }
            }
            match self.state(lock_type) {
                LockState::Running { pid } => return Err(LockError::Held { lock_type, pid }),
                LockState::Stale { pid } if !reclaimed => {
                    info!("Reclaiming stale {} sync lock (pid {:?})", lock_type, pid);
                    if !self.reclaim(&paths, pid)? {
                        let pid = read_pid(&paths.pid).ok().flatten();
                        return Err(LockError::Held { lock_type, pid });
                    }
                }
                // Marker vanished between the create and the check.
                LockState::Free if !reclaimed => {}
                LockState::Stale { pid } => return Err(LockError::Held { lock_type, pid }),
                LockState::Free => return Err(LockError::Held { lock_type, pid: None }),
            }
            reclaimed = true;
        }

        if let Err(e) = fs::write(&paths.pid, self.holder_pid.to_string()) {
            paths.remove();
            return Err(LockError::CreateFailed {
                path: paths.pid.clone(),
                source: e,
            });
        }
        info!(
            "Acquired {} sync lock (pid {}) in {}",
            lock_type,
            self.holder_pid,
            self.dir.display()
        );
        Ok(())
    }

    fn lock_guard_file(&self) -> Result<File, LockError> {
        let path = self.dir.join(GUARD_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::io(&path, e))?;

        let deadline = Instant::now() + self.guard_wait;
        loop {
            // fs2's method, not the std `File::try_lock_exclusive` of newer toolchains.
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => return Ok(file),
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        return Err(LockError::Busy { path });
                    }
                    thread::sleep(GUARD_POLL);
                }
                Err(e) => return Err(LockError::io(&path, e)),
            }
        }
    }

    /// Take a stale lock's files out of the way.
    ///
    /// Both files are renamed aside before the pid is re-read, so a holder
    /// that replaced them after `expected` was observed is never deleted:
    /// its files are put back and `Ok(false)` is returned.
    fn reclaim(&self, paths: &LockPaths, expected: Option<u32>) -> Result<bool, LockError> {
        let marker_aside = self.aside_path(&paths.marker);
        if !move_aside(&paths.marker, &marker_aside)? {
            return Ok(true);
        }
        let pid_aside = self.aside_path(&paths.pid);
        let pid_moved = match move_aside(&paths.pid, &pid_aside) {
            Ok(moved) => moved,
            Err(e) => {
                restore(&marker_aside, &paths.marker);
                return Err(e);
            }
        };

        let current = if pid_moved {
            read_pid(&pid_aside).ok().flatten()
        } else {
            None
        };
        // Without a pid only the marker's age says it is the same stale lock.
        let unchanged = current == expected
            && (expected.is_some()
                || file_age(&marker_aside).is_some_and(|age| age >= PID_WRITE_GRACE));

        if unchanged {
            discard(&marker_aside);
            if pid_moved {
                discard(&pid_aside);
            }
            return Ok(true);
        }

        info!(
            "{} sync lock changed hands during reclaim (pid {:?} -> {:?}), leaving it",
            paths.lock_type, expected, current
        );
        if pid_moved {
            restore(&pid_aside, &paths.pid);
        }
        restore(&marker_aside, &paths.marker);
        Ok(false)
    }

    fn aside_path(&self, path: &Path) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let mut raw = path.as_os_str().to_owned();
        raw.push(format!(".{}-{}.stale", self.holder_pid, nanos));
        PathBuf::from(raw)
    }

    fn create_marker(&self, paths: &LockPaths) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&paths.marker)?;
        let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        file.write_all(stamp.as_bytes())?;
        file.sync_all()
    }
}

/// Holds a lock until dropped or explicitly released.
#[derive(Debug)]
pub struct SyncLockGuard {
    paths: LockPaths,
    released: bool,
}

impl SyncLockGuard {
    pub fn lock_type(&self) -> LockType {
        self.paths.lock_type
    }

    pub fn paths(&self) -> &LockPaths {
        &self.paths
    }

    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.released {
            return;
        }
        self.paths.remove();
        self.released = true;
        debug!("Released {} sync lock", self.paths.lock_type);
    }
}

impl Drop for SyncLockGuard {
    fn drop(&mut self) {
        self.release_inner();
    }
}
