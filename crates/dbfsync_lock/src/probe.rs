//! Process liveness oracle.

/// Answer from a liveness probe.
///
/// `Unknown` covers "permission denied" and any probe failure. Callers
/// that must not grant a second lock treat it as alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Alive,
    Dead,
    Unknown,
}

pub trait ProcessProbe: Send + Sync {
    fn liveness(&self, pid: u32) -> Liveness;
}

/// Asks the operating system's process table.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsProcessProbe;

impl ProcessProbe for OsProcessProbe {
    fn liveness(&self, pid: u32) -> Liveness {
        os_liveness(pid)
    }
}

#[cfg(unix)]
fn os_liveness(pid: u32) -> Liveness {
    // pid_t is signed; anything that does not fit cannot name a process.
    let Ok(raw) = libc::pid_t::try_from(pid) else {
        return Liveness::Dead;
    };
    if raw <= 0 {
        return Liveness::Dead;
    }
    // Signal 0 performs the permission and existence checks only.
    let rc = unsafe { libc::kill(raw, 0) };
    if rc == 0 {
        return Liveness::Alive;
    }
    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Liveness::Dead,
        _ => Liveness::Unknown,
    }
}

#[cfg(windows)]
fn os_liveness(pid: u32) -> Liveness {
    use sysinfo::{Pid, System};

    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    if sys.refresh_process(pid) && sys.process(pid).is_some() {
        Liveness::Alive
    } else {
        Liveness::Dead
    }
}

#[cfg(not(any(unix, windows)))]
fn os_liveness(_pid: u32) -> Liveness {
    Liveness::Unknown
}
