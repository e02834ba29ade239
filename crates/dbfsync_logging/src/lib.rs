//! Logging for the dbfsync binaries.
//!
//! Diagnostics go to a size-rotated file under `<home>/logs` and to
//! stderr. Stdout is left alone: it carries the progress lines the
//! supervising GUI scrapes.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

pub const DEFAULT_LOG_FILTER: &str =
    "dbfsync=info,dbfsync_dbf=info,dbfsync_sinks=info,dbfsync_lock=info";
pub const HOME_ENV: &str = "DBFSYNC_HOME";

const MAX_LOG_FILES: usize = 5;
const MAX_LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the full file filter on stderr (`debug` if `RUST_LOG` is unset).
    pub verbose: bool,
    /// Only warnings and errors on stderr.
    pub quiet: bool,
    /// Overrides `<home>/logs`.
    pub log_dir: Option<PathBuf>,
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let log_dir = match config.log_dir.clone() {
        Some(dir) => dir,
        None => logs_dir()?,
    };
    let file_writer = SharedRollingWriter::new(&log_dir, config.app_name)
        .context("Failed to initialize rolling log writer")?;

    let file_filter = env_filter_or(DEFAULT_LOG_FILTER);
    let console_filter = if config.quiet {
        EnvFilter::new("warn")
    } else if config.verbose {
        env_filter_or("dbfsync=debug,dbfsync_dbf=debug,dbfsync_sinks=debug,dbfsync_lock=debug")
    } else {
        env_filter_or(DEFAULT_LOG_FILTER)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(console_filter),
        )
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(())
}

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// `$DBFSYNC_HOME`, else `~/.dbfsync`.
pub fn dbfsync_home() -> Result<PathBuf> {
    if let Some(path) = std::env::var_os(HOME_ENV).filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    dirs::home_dir()
        .map(|home| home.join(".dbfsync"))
        .context("Could not determine home directory; set DBFSYNC_HOME")
}

pub fn logs_dir() -> Result<PathBuf> {
    Ok(dbfsync_home()?.join("logs"))
}

/// Appends to `<name>.log`, shifting it to `<name>.log.1` .. `.log.N-1`
/// once it would grow past `max_size`.
struct SizeRotatingFile {
    dir: PathBuf,
    base_name: String,
    max_files: usize,
    max_size: u64,
    file: Option<File>,
    written: u64,
}

impl SizeRotatingFile {
    fn open(dir: &Path, base_name: &str, max_files: usize, max_size: u64) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let mut log = Self {
            dir: dir.to_path_buf(),
            base_name: sanitize_name(base_name),
            max_files: max_files.max(1),
            max_size,
            file: None,
            written: 0,
        };
        log.reopen()?;
        if log.written > log.max_size {
            log.rotate()?;
        }
        Ok(log)
    }

    fn path(&self, index: usize) -> PathBuf {
        match index {
            0 => self.dir.join(format!("{}.log", self.base_name)),
            n => self.dir.join(format!("{}.log.{}", self.base_name, n)),
        }
    }

    fn reopen(&mut self) -> io::Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(0))?;
        self.written = file.metadata()?.len();
        self.file = Some(file);
        Ok(())
    }

    fn rotate(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
        }
        let last = self.max_files.saturating_sub(1);
        if last == 0 {
            // Single-file mode: start over.
            File::create(self.path(0))?;
            return self.reopen();
        }
        for index in (0..last).rev() {
            let from = self.path(index);
            if from.exists() {
                fs::rename(&from, self.path(index + 1))?;
            }
        }
        self.reopen()
    }
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.written > 0 && self.written + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "log file unavailable"))?;
        let n = file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[derive(Clone)]
struct SharedRollingWriter(Arc<Mutex<SizeRotatingFile>>);

impl SharedRollingWriter {
    fn new(dir: &Path, app_name: &str) -> Result<Self> {
        let file = SizeRotatingFile::open(dir, app_name, MAX_LOG_FILES, MAX_LOG_FILE_SIZE)
            .with_context(|| format!("Failed to open log file in {}", dir.display()))?;
        Ok(Self(Arc::new(Mutex::new(file))))
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SharedRollingWriter {
    type Writer = SharedRollingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

impl Write for SharedRollingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log writer lock poisoned"))?
            .flush()
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect();
    if cleaned.is_empty() {
        "dbfsync".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rotates_when_full_and_keeps_max_files() {
        let dir = TempDir::new().unwrap();
        let mut log = SizeRotatingFile::open(dir.path(), "sync", 3, 10).unwrap();
        for line in ["aaaaaaaa\n", "bbbbbbbb\n", "cccccccc\n", "dddddddd\n"] {
            log.write_all(line.as_bytes()).unwrap();
        }
        log.flush().unwrap();

        let read = |name: &str| fs::read_to_string(dir.path().join(name)).unwrap();
        assert_eq!(read("sync.log"), "dddddddd\n");
        assert_eq!(read("sync.log.1"), "cccccccc\n");
        assert_eq!(read("sync.log.2"), "bbbbbbbb\n");
        assert!(!dir.path().join("sync.log.3").exists());
    }

    #[test]
    fn reopening_appends_to_existing_log() {
        let dir = TempDir::new().unwrap();
        {
            let mut log = SizeRotatingFile::open(dir.path(), "sync", 2, 1024).unwrap();
            log.write_all(b"first\n").unwrap();
        }
        let mut log = SizeRotatingFile::open(dir.path(), "sync", 2, 1024).unwrap();
        log.write_all(b"second\n").unwrap();
        log.flush().unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("sync.log")).unwrap(),
            "first\nsecond\n"
        );
    }

    #[test]
    fn single_file_mode_truncates() {
        let dir = TempDir::new().unwrap();
        let mut log = SizeRotatingFile::open(dir.path(), "one", 1, 8).unwrap();
        log.write_all(b"1234567\n").unwrap();
        log.write_all(b"abc\n").unwrap();
        log.flush().unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("one.log")).unwrap(), "abc\n");
    }

    #[test]
    fn zero_max_files_rotates_like_single_file_mode() {
        let dir = TempDir::new().unwrap();
        let mut log = SizeRotatingFile::open(dir.path(), "zero", 0, 8).unwrap();
        log.write_all(b"1234567\n").unwrap();
        log.write_all(b"abc\n").unwrap();

        // rotate() must cope even without the clamp in open()
        log.max_files = 0;
        log.write_all(b"xyz12345\n").unwrap();
        log.flush().unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("zero.log")).unwrap(), "xyz12345\n");
        assert!(!dir.path().join("zero.log.1").exists());
    }

    #[test]
    fn names_are_sanitized() {
        assert_eq!(sanitize_name("dbf sync/v2"), "dbf_sync_v2");
        assert_eq!(sanitize_name(""), "dbfsync");
    }
}
