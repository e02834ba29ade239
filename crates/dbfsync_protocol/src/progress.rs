//! Progress sink interface shared by the reader, the loader and the driver.
//!
//! The supervising GUI scrapes these lines, so implementations must emit
//! messages verbatim. Calls are fire-and-forget.

use std::sync::Mutex;
use std::time::Duration;

pub trait ProgressSink: Send + Sync {
    fn message(&self, message: &str);

    /// A counted progress update. The default forwards the message only.
    fn records(&self, processed: u64, message: &str) {
        let _ = processed;
        self.message(message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn message(&self, _message: &str) {}
}

/// Captures lines in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingProgress {
    lines: Mutex<Vec<String>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl ProgressSink for RecordingProgress {
    fn message(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}

/// `1234567` → `1,234,567`.
pub fn format_count(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Records per second, zero when no time has elapsed.
pub fn rate_per_sec(count: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        count as f64 / secs
    } else {
        0.0
    }
}
