use dbfsync_protocol::ProgressSink;
use std::io::Write;

/// Writes each progress line verbatim to stdout and flushes, so a
/// supervising process reading the pipe sees lines as they happen.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutProgress;

impl ProgressSink for StdoutProgress {
    fn message(&self, message: &str) {
        let mut out = std::io::stdout().lock();
        // A closed pipe must not take the sync down with it.
        let _ = writeln!(out, "{message}");
        let _ = out.flush();
    }
}
