//! Table reader: tries each decoder in order, then normalizes.

use dbfsync_protocol::defaults::READ_PROGRESS_EVERY;
use dbfsync_protocol::{format_count, rate_per_sec, ProgressSink, SyncDataset};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::decode::RawTable;
use crate::error::{ReadError, Result};
use crate::lenient::LenientDecoder;
use crate::normalize::normalize_table;
use crate::strict::StrictDecoder;

/// One whole-file decode strategy.
pub trait TableDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    fn decode(&self, path: &Path, progress: &dyn ProgressSink) -> Result<RawTable>;
}

/// Ordered decoder chain. The default is strict first, lenient second.
pub struct DbfReader {
    decoders: Vec<Box<dyn TableDecoder>>,
}

impl Default for DbfReader {
    fn default() -> Self {
        Self::new(vec![Box::new(StrictDecoder), Box::new(LenientDecoder)])
    }
}

impl DbfReader {
    pub fn new(decoders: Vec<Box<dyn TableDecoder>>) -> Self {
        Self { decoders }
    }

    /// Read and normalize a table. Whole-file failures yield an empty dataset.
    pub fn read(&self, path: &Path, progress: &dyn ProgressSink) -> SyncDataset {
        match self.read_raw(path, progress) {
            Ok(table) => normalize_table(table),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable table, returning empty dataset");
                SyncDataset::empty()
            }
        }
    }

    /// Like [`read`](Self::read) but surfaces the last decoder error.
    pub fn read_raw(&self, path: &Path, progress: &dyn ProgressSink) -> Result<RawTable> {
        let start = Instant::now();
        let mut last_error = None;

        for decoder in &self.decoders {
            debug!(decoder = decoder.name(), path = %path.display(), "decoding table");
            match decoder.decode(path, progress) {
                Ok(table) => {
                    let count = table.records.len() as u64;
                    progress.records(
                        count,
                        &format!(
                            "Read {} records in {:.2}s",
                            format_count(count),
                            start.elapsed().as_secs_f64()
                        ),
                    );
                    info!(
                        decoder = decoder.name(),
                        path = %path.display(),
                        records = count,
                        fields = table.schema.len(),
                        "table decoded"
                    );
                    return Ok(table);
                }
                Err(e) => {
                    warn!(decoder = decoder.name(), path = %path.display(), error = %e, "decoder failed");
                    last_error = Some(e);
                }
            }
        }

        let last = last_error.unwrap_or_else(|| ReadError::header("no decoders configured"));
        Err(ReadError::Exhausted {
            path: path.to_path_buf(),
            last: Box::new(last),
        })
    }
}

/// Periodic "records read" reporting shared by the decoders.
pub(crate) struct ReadProgress<'a> {
    sink: &'a dyn ProgressSink,
    start: Instant,
    count: u64,
}

impl<'a> ReadProgress<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink) -> Self {
        Self {
            sink,
            start: Instant::now(),
            count: 0,
        }
    }

    pub(crate) fn tick(&mut self) {
        self.count += 1;
        if self.count % READ_PROGRESS_EVERY == 0 {
            let rate = rate_per_sec(self.count, self.start.elapsed());
            self.sink.records(
                self.count,
                &format!(
                    "Reading records: {} read ({:.0} records/sec)",
                    format_count(self.count),
                    rate
                ),
            );
        }
    }
}
