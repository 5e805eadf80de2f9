//! Measurement log — the append-only CSV sink both session threads share.
//!
//! This is the data artifact of a run, distinct from `tracing` diagnostics.
//! Writes are serialized through a lock so records from the pacer thread
//! and the drain thread interleave whole, never torn.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};

pub struct LogSink {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
}

impl LogSink {
    /// Create (truncating) the log file at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        let file =
            File::create(path).with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
        }
    }

    /// Append one record.
    pub fn record(&self, line: &str) -> std::io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|e| e.into_inner());
        writeln!(writer, "{line}")
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .flush()
    }
}
