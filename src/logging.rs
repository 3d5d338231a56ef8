//! The conversion log: an append-only text file of every diagnostic line.
//!
//! Render tasks run concurrently and each reports renderer stdout/stderr
//! blocks that must not interleave in the file. [`ConversionLog`] owns the
//! file behind a single [`Mutex`]; every line is written under that lock and
//! mirrored to `tracing` so the same events reach the terminal.
//!
//! Create one log at startup, share it as `Arc<ConversionLog>` through
//! [`crate::config::ConversionConfig`], and call [`ConversionLog::flush`]
//! when the conversion ends.

use crate::error::Md2PdfError;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{error, info, warn};

/// Severity of a log line. Only affects the `tracing` mirror; the file
/// receives every line verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Thread-safe conversion log sink.
pub struct ConversionLog {
    path: Option<PathBuf>,
    sink: Mutex<Option<BufWriter<File>>>,
}

impl fmt::Debug for ConversionLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionLog")
            .field("path", &self.path)
            .finish()
    }
}

impl Default for ConversionLog {
    fn default() -> Self {
        Self::disabled()
    }
}

impl ConversionLog {
    /// Open `path` for writing, truncating any previous run's log.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, Md2PdfError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Md2PdfError::LogOpenFailed {
                path: path.clone(),
                source: e,
            })?;
        }
        let file = File::create(&path).map_err(|e| Md2PdfError::LogOpenFailed {
            path: path.clone(),
            source: e,
        })?;
        Ok(Self {
            path: Some(path),
            sink: Mutex::new(Some(BufWriter::new(file))),
        })
    }

    /// A log that only mirrors to `tracing` and writes no file.
    pub fn disabled() -> Self {
        Self {
            path: None,
            sink: Mutex::new(None),
        }
    }

    /// Path of the backing file, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Write one (possibly multi-line) entry.
    ///
    /// The lock is held across both the file write and the tracing mirror so
    /// that concurrent entries appear in the same order on both sinks.
    pub fn record(&self, level: LogLevel, message: impl AsRef<str>) {
        let message = message.as_ref();
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);

        match level {
            LogLevel::Info => info!("{}", message),
            LogLevel::Warn => warn!("{}", message),
            LogLevel::Error => error!("{}", message),
        }

        if let Some(w) = guard.as_mut() {
            // A failing log write must never fail the conversion.
            let _ = writeln!(w, "{message}");
        }
    }

    pub fn info(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl AsRef<str>) {
        self.record(LogLevel::Error, message);
    }

    /// Record captured process output, skipping streams that are blank.
    pub fn record_output(&self, stdout: &str, stderr: &str) {
        if !stdout.trim().is_empty() {
            self.info(stdout);
        }
        if !stderr.trim().is_empty() {
            self.warn(stderr);
        }
    }

    /// Flush buffered lines to disk.
    pub fn flush(&self) -> std::io::Result<()> {
        let mut guard = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(w) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for ConversionLog {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
