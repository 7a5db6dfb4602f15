//! Execution context for pipeline runs
//!
//! Contains all state shared by the stages of one run:
//! - Log buffer for collecting run logs
//! - Cancellation token checked between steps

use hoist_core::domain::log::{LogEntry, LogLevel};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Execution context shared across one pipeline run
pub struct RunContext {
    run_id: Uuid,

    /// Log buffer with entries
    log_buffer: Mutex<Vec<LogEntry>>,

    cancel: CancellationToken,
}

impl RunContext {
    /// Creates a new execution context
    pub fn new(run_id: Uuid) -> Arc<Self> {
        Self::with_cancellation(run_id, CancellationToken::new())
    }

    /// Creates a context that observes an externally owned cancellation token
    pub fn with_cancellation(run_id: Uuid, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            run_id,
            log_buffer: Mutex::new(Vec::new()),
            cancel,
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Adds a log entry to the buffer
    pub fn add_log(&self, entry: LogEntry) {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push(entry);
    }

    /// Logs a debug message
    pub fn log_debug(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Debug, message));
    }

    /// Logs an info message
    pub fn log_info(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Info, message));
    }

    /// Logs a warning message
    pub fn log_warning(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Warning, message));
    }

    /// Logs an error message
    pub fn log_error(&self, message: impl Into<String>) {
        self.add_log(LogEntry::now(LogLevel::Error, message));
    }

    /// Logs each non-empty line of a command's output at the given level
    pub fn log_output(&self, level: LogLevel, output: &str) {
        for line in output.lines().map(str::trim_end).filter(|l| !l.trim().is_empty()) {
            self.add_log(LogEntry::now(level, line));
        }
    }

    /// Drains all log entries from the buffer
    ///
    /// Returns all buffered entries and clears the buffer
    pub fn drain_logs(&self) -> Vec<LogEntry> {
        let mut buffer = self.log_buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.drain(..).collect()
    }

    /// Requests cancellation; honoured before the next step starts
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
