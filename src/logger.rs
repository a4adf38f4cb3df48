use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Number of entries retained in the in-memory log buffer
const LOG_BUFFER_CAPACITY: usize = 1000;

/// Log level enum for type-safe logging
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }
}

/// Log entry with an optional structured context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
    /// Subsystem tag, e.g. "pipeline::hash" or "jobs"
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<HashMap<String, serde_json::Value>>,
}

/// Selects entries from the in-memory buffer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogFilter {
    pub min_level: Option<LogLevel>,
    /// Matches `source` by prefix, so "pipeline" also selects "pipeline::hash"
    pub source: Option<String>,
    /// Entry context must hold this key with exactly this value
    pub context: Option<(String, serde_json::Value)>,
    /// Keep only the newest `limit` matches
    pub limit: Option<usize>,
}

impl LogFilter {
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = Some(level);
        self
    }

    pub fn source(mut self, prefix: impl Into<String>) -> Self {
        self.source = Some(prefix.into());
        self
    }

    pub fn context(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.context = Some((key.into(), value));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, entry: &LogEntry) -> bool {
        if let Some(level) = self.min_level {
            if entry.level < level {
                return false;
            }
        }
        if let Some(prefix) = &self.source {
            if !entry.source.starts_with(prefix.as_str()) {
                return false;
            }
        }
        if let Some((key, value)) = &self.context {
            let found = entry.context.as_ref().and_then(|context| context.get(key));
            if found != Some(value) {
                return false;
            }
        }
        true
    }
}

/// Bounded ring of recent entries, oldest first
struct LogBuffer {
    entries: VecDeque<LogEntry>,
    capacity: usize,
}

impl LogBuffer {
    fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    fn push(&mut self, entry: LogEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let mut matched: Vec<LogEntry> = self
            .entries
            .iter()
            .filter(|entry| filter.matches(entry))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            let excess = matched.len().saturating_sub(limit);
            matched.drain(..excess);
        }
        matched
    }

    fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Commands for the logger thread
enum LogCommand {
    Log(LogEntry),
    Query(LogFilter, Sender<Vec<LogEntry>>),
    Clear,
}

pub struct Logger {
    sender: Sender<LogCommand>,
    min_level: Arc<AtomicU8>,
}

impl Logger {
    pub fn new() -> Self {
        let (sender, receiver) = bounded(LOG_BUFFER_CAPACITY);
        let min_level = Arc::new(AtomicU8::new(LogLevel::Debug as u8));

        // Spawn background thread to handle logs
        std::thread::spawn(move || {
            Self::logger_thread(receiver);
        });

        Self { sender, min_level }
    }

    /// Background thread that manages the log buffer
    fn logger_thread(receiver: Receiver<LogCommand>) {
        let mut buffer = LogBuffer::new(LOG_BUFFER_CAPACITY);

        for cmd in receiver {
            match cmd {
                LogCommand::Log(entry) => {
                    buffer.push(entry);
                }
                LogCommand::Query(filter, response_tx) => {
                    let _ = response_tx.send(buffer.query(&filter));
                }
                LogCommand::Clear => {
                    buffer.clear();
                }
            }
        }
    }

    fn enabled(&self, level: LogLevel) -> bool {
        (level as u8) >= self.min_level.load(Ordering::Relaxed)
    }

    /// Record an entry in the buffer and mirror it to `tracing` (non-blocking)
    pub fn log(&self, level: LogLevel, message: &str, source: &'static str) {
        self.push(level, message, source, None);
    }

    /// Log with context (structured logging)
    pub fn log_with_context(
        &self,
        level: LogLevel,
        message: &str,
        source: &'static str,
        context: HashMap<String, serde_json::Value>,
    ) {
        self.push(level, message, source, Some(context));
    }

    fn push(
        &self,
        level: LogLevel,
        message: &str,
        source: &'static str,
        context: Option<HashMap<String, serde_json::Value>>,
    ) {
        if !self.enabled(level) {
            return;
        }

        match level {
            LogLevel::Error => tracing::error!(target: "hemlock", source, "{}", message),
            LogLevel::Warn => tracing::warn!(target: "hemlock", source, "{}", message),
            LogLevel::Info => tracing::info!(target: "hemlock", source, "{}", message),
            LogLevel::Debug => tracing::debug!(target: "hemlock", source, "{}", message),
        }

        let entry = LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            source: source.to_string(),
            context,
        };

        // Drops the entry if the channel is full
        let _ = self.sender.try_send(LogCommand::Log(entry));
    }

    /// Set minimum log level (runtime filtering)
    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level as u8, Ordering::Relaxed);
    }

    /// Get current minimum log level
    pub fn get_min_level(&self) -> LogLevel {
        match self.min_level.load(Ordering::Relaxed) {
            0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            3 => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }

    /// Buffered entries matching `filter`, oldest first.
    ///
    /// The query is queued behind every entry already sent, so a caller sees
    /// everything logged before it asked.
    pub fn query(&self, filter: &LogFilter) -> Vec<LogEntry> {
        let (response_tx, response_rx) = bounded(1);
        if self
            .sender
            .send(LogCommand::Query(filter.clone(), response_tx))
            .is_ok()
        {
            response_rx.recv().unwrap_or_default()
        } else {
            Vec::new()
        }
    }

    pub fn get_logs(&self) -> Vec<LogEntry> {
        self.query(&LogFilter::default())
    }

    pub fn clear_logs(&self) {
        let _ = self.sender.send(LogCommand::Clear);
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

// Global logger instance
lazy_static::lazy_static! {
    pub static ref LOGGER: Logger = Logger::new();
}

/// Install a `tracing-subscriber` fmt subscriber honoring `RUST_LOG`.
///
/// For embedding binaries; the library never installs a subscriber itself.
/// Falls back to `default_level` when `RUST_LOG` is unset. Returns `false`
/// if a global subscriber was already installed.
pub fn init_tracing(default_level: LogLevel) -> bool {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level.as_str()));

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok();

    LOGGER.set_min_level(default_level);
    installed
}

/// Log through [`LOGGER`] with `format!` arguments and the `hemlock` source tag
#[macro_export]
macro_rules! app_log {
    ($level:expr, $($arg:tt)*) => {
        {
            let message = format!($($arg)*);
            $crate::logger::LOGGER.log($level, &message, "hemlock");
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(level: LogLevel, source: &str, message: &str) -> LogEntry {
        LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.to_string(),
            source: source.to_string(),
            context: None,
        }
    }

    #[test]
    fn test_buffer_drops_oldest_when_full() {
        let mut buffer = LogBuffer::new(3);
        for i in 0..5 {
            buffer.push(entry(LogLevel::Info, "test", &format!("msg-{}", i)));
        }

        let messages: Vec<String> = buffer
            .query(&LogFilter::default())
            .into_iter()
            .map(|e| e.message)
            .collect();
        assert_eq!(messages, vec!["msg-2", "msg-3", "msg-4"]);

        buffer.clear();
        assert!(buffer.query(&LogFilter::default()).is_empty());
    }

    #[test]
    fn test_filter_by_level_source_and_limit() {
        let mut buffer = LogBuffer::new(10);
        buffer.push(entry(LogLevel::Debug, "pipeline::hash", "hashing"));
        buffer.push(entry(LogLevel::Warn, "pipeline::sign", "slow signer"));
        buffer.push(entry(LogLevel::Error, "jobs", "job failed"));
        buffer.push(entry(LogLevel::Error, "pipeline::save", "disk full"));

        let pipeline = buffer.query(&LogFilter::default().source("pipeline"));
        assert_eq!(pipeline.len(), 3);

        let errors = buffer.query(&LogFilter::default().min_level(LogLevel::Warn).source("pipeline"));
        let messages: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["slow signer", "disk full"]);

        let newest = buffer.query(&LogFilter::default().limit(1));
        assert_eq!(newest[0].message, "disk full");
    }

    #[test]
    fn test_filter_by_context_value() {
        let mut tagged = entry(LogLevel::Info, "jobs", "job done");
        let mut context = HashMap::new();
        context.insert("job_id".to_string(), serde_json::json!("abc"));
        tagged.context = Some(context);

        let filter = LogFilter::default().context("job_id", serde_json::json!("abc"));
        assert!(filter.matches(&tagged));
        assert!(!filter.matches(&entry(LogLevel::Info, "jobs", "untagged")));

        let other = LogFilter::default().context("job_id", serde_json::json!("xyz"));
        assert!(!other.matches(&tagged));
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!(LogLevel::parse("WARN"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("verbose"), None);
    }

    #[test]
    fn test_logger_min_level_filters_entries() {
        let logger = Logger::new();
        logger.set_min_level(LogLevel::Warn);
        assert_eq!(logger.get_min_level(), LogLevel::Warn);

        logger.log(LogLevel::Info, "filtered out", "test");
        logger.log(LogLevel::Error, "kept", "test");

        let logs = logger.get_logs();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "kept");
        assert_eq!(logs[0].source, "test");
    }

    #[test]
    fn test_logger_query_sees_prior_entries() {
        let logger = Logger::new();
        let mut context = HashMap::new();
        context.insert("job_id".to_string(), serde_json::json!("abc"));
        logger.log_with_context(LogLevel::Info, "job submitted", "jobs", context);
        logger.log(LogLevel::Info, "unrelated", "engine");

        let logs = logger.query(&LogFilter::default().context("job_id", serde_json::json!("abc")));
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].message, "job submitted");

        logger.clear_logs();
        assert!(logger.get_logs().is_empty());
    }
}
