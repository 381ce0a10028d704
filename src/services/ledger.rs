use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum number of entries a ledger holds after any append.
pub const LEDGER_CAPACITY: usize = 500;

/// Number of oldest entries dropped at once when the capacity is exceeded.
pub const EVICTION_BATCH: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Match,
    Email,
    Error,
    Heartbeat,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Match => "match",
            Self::Email => "email",
            Self::Error => "error",
            Self::Heartbeat => "heartbeat",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogEntry {
    pub ts: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded, append-only event history for one monitor.
///
/// Entries are kept in insertion order. Once the length goes past
/// [`LEDGER_CAPACITY`] the oldest [`EVICTION_BATCH`] entries are removed in a
/// single drain, so the cost of eviction is paid once per hundred appends.
#[derive(Debug, Default)]
pub struct LogLedger {
    entries: Vec<LogEntry>,
}

impl LogLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, level: LogLevel, message: impl Into<String>) {
        self.push_entry(LogEntry {
            ts: Utc::now(),
            level,
            message: message.into(),
        });
    }

    pub(crate) fn push_entry(&mut self, entry: LogEntry) {
        // Clamp to the last entry so timestamps never go backwards
        let ts = match self.entries.last() {
            Some(last) if last.ts > entry.ts => last.ts,
            _ => entry.ts,
        };
        self.entries.push(LogEntry { ts, ..entry });

        if self.entries.len() > LEDGER_CAPACITY {
            self.entries.drain(..EVICTION_BATCH);
        }
    }

    /// Most recent `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let start = self.entries.len().saturating_sub(limit);
        self.entries[start..].to_vec()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.len()
    }
}
