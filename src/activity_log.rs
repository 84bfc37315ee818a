use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Local, TimeZone, Timelike};

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub at: DateTime<Local>,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", format_log_time(&self.at), self.message)
    }
}

/// Newest-first activity log.
///
/// Entries are only ever prepended. With a capacity set, the oldest entries
/// fall off the back once the log is full; without one it grows unbounded.
#[derive(Debug, Default)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: Option<usize>,
}

impl ActivityLog {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.filter(|limit| *limit > 0),
        }
    }

    pub fn push(&mut self, message: impl Into<String>) -> LogEntry {
        self.push_at(Local::now(), message)
    }

    pub fn push_at(&mut self, at: DateTime<Local>, message: impl Into<String>) -> LogEntry {
        let entry = LogEntry {
            at,
            message: message.into(),
        };
        self.entries.push_front(entry.clone());
        if let Some(limit) = self.capacity {
            self.entries.truncate(limit);
        }
        entry
    }

    /// Entries newest first.
    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }
}

/// `HH:MM:SS.mmm`, zero padded.
pub fn format_log_time<Tz: TimeZone>(at: &DateTime<Tz>) -> String {
    // Leap seconds report 1000+ subsecond millis.
    let millis = at.timestamp_subsec_millis().min(999);
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        at.hour(),
        at.minute(),
        at.second(),
        millis
    )
}
