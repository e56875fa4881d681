use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogStream {
    Stdout,
    Stderr,
    /// Lines written by the supervisor itself (preparation results, exits).
    Supervisor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub stream: LogStream,
    pub line: String,
}

impl LogEntry {
    pub fn new(stream: LogStream, line: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream,
            line: line.into(),
        }
    }
}

/// Rolling window of recent engine output. Oldest entries are evicted once
/// `capacity` is reached.
#[derive(Debug)]
pub struct LogBuffer {
    capacity: usize,
    entries: VecDeque<LogEntry>,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, entry: LogEntry) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Copy of the current window, oldest first.
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    /// Last `n` lines written to `stream`, oldest first.
    pub fn tail_of(&self, stream: LogStream, n: usize) -> Vec<String> {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .rev()
            .filter(|e| e.stream == stream)
            .take(n)
            .map(|e| e.line.clone())
            .collect();
        lines.reverse();
        lines
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest() {
        let mut buf = LogBuffer::new(3);
        for i in 0..5 {
            buf.push(LogEntry::new(LogStream::Stdout, format!("line {}", i)));
        }
        let lines: Vec<String> = buf.snapshot().into_iter().map(|e| e.line).collect();
        assert_eq!(lines, vec!["line 2", "line 3", "line 4"]);
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut buf = LogBuffer::new(10);
        buf.push(LogEntry::new(LogStream::Stdout, "a"));
        let snap = buf.snapshot();
        buf.push(LogEntry::new(LogStream::Stdout, "b"));
        assert_eq!(snap.len(), 1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_tail_of_stream() {
        let mut buf = LogBuffer::new(10);
        buf.push(LogEntry::new(LogStream::Stderr, "e1"));
        buf.push(LogEntry::new(LogStream::Stdout, "o1"));
        buf.push(LogEntry::new(LogStream::Stderr, "e2"));
        buf.push(LogEntry::new(LogStream::Stderr, "e3"));
        assert_eq!(buf.tail_of(LogStream::Stderr, 2), vec!["e2", "e3"]);
        assert_eq!(buf.tail_of(LogStream::Stdout, 5), vec!["o1"]);
    }
}
