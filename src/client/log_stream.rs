use super::batch_buffer::BatchSnapshot;
use crate::config::types::MAX_LOGS_LIMIT;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use thiserror::Error;

/// One displayed log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MaxLogsError {
    #[error("Required")]
    Required,

    #[error("Invalid number")]
    InvalidNumber,

    #[error("Must be 0~1000")]
    OutOfRange,
}

/// Validate free-text input for the retention bound.
pub fn parse_max_logs(raw: &str) -> Result<usize, MaxLogsError> {
    if raw.is_empty() {
        return Err(MaxLogsError::Required);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MaxLogsError::InvalidNumber);
    }
    // All digits, so a parse failure can only be overflow
    match raw.parse::<usize>() {
        Ok(n) if n <= MAX_LOGS_LIMIT => Ok(n),
        _ => Err(MaxLogsError::OutOfRange),
    }
}

/// The retained log list plus the inputs that decide what gets into it:
/// the selected container, the streaming toggle and the retention bound.
#[derive(Debug, Clone)]
pub struct LogStream {
    entries: VecDeque<LogEntry>,
    max_logs: usize,
    max_logs_input: String,
    max_logs_error: Option<MaxLogsError>,
    streaming: bool,
    selected_container: Option<String>,
}

impl LogStream {
    /// `max_logs` of 0 keeps every entry.
    pub fn new(max_logs: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_logs,
            max_logs_input: max_logs.to_string(),
            max_logs_error: None,
            streaming: true,
            selected_container: None,
        }
    }

    pub fn select_container(&mut self, container_id: Option<String>) {
        self.selected_container = container_id;
    }

    pub fn selected_container(&self) -> Option<&str> {
        self.selected_container.as_deref()
    }

    /// Apply a batch stamped with the current time. Returns the entries it
    /// accepted, including any the retention bound has already evicted.
    pub fn apply_batch(&mut self, snapshot: &BatchSnapshot) -> Vec<LogEntry> {
        self.apply_batch_at(snapshot, Utc::now())
    }

    pub fn apply_batch_at(
        &mut self,
        snapshot: &BatchSnapshot,
        captured_at: DateTime<Utc>,
    ) -> Vec<LogEntry> {
        if snapshot.is_empty() || !self.streaming {
            return Vec::new();
        }
        let Some(selected) = self.selected_container.as_deref() else {
            return Vec::new();
        };

        // Messages from a previous subject can still reach a batch; the
        // origin tag is the last line of defence against them.
        let accepted: Vec<LogEntry> = snapshot
            .messages()
            .iter()
            .filter(|m| m.container_id == selected && !m.data.is_empty())
            .map(|m| LogEntry {
                timestamp: captured_at,
                text: m.data.clone(),
            })
            .collect();
        self.entries.extend(accepted.iter().cloned());

        if self.max_logs > 0 && self.entries.len() > self.max_logs {
            let excess = self.entries.len() - self.max_logs;
            self.entries.drain(..excess);
        }

        accepted
    }

    /// Validate `raw` and commit it as the retention bound if it is valid.
    ///
    /// The raw text is always kept for display. On error the previously
    /// committed bound stays in effect.
    pub fn handle_max_logs_change(&mut self, raw: &str) -> Result<(), MaxLogsError> {
        self.max_logs_input = raw.to_string();
        match parse_max_logs(raw) {
            Ok(bound) => {
                self.max_logs = bound;
                self.max_logs_error = None;
                Ok(())
            }
            Err(e) => {
                self.max_logs_error = Some(e);
                Err(e)
            }
        }
    }

    pub fn clear_logs(&mut self) {
        self.entries.clear();
    }

    pub fn set_streaming(&mut self, enabled: bool) {
        self.streaming = enabled;
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn entries(&self) -> &VecDeque<LogEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_logs(&self) -> usize {
        self.max_logs
    }

    pub fn max_logs_input(&self) -> &str {
        &self.max_logs_input
    }

    pub fn max_logs_error(&self) -> Option<MaxLogsError> {
        self.max_logs_error
    }
}

impl Default for LogStream {
    fn default() -> Self {
        Self::new(MAX_LOGS_LIMIT)
    }
}
