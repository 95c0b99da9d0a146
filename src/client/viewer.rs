use super::batch_buffer::{BatchBuffer, BatchSnapshot};
use super::log_stream::{LogEntry, LogStream};
use super::transport::{RequestSink, TransportError};
use crate::protocol::{ClientRequest, StreamMessage};
use tracing::{debug, info};

/// What the viewer is currently observing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    pub container_id: String,
    pub filter: Option<String>,
}

impl Subject {
    pub fn new(container_id: impl Into<String>, filter: Option<String>) -> Self {
        Self {
            container_id: container_id.into(),
            filter: filter.filter(|f| !f.is_empty()),
        }
    }

    fn start_request(&self, tail: Option<u32>) -> ClientRequest {
        ClientRequest::start(self.container_id.clone(), self.filter.clone(), tail)
    }
}

/// Status derived from the last control message.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming(String),
    Ended(String),
    Failed(String),
    Stopped,
}

/// Client-side session: ties the batch buffer, the log stream state and the
/// outbound request path together so a subject switch never shows data from
/// the subject it replaced.
pub struct Viewer<S> {
    sink: S,
    buffer: BatchBuffer,
    logs: LogStream,
    subject: Option<Subject>,
    tail: Option<u32>,
    status: StreamStatus,
}

impl<S: RequestSink> Viewer<S> {
    pub fn new(sink: S, buffer: BatchBuffer, logs: LogStream) -> Self {
        Self {
            sink,
            buffer,
            logs,
            subject: None,
            tail: None,
            status: StreamStatus::Idle,
        }
    }

    /// Number of history lines requested with every start.
    pub fn set_tail(&mut self, tail: Option<u32>) {
        self.tail = tail;
    }

    /// Switch to another container. Any filter from the previous container
    /// is discarded.
    pub fn select_container(&mut self, container_id: impl Into<String>) -> Result<(), TransportError> {
        self.switch_subject(Subject::new(container_id, None))
    }

    /// Change the filter of the current container. No-op without a selection.
    pub fn set_filter(&mut self, filter: Option<String>) -> Result<(), TransportError> {
        let Some(current) = &self.subject else {
            return Ok(());
        };
        let next = Subject::new(current.container_id.clone(), filter);
        self.switch_subject(next)
    }

    /// Clear every local trace of the previous subject, then ask the server
    /// for the new one.
    pub fn switch_subject(&mut self, subject: Subject) -> Result<(), TransportError> {
        info!(
            container_id = %subject.container_id,
            filter = ?subject.filter,
            "Switching log subject"
        );
        self.buffer.clear_buffer();
        self.logs.clear_logs();
        self.logs.select_container(Some(subject.container_id.clone()));

        let request = subject.start_request(self.tail);
        self.subject = Some(subject);
        self.sink.send_request(&request)
    }

    /// Re-issue the start request for the current subject, e.g. after the
    /// transport reconnected. Starts from a clean list since the server
    /// replays history again.
    pub fn resubscribe(&mut self) -> Result<(), TransportError> {
        match self.subject.clone() {
            Some(subject) => self.switch_subject(subject),
            None => Ok(()),
        }
    }

    /// Stop streaming and drop the selection.
    pub fn clear_selection(&mut self) -> Result<(), TransportError> {
        self.buffer.clear_buffer();
        self.logs.clear_logs();
        self.logs.select_container(None);
        self.subject = None;
        self.sink.send_request(&ClientRequest::Stop)
    }

    /// Apply a flushed batch to the retained list. Returns the number of
    /// entries appended.
    pub fn apply_batch(&mut self, snapshot: &BatchSnapshot) -> Vec<LogEntry> {
        self.logs.apply_batch(snapshot)
    }

    pub fn handle_control(&mut self, message: &StreamMessage) {
        debug!(?message, "Applying control message");
        self.status = match message {
            StreamMessage::Started { container_id } => StreamStatus::Streaming(container_id.clone()),
            StreamMessage::End { message } => StreamStatus::Ended(message.clone()),
            StreamMessage::Error { message } => StreamStatus::Failed(message.clone()),
            StreamMessage::Stopped => StreamStatus::Stopped,
            StreamMessage::Log(_) => return,
        };
    }

    pub fn subject(&self) -> Option<&Subject> {
        self.subject.as_ref()
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn logs(&self) -> &LogStream {
        &self.logs
    }

    pub fn logs_mut(&mut self) -> &mut LogStream {
        &mut self.logs
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}
