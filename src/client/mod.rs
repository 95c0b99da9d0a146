//! Client side of the log stream: transport, batching and the retained
//! log list, plus the viewer that sequences a subject switch.

pub mod batch_buffer;
pub mod log_stream;
pub mod transport;
pub mod viewer;

pub use batch_buffer::{BatchBuffer, BatchReceiver, BatchSnapshot};
pub use log_stream::{parse_max_logs, LogEntry, LogStream, MaxLogsError};
pub use transport::{ConnectionState, RequestSink, StreamClient, TransportError};
pub use viewer::{StreamStatus, Subject, Viewer};
