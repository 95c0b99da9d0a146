//! Client side of the streaming endpoint.
//!
//! `StreamClient` keeps one WebSocket connection open to the server,
//! reconnecting after a fixed delay whenever it drops. `log` messages are
//! pushed into a `BatchBuffer`; every other server message is published on a
//! watch channel as the last control message.

use super::batch_buffer::BatchBuffer;
use crate::protocol::{ClientRequest, StreamMessage};
use futures::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Not connected to the stream server")]
    NotConnected,

    #[error("Failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed,
}

/// Anything that can carry a request to the stream server.
pub trait RequestSink {
    fn send_request(&self, request: &ClientRequest) -> Result<(), TransportError>;
}

type OutboundSlot = Arc<Mutex<Option<mpsc::UnboundedSender<String>>>>;

fn lock_slot(slot: &OutboundSlot) -> MutexGuard<'_, Option<mpsc::UnboundedSender<String>>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Auto-reconnecting connection to the streaming endpoint.
///
/// Dropping the client cancels any pending reconnect and closes the socket.
pub struct StreamClient {
    state: watch::Receiver<ConnectionState>,
    control: watch::Receiver<Option<StreamMessage>>,
    outbound: OutboundSlot,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamClient {
    /// Spawn the connection task. Must be called inside a Tokio runtime.
    pub fn connect(url: impl Into<String>, reconnect_delay: Duration, buffer: BatchBuffer) -> Self {
        let (state_tx, state) = watch::channel(ConnectionState::Connecting);
        let (control_tx, control) = watch::channel(None);
        let outbound: OutboundSlot = Arc::new(Mutex::new(None));
        let shutdown = CancellationToken::new();

        let connection = Connection {
            url: url.into(),
            reconnect_delay,
            buffer,
            state_tx,
            control_tx,
            outbound: outbound.clone(),
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(connection.run());

        Self {
            state,
            control,
            outbound,
            shutdown,
            task: Some(task),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        lock_slot(&self.outbound).is_some()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn subscribe_control(&self) -> watch::Receiver<Option<StreamMessage>> {
        self.control.clone()
    }

    /// Send a request if the connection is open. Requests made while
    /// disconnected are dropped, not queued.
    pub fn send(&self, request: &ClientRequest) -> Result<(), TransportError> {
        let text = request.to_json()?;
        let slot = lock_slot(&self.outbound);
        match slot.as_ref() {
            Some(tx) if tx.send(text).is_ok() => Ok(()),
            _ => {
                warn!(?request, "Stream connection not open, dropping request");
                Err(TransportError::NotConnected)
            }
        }
    }

    /// Cancel reconnects, close the socket and wait for the task to finish.
    pub async fn close(mut self) {
        self.shutdown.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl RequestSink for StreamClient {
    fn send_request(&self, request: &ClientRequest) -> Result<(), TransportError> {
        self.send(request)
    }
}

impl Drop for StreamClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Route one inbound text frame: logs into the batch buffer, everything
/// else to the control channel. Malformed frames are dropped.
pub fn route_inbound(
    text: &str,
    buffer: &BatchBuffer,
    control_tx: &watch::Sender<Option<StreamMessage>>,
) {
    match StreamMessage::from_json(text) {
        Ok(StreamMessage::Log(message)) => buffer.push(message),
        Ok(control) => {
            debug!(?control, "Control message received");
            control_tx.send_replace(Some(control));
        }
        Err(e) => warn!(error = %e, "Discarding malformed server message"),
    }
}

struct Connection {
    url: String,
    reconnect_delay: Duration,
    buffer: BatchBuffer,
    state_tx: watch::Sender<ConnectionState>,
    control_tx: watch::Sender<Option<StreamMessage>>,
    outbound: OutboundSlot,
    shutdown: CancellationToken,
}

enum SessionEnd {
    Shutdown,
    Dropped,
}

impl Connection {
    async fn run(self) {
        loop {
            self.state_tx.send_replace(ConnectionState::Connecting);

            let attempt = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = connect_async(self.url.as_str()) => result,
            };

            match attempt {
                Ok((socket, _)) => {
                    info!(url = %self.url, "Connected to stream server");
                    let (tx, rx) = mpsc::unbounded_channel();
                    *lock_slot(&self.outbound) = Some(tx);
                    self.state_tx.send_replace(ConnectionState::Open);

                    let end = self.drive(socket, rx).await;

                    *lock_slot(&self.outbound) = None;
                    self.state_tx.send_replace(ConnectionState::Closed);
                    if matches!(end, SessionEnd::Shutdown) {
                        break;
                    }
                    info!("Stream connection closed");
                }
                Err(e) => {
                    self.state_tx.send_replace(ConnectionState::Closed);
                    warn!(url = %self.url, error = %e, "Failed to connect to stream server");
                }
            }

            info!(
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "Reconnecting to stream server"
            );
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.reconnect_delay) => {}
            }
        }

        self.state_tx.send_replace(ConnectionState::Closed);
        debug!("Stream client stopped");
    }

    async fn drive(
        &self,
        socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
        mut outbound: mpsc::UnboundedReceiver<String>,
    ) -> SessionEnd {
        let (mut ws_tx, mut ws_rx) = socket.split();

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    return SessionEnd::Shutdown;
                }

                Some(text) = outbound.recv() => {
                    if let Err(e) = ws_tx.send(Message::Text(text)).await {
                        warn!(error = %e, "Failed to send request");
                        return SessionEnd::Dropped;
                    }
                }

                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        route_inbound(&text, &self.buffer, &self.control_tx);
                    }
                    Some(Ok(Message::Close(_))) | None => return SessionEnd::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "Stream connection error");
                        return SessionEnd::Dropped;
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::batch_buffer::DEFAULT_FLUSH_INTERVAL;

    #[tokio::test]
    async fn test_route_inbound_splits_logs_and_control() {
        let (buffer, _rx) = BatchBuffer::new(DEFAULT_FLUSH_INTERVAL);
        let (control_tx, control_rx) = watch::channel(None);

        route_inbound(
            r#"{"type":"log","data":"hello","containerId":"c1"}"#,
            &buffer,
            &control_tx,
        );
        assert_eq!(buffer.pending_len(), 1);
        assert!(control_rx.borrow().is_none());

        route_inbound(r#"{"type":"started","containerId":"c1"}"#, &buffer, &control_tx);
        assert_eq!(
            *control_rx.borrow(),
            Some(StreamMessage::Started {
                container_id: "c1".into()
            })
        );
        assert_eq!(buffer.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_route_inbound_drops_malformed() {
        let (buffer, _rx) = BatchBuffer::new(DEFAULT_FLUSH_INTERVAL);
        let (control_tx, control_rx) = watch::channel(None);

        route_inbound("not json", &buffer, &control_tx);
        route_inbound(r#"{"type":"log","data":"no tag"}"#, &buffer, &control_tx);
        route_inbound(r#"{"type":"mystery"}"#, &buffer, &control_tx);

        assert_eq!(buffer.pending_len(), 0);
        assert!(control_rx.borrow().is_none());
    }

    #[tokio::test]
    async fn test_send_while_disconnected_is_dropped() {
        let (buffer, _rx) = BatchBuffer::new(DEFAULT_FLUSH_INTERVAL);
        // Nothing listens on port 9 locally
        let client = StreamClient::connect(
            "ws://127.0.0.1:9/ws",
            Duration::from_millis(50),
            buffer,
        );

        let result = client.send(&ClientRequest::Stop);
        assert!(matches!(result, Err(TransportError::NotConnected)));
        assert!(!client.is_open());

        client.close().await;
    }

    #[tokio::test]
    async fn test_close_stops_reconnect_loop() {
        let (buffer, _rx) = BatchBuffer::new(DEFAULT_FLUSH_INTERVAL);
        let client = StreamClient::connect(
            "ws://127.0.0.1:9/ws",
            Duration::from_secs(60),
            buffer,
        );
        let state = client.subscribe_state();

        tokio::time::timeout(Duration::from_secs(5), client.close())
            .await
            .expect("close should not wait for the reconnect delay");
        assert_eq!(*state.borrow(), ConnectionState::Closed);
    }
}
