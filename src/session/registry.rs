use super::dispatch::{run_dispatch, DispatchContext};
use crate::protocol::{ClientRequest, StartRequest, StreamMessage};
use crate::runtime::{LogSource, TailRequest};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Log messages a connection may have queued but not yet written out.
pub const LOG_BACKLOG: usize = 1024;

/// A message queued for one connection.
///
/// Log messages carry a backlog slot that is released when the socket
/// writer drops the item; control messages are never held back.
#[derive(Debug)]
pub struct Outbound {
    pub message: StreamMessage,
    _slot: Option<OwnedSemaphorePermit>,
}

impl Outbound {
    pub(crate) fn control(message: StreamMessage) -> Self {
        Self {
            message,
            _slot: None,
        }
    }

    pub(crate) fn log(message: StreamMessage, slot: OwnedSemaphorePermit) -> Self {
        Self {
            message,
            _slot: Some(slot),
        }
    }
}

pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// The tail currently registered for a connection.
#[derive(Debug)]
struct ActiveTail {
    /// Unique per spawned tail; lets a process exit tell "I was replaced"
    /// apart from "I am still the current tail and I died"
    generation: u64,
    container_id: String,
    terminator: CancellationToken,
}

#[derive(Debug)]
struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    backlog: Arc<Semaphore>,
    tail: Option<ActiveTail>,
}

/// Maps each live client connection to at most one running tail.
///
/// Every mutation happens inside a single lock acquisition, so a stop caused
/// by a new start and a stop caused by the process's own exit can interleave
/// in any order without double-deregistering.
pub struct SessionRegistry {
    source: Arc<dyn LogSource>,
    default_tail: u32,
    log_backlog: usize,
    connections: Mutex<HashMap<ConnectionId, Connection>>,
    next_generation: AtomicU64,
}

impl SessionRegistry {
    pub fn new(source: Arc<dyn LogSource>, default_tail: u32) -> Self {
        Self {
            source,
            default_tail,
            log_backlog: LOG_BACKLOG,
            connections: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// Override how many log messages a slow connection may have queued
    /// before its tails wait for the socket to catch up.
    pub fn with_log_backlog(mut self, log_backlog: usize) -> Self {
        self.log_backlog = log_backlog.max(1);
        self
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a new connection and return the queue of messages to write to it.
    pub fn connect(&self) -> (ConnectionId, OutboundReceiver) {
        let id = Uuid::new_v4();
        let (outbound, receiver) = mpsc::unbounded_channel();
        let connection = Connection {
            outbound,
            backlog: Arc::new(Semaphore::new(self.log_backlog)),
            tail: None,
        };
        self.lock().insert(id, connection);
        info!(connection_id = %id, "Client connected");
        (id, receiver)
    }

    /// Forget a connection, terminating its tail if one is running.
    pub fn disconnect(&self, id: ConnectionId) {
        let removed = self.lock().remove(&id);
        match removed {
            Some(connection) => {
                // Wakes dispatch tasks waiting for a backlog slot
                connection.backlog.close();
                if let Some(tail) = connection.tail {
                    tail.terminator.cancel();
                    info!(
                        connection_id = %id,
                        container_id = %tail.container_id,
                        "Stopped tail of closed connection"
                    );
                }
                info!(connection_id = %id, "Client disconnected");
            }
            None => debug!(connection_id = %id, "Disconnect for unknown connection"),
        }
    }

    pub fn handle_request(self: &Arc<Self>, id: ConnectionId, request: ClientRequest) {
        match request {
            ClientRequest::Start(start) => self.start_stream(id, start),
            ClientRequest::Stop => {
                self.stop_stream(id);
                self.send(id, StreamMessage::Stopped);
            }
        }
    }

    /// Replace whatever the connection is tailing with `request`.
    ///
    /// The old tail is terminated and deregistered before the new one is
    /// spawned; both happen under the same lock so there is never a moment
    /// with two tails registered for one connection.
    pub fn start_stream(self: &Arc<Self>, id: ConnectionId, request: StartRequest) {
        let mut connections = self.lock();
        let Some(connection) = connections.get_mut(&id) else {
            warn!(connection_id = %id, "Start request for unknown connection");
            return;
        };

        if let Some(old) = connection.tail.take() {
            old.terminator.cancel();
            info!(
                connection_id = %id,
                old_container_id = %old.container_id,
                new_container_id = %request.container_id,
                "Replacing tail"
            );
        }

        let tail_request = TailRequest {
            container_id: request.container_id.clone(),
            since: None,
            tail: request.tail.unwrap_or(self.default_tail),
        };

        let handle = match self.source.spawn_tail(&tail_request) {
            Ok(handle) => handle,
            Err(e) => {
                warn!(
                    connection_id = %id,
                    container_id = %request.container_id,
                    error = %e,
                    "Failed to start tail"
                );
                let _ = connection.outbound.send(Outbound::control(StreamMessage::error(
                    format!("Failed to start log stream: {}", e),
                )));
                return;
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        connection.tail = Some(ActiveTail {
            generation,
            container_id: request.container_id.clone(),
            terminator: handle.terminator(),
        });

        let _ = connection
            .outbound
            .send(Outbound::control(StreamMessage::Started {
                container_id: request.container_id.clone(),
            }));

        info!(
            connection_id = %id,
            container_id = %request.container_id,
            generation,
            filter = ?request.filter,
            tail = tail_request.tail,
            "Tail started"
        );

        let ctx = DispatchContext {
            connection_id: id,
            generation,
            container_id: request.container_id,
            filter: request.filter.filter(|f| !f.is_empty()),
            outbound: connection.outbound.clone(),
            backlog: connection.backlog.clone(),
        };
        drop(connections);

        tokio::spawn(run_dispatch(Arc::downgrade(self), ctx, handle));
    }

    /// Terminate and deregister the connection's tail. Returns whether one was running.
    pub fn stop_stream(&self, id: ConnectionId) -> bool {
        let stopped = self
            .lock()
            .get_mut(&id)
            .and_then(|connection| connection.tail.take());

        match stopped {
            Some(tail) => {
                tail.terminator.cancel();
                info!(connection_id = %id, container_id = %tail.container_id, "Tail stopped");
                true
            }
            None => false,
        }
    }

    /// Called by a dispatch task when its process exits on its own.
    ///
    /// Only deregisters (and reports `end`) when the exiting tail is still the
    /// current one for the connection.
    pub(crate) fn finish_tail(&self, id: ConnectionId, generation: u64, description: String) {
        let mut connections = self.lock();
        let Some(connection) = connections.get_mut(&id) else {
            return;
        };

        match &connection.tail {
            Some(tail) if tail.generation == generation => {
                info!(
                    connection_id = %id,
                    container_id = %tail.container_id,
                    reason = %description,
                    "Tail ended"
                );
                connection.tail = None;
                let _ = connection
                    .outbound
                    .send(Outbound::control(StreamMessage::End { message: description }));
            }
            _ => debug!(
                connection_id = %id,
                generation,
                "Exit of a replaced tail ignored"
            ),
        }
    }

    fn send(&self, id: ConnectionId, message: StreamMessage) {
        if let Some(connection) = self.lock().get(&id) {
            let _ = connection.outbound.send(Outbound::control(message));
        }
    }

    /// Container currently tailed for a connection.
    pub fn active_container(&self, id: ConnectionId) -> Option<String> {
        self.lock()
            .get(&id)
            .and_then(|c| c.tail.as_ref().map(|t| t.container_id.clone()))
    }

    pub fn active_tails(&self) -> usize {
        self.lock().values().filter(|c| c.tail.is_some()).count()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Terminate every running tail; used on server shutdown.
    pub fn shutdown(&self) {
        let mut connections = self.lock();
        let mut stopped = 0usize;
        for connection in connections.values_mut() {
            if let Some(tail) = connection.tail.take() {
                tail.terminator.cancel();
                stopped += 1;
            }
        }
        info!(stopped, "Session registry shut down");
    }
}
