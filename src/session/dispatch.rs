use super::registry::{ConnectionId, Outbound, SessionRegistry};
use crate::protocol::StreamMessage;
use crate::runtime::{TailEvent, TailHandle};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, trace};

/// Keep the lines of `chunk` containing `keyword` (case-insensitive).
///
/// A missing or empty keyword keeps everything. Returns None when nothing
/// but whitespace survives, so callers never emit empty log messages.
pub fn filter_chunk(chunk: &str, keyword: Option<&str>) -> Option<String> {
    let filtered = match keyword.filter(|k| !k.is_empty()) {
        Some(keyword) => {
            let needle = keyword.to_lowercase();
            chunk
                .split('\n')
                .filter(|line| line.to_lowercase().contains(&needle))
                .collect::<Vec<_>>()
                .join("\n")
        }
        None => chunk.to_string(),
    };

    if filtered.trim().is_empty() {
        None
    } else {
        Some(filtered)
    }
}

/// Everything a dispatch task needs, captured when its tail was started.
///
/// `container_id` and `filter` belong to this tail alone; later starts on the
/// same connection never change them.
#[derive(Debug)]
pub(crate) struct DispatchContext {
    pub connection_id: ConnectionId,
    pub generation: u64,
    pub container_id: String,
    pub filter: Option<String>,
    pub outbound: mpsc::UnboundedSender<Outbound>,
    /// Shared with every tail of the connection
    pub backlog: Arc<Semaphore>,
}

/// Forward one tail's output to its connection until the process exits.
pub(crate) async fn run_dispatch(
    registry: Weak<SessionRegistry>,
    ctx: DispatchContext,
    mut handle: TailHandle,
) {
    let mut forwarded = 0u64;

    while let Some(event) = handle.next_event().await {
        match event {
            TailEvent::Chunk { text, .. } => {
                let Some(data) = filter_chunk(&text, ctx.filter.as_deref()) else {
                    continue;
                };
                // Waiting here stalls the pump, and with it the process
                let Ok(slot) = ctx.backlog.clone().acquire_owned().await else {
                    debug!(
                        connection_id = %ctx.connection_id,
                        container_id = %ctx.container_id,
                        "Connection closed, terminating tail"
                    );
                    handle.terminate();
                    break;
                };
                let message = StreamMessage::log(data, ctx.container_id.as_str());
                if ctx.outbound.send(Outbound::log(message, slot)).is_err() {
                    debug!(
                        connection_id = %ctx.connection_id,
                        container_id = %ctx.container_id,
                        "Connection gone, terminating tail"
                    );
                    handle.terminate();
                    break;
                }
                forwarded += 1;
            }
            TailEvent::Exit { description, .. } => {
                trace!(
                    connection_id = %ctx.connection_id,
                    container_id = %ctx.container_id,
                    forwarded,
                    "Tail exited"
                );
                if let Some(registry) = registry.upgrade() {
                    registry.finish_tail(ctx.connection_id, ctx.generation, description);
                }
                break;
            }
        }
    }
}
