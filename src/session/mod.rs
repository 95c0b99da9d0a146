pub mod dispatch;
pub mod registry;

pub use dispatch::filter_chunk;
pub use registry::{ConnectionId, Outbound, OutboundReceiver, SessionRegistry, LOG_BACKLOG};
