pub mod api;
pub mod server;
pub mod stream;

pub use api::{ApiError, AppState};
pub use server::{build_router, run_server, serve};
