pub mod config;
pub mod run;
pub mod watch;

pub use run::RunError;
