pub mod cli;
pub mod client;
pub mod config;
pub mod protocol;
pub mod runtime;
pub mod session;
pub mod web;
