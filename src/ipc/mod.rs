//! IPC module for daemon-display communication

mod protocol;
mod server;

pub use server::{Server, ServerContext};
