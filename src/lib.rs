// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::config::{ClientConfig, ConnectionConfig, SubscriberConfig};
pub use crate::core::{
    ClientError, CommandResult, ConnectionHandle, ConnectionManager, ErrorKind, HostContext,
    SubscriberState,
};
