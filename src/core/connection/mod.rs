// src/core/connection/mod.rs

pub mod handle;
pub mod manager;

pub use handle::ConnectionHandle;
pub use manager::ConnectionManager;
