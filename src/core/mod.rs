// src/core/mod.rs

//! The central module containing the connection lifecycle, command execution,
//! the background subscriber, and callback dispatch of SpinelLink.

pub mod connection;
pub mod dispatch;
pub mod errors;
pub mod executor;
pub mod protocol;
pub mod subscriber;
pub mod transport;

pub use connection::{ConnectionHandle, ConnectionManager};
pub use dispatch::{CallbackDispatcher, HostContext, HostSender, MessageCallback};
pub use errors::{ClientError, CommandResult, ErrorKind, TransportError};
pub use executor::CommandExecutor;
pub use protocol::RespFrame;
pub use subscriber::{SubscriberState, SubscriberWorker, SubscriptionRequest};
pub use transport::{Connection, Connector, Message, Subscription};
