// src/core/transport/resp/client.rs

//! A single RESP connection: the TCP stream, the connection handshake, and
//! request/response with timeouts.

use crate::config::ConnectionConfig;
use crate::core::errors::TransportError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

/// One authenticated connection to the store.
#[derive(Debug)]
pub struct RespClient {
    framed: Framed<TcpStream, RespFrameCodec>,
    command_timeout: Duration,
}

impl RespClient {
    /// Connects within `connect_timeout`, then runs `AUTH` and `SELECT` as configured.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, TransportError> {
        let addr = config.addr();
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| {
                TransportError::Timeout(format!(
                    "Connect timeout after {:?} while connecting to {addr}",
                    config.connect_timeout
                ))
            })??;
        stream.set_nodelay(true)?;

        let mut client = Self {
            framed: Framed::new(stream, RespFrameCodec),
            command_timeout: config.command_timeout,
        };
        client.handshake(config).await?;
        debug!("Established RESP connection to {} (db {}).", addr, config.db);
        Ok(client)
    }

    async fn handshake(&mut self, config: &ConnectionConfig) -> Result<(), TransportError> {
        if !config.password.is_empty() {
            // The two-argument form is only needed for named ACL users.
            let auth = if config.user.is_empty() || config.user == "default" {
                RespFrame::command(["AUTH", config.password.as_str()])
            } else {
                RespFrame::command(["AUTH", config.user.as_str(), config.password.as_str()])
            };
            expect_ok(self.request(auth).await?, "AUTH")?;
        }
        if config.db != 0 {
            let select = RespFrame::command(["SELECT".to_string(), config.db.to_string()]);
            expect_ok(self.request(select).await?, "SELECT")?;
        }
        Ok(())
    }

    /// Sends one frame and waits for one reply frame.
    pub async fn request(&mut self, frame: RespFrame) -> Result<RespFrame, TransportError> {
        self.send(frame).await?;
        match tokio::time::timeout(self.command_timeout, self.framed.next()).await {
            Ok(Some(reply)) => reply,
            Ok(None) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout(
                "Read timeout while waiting for response".to_string(),
            )),
        }
    }

    pub async fn send(&mut self, frame: RespFrame) -> Result<(), TransportError> {
        tokio::time::timeout(self.command_timeout, self.framed.send(frame))
            .await
            .map_err(|_| TransportError::Timeout("Write timeout while sending command".to_string()))?
    }

    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Gives up request/response mode; used when the connection enters pub/sub mode.
    pub fn into_framed(self) -> Framed<TcpStream, RespFrameCodec> {
        self.framed
    }
}

/// Accepts only a `+OK` reply; error replies keep their server text.
pub(crate) fn expect_ok(reply: RespFrame, command: &str) -> Result<(), TransportError> {
    match reply.into_result()? {
        RespFrame::SimpleString(s) if s.eq_ignore_ascii_case("OK") => Ok(()),
        other => Err(TransportError::Protocol(format!(
            "Unexpected response to {command}: {other:?}"
        ))),
    }
}

/// Accepts an integer reply, clamping negatives to zero.
pub(crate) fn expect_count(reply: RespFrame, command: &str) -> Result<u64, TransportError> {
    match reply.into_result()? {
        RespFrame::Integer(n) => Ok(n.max(0) as u64),
        other => Err(TransportError::Protocol(format!(
            "Unexpected response to {command}: {other:?}"
        ))),
    }
}
