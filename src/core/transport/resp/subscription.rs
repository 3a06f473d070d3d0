// src/core/transport/resp/subscription.rs

//! A dedicated RESP connection in pub/sub mode.

use super::client::RespClient;
use crate::core::errors::TransportError;
use crate::core::protocol::{RespFrame, RespFrameCodec};
use crate::core::transport::{Message, Subscription};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::{self, Instant};
use tokio_util::codec::Framed;
use tracing::debug;

pub struct RespSubscription {
    framed: Option<Framed<TcpStream, RespFrameCodec>>,
    command_timeout: Duration,
    /// Messages that arrived while a `subscribe` was waiting for its confirmation.
    pending: VecDeque<Message>,
}

/// A frame received in pub/sub mode.
enum Push {
    Message(Message),
    Subscribed(String),
    Other,
}

impl RespSubscription {
    pub fn new(client: RespClient) -> Self {
        Self {
            command_timeout: client.command_timeout(),
            framed: Some(client.into_framed()),
            pending: VecDeque::new(),
        }
    }

    fn framed(&mut self) -> Result<&mut Framed<TcpStream, RespFrameCodec>, TransportError> {
        self.framed.as_mut().ok_or(TransportError::Closed)
    }
}

#[async_trait]
impl Subscription for RespSubscription {
    /// Sends `SUBSCRIBE` and returns once the server confirms it, within `command_timeout`.
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        let timeout = self.command_timeout;
        let deadline = Instant::now() + timeout;
        let frame = RespFrame::command(["SUBSCRIBE", channel]);
        time::timeout_at(deadline, self.framed()?.send(frame))
            .await
            .map_err(|_| {
                TransportError::Timeout("Write timeout while sending SUBSCRIBE".to_string())
            })??;

        loop {
            let frame = match time::timeout_at(deadline, self.framed()?.next()).await {
                Ok(Some(frame)) => frame?,
                Ok(None) => return Err(TransportError::Closed),
                Err(_) => {
                    return Err(TransportError::Timeout(format!(
                        "No confirmation for SUBSCRIBE '{channel}' within {timeout:?}"
                    )));
                }
            };
            match parse_push(frame)? {
                Push::Subscribed(confirmed) if confirmed == channel => {
                    debug!("Subscription confirmed for channel '{}'.", channel);
                    return Ok(());
                }
                Push::Message(message) => self.pending.push_back(message),
                Push::Subscribed(_) | Push::Other => {}
            }
        }
    }

    async fn next_message(&mut self) -> Result<Message, TransportError> {
        if let Some(message) = self.pending.pop_front() {
            return Ok(message);
        }
        loop {
            // `Framed::next` keeps partial frames in its buffer, so dropping this
            // future between frames loses nothing.
            let frame = match self.framed()?.next().await {
                Some(frame) => frame?,
                None => return Err(TransportError::Closed),
            };
            if let Push::Message(message) = parse_push(frame)? {
                return Ok(message);
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.pending.clear();
        if let Some(framed) = self.framed.take() {
            let mut stream = framed.into_inner();
            stream.shutdown().await?;
        }
        Ok(())
    }
}

/// Classifies a pub/sub frame. Error replies become `TransportError::Server`.
fn parse_push(frame: RespFrame) -> Result<Push, TransportError> {
    let parts = match frame {
        RespFrame::Array(parts) => parts,
        RespFrame::Error(msg) => return Err(TransportError::Server(msg)),
        _ => return Ok(Push::Other),
    };
    let [kind, channel, payload] = parts.as_slice() else {
        return Ok(Push::Other);
    };
    let Some(kind) = kind.as_text() else {
        return Ok(Push::Other);
    };
    let channel = channel.as_text().unwrap_or_default();

    if kind.eq_ignore_ascii_case("message") {
        return Ok(Push::Message(Message::new(
            channel,
            payload.as_text().unwrap_or_default(),
        )));
    }
    if kind.eq_ignore_ascii_case("subscribe") {
        return Ok(Push::Subscribed(channel));
    }
    Ok(Push::Other)
}
