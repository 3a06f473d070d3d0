// src/core/protocol/resp_frame.rs

//! The RESP2 frame type and its `tokio_util` codec, as spoken by the pooled
//! TCP transport.

use crate::core::errors::TransportError;
use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const CRLF: &[u8] = b"\r\n";
const CRLF_LEN: usize = 2;

// Limits applied to replies so a misbehaving server cannot exhaust the client.
const MAX_FRAME_ELEMENTS: usize = 1_024 * 1_024;
const MAX_BULK_STRING_SIZE: usize = 512 * 1024 * 1024;
const MAX_RECURSION_DEPTH: usize = 64;

/// A single RESP2 frame.
#[derive(Debug, Clone, PartialEq)]
pub enum RespFrame {
    SimpleString(String),
    Error(String),
    Integer(i64),
    BulkString(Bytes),
    Null,
    NullArray,
    Array(Vec<RespFrame>),
}

impl RespFrame {
    /// Builds a command frame: an array of bulk strings.
    pub fn command<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        RespFrame::Array(
            parts
                .into_iter()
                .map(|p| RespFrame::BulkString(Bytes::copy_from_slice(p.as_ref())))
                .collect(),
        )
    }

    /// Returns the textual content of a string-like frame.
    pub fn as_text(&self) -> Option<String> {
        match self {
            RespFrame::SimpleString(s) => Some(s.clone()),
            RespFrame::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Turns an error reply into a `TransportError::Server`, passing every other frame through.
    pub fn into_result(self) -> Result<RespFrame, TransportError> {
        match self {
            RespFrame::Error(msg) => Err(TransportError::Server(msg)),
            other => Ok(other),
        }
    }
}

/// A `tokio_util::codec` implementation for encoding and decoding `RespFrame`s.
#[derive(Debug, Default, Clone, Copy)]
pub struct RespFrameCodec;

impl Encoder<RespFrame> for RespFrameCodec {
    type Error = TransportError;

    fn encode(&mut self, item: RespFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        match item {
            RespFrame::SimpleString(s) => write_line(dst, b'+', s.as_bytes()),
            RespFrame::Error(s) => write_line(dst, b'-', s.as_bytes()),
            RespFrame::Integer(i) => write_line(dst, b':', i.to_string().as_bytes()),
            RespFrame::BulkString(b) => {
                write_line(dst, b'$', b.len().to_string().as_bytes());
                dst.extend_from_slice(&b);
                dst.extend_from_slice(CRLF);
            }
            RespFrame::Null => dst.extend_from_slice(b"$-1\r\n"),
            RespFrame::NullArray => dst.extend_from_slice(b"*-1\r\n"),
            RespFrame::Array(arr) => {
                write_line(dst, b'*', arr.len().to_string().as_bytes());
                for frame in arr {
                    self.encode(frame, dst)?;
                }
            }
        }
        Ok(())
    }
}

impl Decoder for RespFrameCodec {
    type Item = RespFrame;
    type Error = TransportError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        let mut cursor = &src[..];
        match decode_frame(&mut cursor, 0) {
            Ok(frame) => {
                let consumed = src.len() - cursor.len();
                src.advance(consumed);
                Ok(Some(frame))
            }
            // Wait for more bytes; nothing is consumed.
            Err(TransportError::IncompleteData) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

fn write_line(dst: &mut BytesMut, prefix: u8, body: &[u8]) {
    dst.extend_from_slice(&[prefix]);
    dst.extend_from_slice(body);
    dst.extend_from_slice(CRLF);
}

/// Decodes one frame from `bytes`, advancing the slice past it.
fn decode_frame(bytes: &mut &[u8], depth: usize) -> Result<RespFrame, TransportError> {
    if depth > MAX_RECURSION_DEPTH {
        return Err(TransportError::Protocol(
            "RESP recursion depth limit exceeded".to_string(),
        ));
    }
    let Some((&prefix, rest)) = bytes.split_first() else {
        return Err(TransportError::IncompleteData);
    };
    *bytes = rest;
    let line = take_line(bytes)?;

    match prefix {
        b'+' => Ok(RespFrame::SimpleString(
            String::from_utf8_lossy(line).into_owned(),
        )),
        b'-' => Ok(RespFrame::Error(String::from_utf8_lossy(line).into_owned())),
        b':' => Ok(RespFrame::Integer(parse_number(line)?)),
        b'$' => {
            let len = parse_number(line)?;
            if len == -1 {
                return Ok(RespFrame::Null);
            }
            let len = checked_len(len, MAX_BULK_STRING_SIZE, "bulk string")?;
            if bytes.len() < len + CRLF_LEN {
                return Err(TransportError::IncompleteData);
            }
            if &bytes[len..len + CRLF_LEN] != CRLF {
                return Err(TransportError::Protocol(
                    "bulk string is not terminated by CRLF".to_string(),
                ));
            }
            let data = Bytes::copy_from_slice(&bytes[..len]);
            *bytes = &bytes[len + CRLF_LEN..];
            Ok(RespFrame::BulkString(data))
        }
        b'*' => {
            let len = parse_number(line)?;
            if len == -1 {
                return Ok(RespFrame::NullArray);
            }
            let len = checked_len(len, MAX_FRAME_ELEMENTS, "array")?;
            let mut frames = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                frames.push(decode_frame(bytes, depth + 1)?);
            }
            Ok(RespFrame::Array(frames))
        }
        other => Err(TransportError::Protocol(format!(
            "unexpected RESP type byte '{}'",
            other as char
        ))),
    }
}

fn take_line<'a>(bytes: &mut &'a [u8]) -> Result<&'a [u8], TransportError> {
    let pos = bytes
        .windows(CRLF_LEN)
        .position(|window| window == CRLF)
        .ok_or(TransportError::IncompleteData)?;
    let line = &bytes[..pos];
    *bytes = &bytes[pos + CRLF_LEN..];
    Ok(line)
}

fn parse_number(line: &[u8]) -> Result<i64, TransportError> {
    std::str::from_utf8(line)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            TransportError::Protocol(format!(
                "invalid integer '{}'",
                String::from_utf8_lossy(line)
            ))
        })
}

fn checked_len(len: i64, max: usize, what: &str) -> Result<usize, TransportError> {
    usize::try_from(len)
        .ok()
        .filter(|l| *l <= max)
        .ok_or_else(|| TransportError::Protocol(format!("invalid {what} length {len}")))
}
