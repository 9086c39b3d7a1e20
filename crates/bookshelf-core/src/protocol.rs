//! Wire protocol types and line framing.
//!
//! Every message is one compact JSON document terminated by a single `\n`.
//!
//! ```text
//! {"protocolVersion":"2.0","id":1,"method":"tools/list","params":{}}\n
//! {"id":1,"result":{"tools":[...]}}\n
//! ```

use crate::config::ProtocolConfig;
use crate::{BookshelfError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

fn empty_params() -> Value {
    Value::Object(Default::default())
}

/// A request that expects exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub id: u64,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        Self {
            protocol_version: ProtocolConfig::ENVELOPE_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// A fire-and-forget message. Never answered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            protocol_version: ProtocolConfig::ENVELOPE_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Reply to a [`Request`]; carries either `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Create a success response.
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: u64, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            id,
            result: None,
            error: Some(ErrorObject {
                code: code.as_str().to_string(),
                message: message.into(),
            }),
        }
    }
}

/// Error payload of a [`Response`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

/// Error codes the dispatcher puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    NotInitialized,
    UnknownTool,
    UnsupportedScheme,
    ResourceNotFound,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "parse-error",
            ErrorCode::InvalidRequest => "invalid-request",
            ErrorCode::MethodNotFound => "method-not-found",
            ErrorCode::InvalidParams => "invalid-params",
            ErrorCode::NotInitialized => "not-initialized",
            ErrorCode::UnknownTool => "unknown-tool",
            ErrorCode::UnsupportedScheme => "unsupported-scheme",
            ErrorCode::ResourceNotFound => "resource-not-found",
            ErrorCode::InternalError => "internal-error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read one newline-terminated frame.
///
/// The trailing `\n` (and a `\r` before it) is stripped. Returns `None` when
/// the stream ends before a newline, including a partial final line.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let limit = ProtocolConfig::MAX_MESSAGE_SIZE as u64 + 1;
    let mut buf = Vec::new();
    (&mut *reader)
        .take(limit)
        .read_until(b'\n', &mut buf)
        .await?;

    if buf.last() != Some(&b'\n') {
        if buf.len() > ProtocolConfig::MAX_MESSAGE_SIZE {
            return Err(BookshelfError::Validation {
                field: "frame".to_string(),
                message: format!(
                    "message exceeds maximum size of {} bytes",
                    ProtocolConfig::MAX_MESSAGE_SIZE
                ),
            });
        }
        if !buf.is_empty() {
            debug!("Discarding {} bytes of unterminated input at EOF", buf.len());
        }
        return Ok(None);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
    Ok(Some(buf))
}

/// Discard input up to and including the next `\n`.
///
/// Used to resynchronize after an oversized frame.
pub async fn skip_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<()> {
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            return Ok(());
        }
        if let Some(pos) = buf.iter().position(|&b| b == b'\n') {
            reader.consume(pos + 1);
            return Ok(());
        }
        let len = buf.len();
        reader.consume(len);
    }
}

/// Write one frame: the payload, a single `\n`, then flush.
///
/// The frame goes out in one `write_all` so the peer never observes half a
/// message followed by a stall.
pub async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    if payload.contains(&b'\n') {
        return Err(BookshelfError::Validation {
            field: "frame".to_string(),
            message: "payload contains an embedded newline".to_string(),
        });
    }

    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.extend_from_slice(payload);
    frame.push(b'\n');

    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
