//! Error types for Bookshelf.
//!
//! One enum covers both ends of the wire. The client-side variants describe
//! what can go wrong with a connection; the server-side variants are the
//! application errors a handler returns, each mapped to a wire error code.

use crate::protocol::ErrorCode;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the Bookshelf library.
#[derive(Debug, Error)]
pub enum BookshelfError {
    // Connection errors
    #[error("Failed to launch {command}: {message}")]
    ProcessSpawn {
        command: String,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Transport closed: {reason}")]
    TransportClosed { reason: String },

    #[error("Protocol violation: {message}")]
    ProtocolViolation { message: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("RPC error {code}: {message}")]
    Rpc { code: String, message: String },

    #[error("Method {method} called before the handshake completed")]
    NotInitialized { method: String },

    // Application errors returned by the dispatcher
    #[error("Parse error: {message}")]
    ParseError { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Method not found: {method}")]
    MethodNotFound { method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },

    #[error("Unsupported URI scheme: {uri}")]
    UnsupportedScheme { uri: String },

    #[error("Resource not found: {uri}")]
    ResourceNotFound { uri: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },
}

/// Result type alias for Bookshelf operations.
pub type Result<T> = std::result::Result<T, BookshelfError>;

impl From<std::io::Error> for BookshelfError {
    fn from(err: std::io::Error) -> Self {
        BookshelfError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for BookshelfError {
    fn from(err: serde_json::Error) -> Self {
        BookshelfError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl BookshelfError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        BookshelfError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a transport-closed error.
    pub fn transport_closed(reason: impl Into<String>) -> Self {
        BookshelfError::TransportClosed {
            reason: reason.into(),
        }
    }

    /// Create a protocol-violation error.
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        BookshelfError::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Convert to a wire error code.
    ///
    /// Only the dispatcher-side variants have a dedicated code; anything else
    /// that escapes a handler is reported as `internal-error`.
    pub fn to_rpc_error_code(&self) -> ErrorCode {
        match self {
            BookshelfError::ParseError { .. } | BookshelfError::Json { .. } => {
                ErrorCode::ParseError
            }
            BookshelfError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
            BookshelfError::MethodNotFound { .. } => ErrorCode::MethodNotFound,
            BookshelfError::InvalidParams { .. } | BookshelfError::Validation { .. } => {
                ErrorCode::InvalidParams
            }
            BookshelfError::NotInitialized { .. } => ErrorCode::NotInitialized,
            BookshelfError::UnknownTool { .. } => ErrorCode::UnknownTool,
            BookshelfError::UnsupportedScheme { .. } => ErrorCode::UnsupportedScheme,
            BookshelfError::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            _ => ErrorCode::InternalError,
        }
    }

    /// Check if this error leaves the connection unusable.
    ///
    /// The owner must stop and relaunch the server after any of these.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            BookshelfError::ProcessSpawn { .. }
                | BookshelfError::TransportClosed { .. }
                | BookshelfError::ProtocolViolation { .. }
                | BookshelfError::Timeout(_)
        )
    }

    /// The wire code carried by an `Rpc` error, if this is one.
    pub fn rpc_code(&self) -> Option<&str> {
        match self {
            BookshelfError::Rpc { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BookshelfError::UnknownTool {
            name: "nonexistent_tool".into(),
        };
        assert_eq!(err.to_string(), "Unknown tool: nonexistent_tool");

        let err = BookshelfError::Rpc {
            code: "unknown-tool".into(),
            message: "Unknown tool: x".into(),
        };
        assert_eq!(err.to_string(), "RPC error unknown-tool: Unknown tool: x");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            BookshelfError::UnsupportedScheme {
                uri: "http://x".into()
            }
            .to_rpc_error_code(),
            ErrorCode::UnsupportedScheme
        );
        assert_eq!(
            BookshelfError::NotInitialized {
                method: "tools/list".into()
            }
            .to_rpc_error_code(),
            ErrorCode::NotInitialized
        );
        assert_eq!(
            BookshelfError::Timeout(Duration::from_secs(1)).to_rpc_error_code(),
            ErrorCode::InternalError
        );
    }

    #[test]
    fn test_connection_fatal_errors() {
        assert!(BookshelfError::Timeout(Duration::from_secs(5)).is_connection_fatal());
        assert!(BookshelfError::transport_closed("eof").is_connection_fatal());
        assert!(BookshelfError::protocol_violation("id mismatch").is_connection_fatal());
        assert!(!BookshelfError::Rpc {
            code: "unknown-tool".into(),
            message: String::new(),
        }
        .is_connection_fatal());
        assert!(!BookshelfError::NotInitialized {
            method: "tools/call".into()
        }
        .is_connection_fatal());
    }
}
