//! Centralized configuration for Bookshelf.
//!
//! Constants for the wire protocol, the server process and the session
//! facade, plus the builder used to describe how a server is launched.

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wire protocol configuration.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Envelope version carried in every request and notification.
    pub const ENVELOPE_VERSION: &'static str = "2.0";
    /// Version negotiated inside the `initialize` payload.
    pub const HANDSHAKE_VERSION: &'static str = "2024-11-05";
    pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024; // 4MB
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
    pub const KILL_TIMEOUT: Duration = Duration::from_secs(1);
}

/// Server process configuration.
pub struct ServerConfig;

impl ServerConfig {
    pub const SERVER_NAME: &'static str = "bookshelf";
    pub const BINARY_NAME: &'static str = "bookshelf-rpc";
    pub const DEFAULT_CORPUS_FILE: &'static str = "books.json";
    pub const RESOURCE_SCHEME: &'static str = "book";
    pub const RESOURCE_MIME_TYPE: &'static str = "application/json";
    pub const DESCRIPTION_PREVIEW_CHARS: usize = 100;
}

/// Session facade configuration.
pub struct SessionConfig;

impl SessionConfig {
    pub const CLIENT_NAME: &'static str = "bookshelf-client";
    pub const MAX_HISTORY_ENTRIES: usize = 50;
    pub const SNIPPET_CONTEXT_CHARS: usize = 50;
    pub const REQUEST_FAILED_MESSAGE: &'static str =
        "The request failed. Please try again in a moment.";
}

/// Configuration for launching a server process.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Path to the server executable.
    pub command: PathBuf,
    /// Arguments passed to the server.
    pub args: Vec<String>,
    /// Deadline for each response.
    pub request_timeout: Duration,
    /// How long to wait for a graceful exit before force-killing.
    pub stop_timeout: Duration,
}

impl ClientConfig {
    /// Create a new launch config with sensible defaults.
    pub fn new(command: impl AsRef<Path>) -> Self {
        Self {
            command: command.as_ref().to_path_buf(),
            args: Vec::new(),
            request_timeout: ProtocolConfig::REQUEST_TIMEOUT,
            stop_timeout: ProtocolConfig::STOP_TIMEOUT,
        }
    }

    /// Launch config for a `bookshelf-rpc` binary serving the given corpus.
    pub fn bookshelf_server(binary: impl AsRef<Path>, corpus: impl AsRef<Path>) -> Self {
        Self::new(binary)
            .with_arg("--corpus")
            .with_arg(corpus.as_ref().to_string_lossy())
    }

    /// Add an argument.
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the per-request deadline.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the graceful stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Command line as a single string, for logs and errors.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.command.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bookshelf_server_config() {
        let config = ClientConfig::bookshelf_server("/bin/bookshelf-rpc", "/tmp/books.json");
        assert_eq!(config.args, vec!["--corpus", "/tmp/books.json"]);
        assert_eq!(config.request_timeout, ProtocolConfig::REQUEST_TIMEOUT);
        assert_eq!(
            config.display_command(),
            "/bin/bookshelf-rpc --corpus /tmp/books.json"
        );
    }

    #[test]
    fn test_timeouts_are_reasonable() {
        assert!(ProtocolConfig::REQUEST_TIMEOUT > ProtocolConfig::STOP_TIMEOUT);
        assert!(ProtocolConfig::STOP_TIMEOUT > Duration::ZERO);
        let config = ClientConfig::new("x").with_request_timeout(Duration::from_millis(250));
        assert_eq!(config.request_timeout, Duration::from_millis(250));
    }
}
