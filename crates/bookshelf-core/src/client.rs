//! JSON-RPC client for a Bookshelf server.
//!
//! The protocol allows one outstanding request per connection. Every method
//! that talks to the server takes `&mut self`, so the borrow checker keeps it
//! that way; callers that share a client across tasks wrap it in a mutex
//! (see [`crate::session::Advisor`]).
//!
//! Request ids start at 1 and only ever increase. The id echoed back in a
//! response is checked against the request just sent; a mismatch means the
//! stream is out of step and the connection is discarded.

use crate::config::{ClientConfig, ProtocolConfig, SessionConfig};
use crate::corpus::Record;
use crate::protocol::{Notification, Request, Response};
use crate::transport::{ProcessTransport, Transport};
use crate::{BookshelfError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Transport is up, handshake not yet done.
    Connected,
    /// Handshake complete; all methods available.
    Initialized,
    /// Stopped or failed. Every call fails with `TransportClosed`.
    Closed,
}

/// Identity reported by the server during the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A tool advertised by `tools/list`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// A resource advertised by `resources/list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResourceInfo {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
}

/// Client side of one server connection.
pub struct RpcClient<T: Transport = ProcessTransport> {
    transport: T,
    next_id: u64,
    state: ConnectionState,
    request_timeout: Duration,
    server_info: Option<ServerInfo>,
}

impl RpcClient<ProcessTransport> {
    /// Launch the configured server process. The handshake is not performed.
    pub fn spawn(config: &ClientConfig) -> Result<Self> {
        let transport = ProcessTransport::start(config)?;
        Ok(Self::new(transport).with_request_timeout(config.request_timeout))
    }

    /// Launch the configured server process and complete the handshake.
    pub async fn connect(config: &ClientConfig) -> Result<Self> {
        let mut client = Self::spawn(config)?;
        if let Err(e) = client.initialize().await {
            if let Err(stop_err) = client.stop().await {
                warn!("Failed to stop server after handshake error: {}", stop_err);
            }
            return Err(e);
        }
        Ok(client)
    }
}

impl<T: Transport> RpcClient<T> {
    /// Wrap an already-open transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            next_id: 1,
            state: ConnectionState::Connected,
            request_timeout: ProtocolConfig::REQUEST_TIMEOUT,
            server_info: None,
        }
    }

    /// Set the deadline for each response.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether further calls can succeed without a relaunch.
    pub fn is_usable(&self) -> bool {
        self.state != ConnectionState::Closed
    }

    /// Server identity, once the handshake has completed.
    pub fn server_info(&self) -> Option<&ServerInfo> {
        self.server_info.as_ref()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Send a request and wait for its response.
    ///
    /// Returns the `result` payload. An `error` payload becomes
    /// `BookshelfError::Rpc` and leaves the connection usable; transport and
    /// protocol failures close it.
    pub async fn send_request(&mut self, method: &str, params: Value) -> Result<Value> {
        self.ensure_ready(method)?;

        let id = self.next_id;
        self.next_id += 1;

        let result = self.exchange(id, method, params).await;
        if let Err(e) = &result {
            self.fail_on_fatal(e);
        }
        result
    }

    async fn exchange(&mut self, id: u64, method: &str, params: Value) -> Result<Value> {
        let payload = serde_json::to_vec(&Request::new(id, method, params))?;
        debug!("-> request {} {}", id, method);

        // The deadline covers the write as well; it blocks once the pipe fills.
        let timeout = self.request_timeout;
        let transport = &mut self.transport;
        let line = tokio::time::timeout(timeout, async move {
            transport.write_line(&payload).await?;
            transport.read_line().await
        })
        .await
        .map_err(|_| BookshelfError::Timeout(timeout))??;

        let response: Response = serde_json::from_slice(&line).map_err(|e| {
            BookshelfError::protocol_violation(format!("malformed response: {}", e))
        })?;

        if response.id != id {
            return Err(BookshelfError::protocol_violation(format!(
                "response id {} does not match request id {}",
                response.id, id
            )));
        }
        debug!("<- response {}", id);

        match (response.result, response.error) {
            (_, Some(error)) => Err(BookshelfError::Rpc {
                code: error.code,
                message: error.message,
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(BookshelfError::protocol_violation(format!(
                "response {} has neither result nor error",
                id
            ))),
        }
    }

    /// Send a notification. Nothing is read back.
    ///
    /// Before the handshake only `initialized` may be sent.
    pub async fn send_notification(&mut self, method: &str, params: Value) -> Result<()> {
        self.ensure_open()?;
        if self.state == ConnectionState::Connected && method != "initialized" {
            return Err(BookshelfError::NotInitialized {
                method: method.to_string(),
            });
        }

        let payload = serde_json::to_vec(&Notification::new(method, params))?;
        debug!("-> notification {}", method);
        let result = tokio::time::timeout(self.request_timeout, self.transport.write_line(&payload))
            .await
            .unwrap_or(Err(BookshelfError::Timeout(self.request_timeout)));
        if let Err(e) = &result {
            self.fail_on_fatal(e);
        }
        result
    }

    /// Perform the `initialize` / `initialized` handshake.
    pub async fn initialize(&mut self) -> Result<Option<ServerInfo>> {
        let result = self
            .send_request(
                "initialize",
                json!({
                    "protocolVersion": ProtocolConfig::HANDSHAKE_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": SessionConfig::CLIENT_NAME,
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await?;

        self.server_info = result
            .get("serverInfo")
            .cloned()
            .and_then(|info| serde_json::from_value(info).ok());

        self.send_notification("initialized", json!({})).await?;
        self.state = ConnectionState::Initialized;
        Ok(self.server_info.clone())
    }

    /// Invoke a server-side tool.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> Result<Value> {
        self.send_request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await
    }

    /// Read a resource by URI.
    pub async fn read_resource(&mut self, uri: &str) -> Result<Value> {
        self.send_request("resources/read", json!({ "uri": uri }))
            .await
    }

    /// Tools the server offers.
    pub async fn list_tools(&mut self) -> Result<Vec<ToolInfo>> {
        let result = self.send_request("tools/list", json!({})).await?;
        parse_field(result, "tools")
    }

    /// Resources the server offers.
    pub async fn list_resources(&mut self) -> Result<Vec<ResourceInfo>> {
        let result = self.send_request("resources/list", json!({})).await?;
        parse_field(result, "resources")
    }

    /// Run the `search_books` tool and return the matching URIs.
    pub async fn search_books(&mut self, query: &str) -> Result<Vec<String>> {
        let result = self
            .call_tool("search_books", json!({ "query": query }))
            .await?;
        match first_text(&result, "content") {
            Some(text) => serde_json::from_str(text).map_err(|e| {
                BookshelfError::protocol_violation(format!("malformed search result: {}", e))
            }),
            None => Ok(Vec::new()),
        }
    }

    /// Fetch and decode the record behind a `book://` URI.
    pub async fn get_book(&mut self, uri: &str) -> Result<Record> {
        let result = self.read_resource(uri).await?;
        let text = first_text(&result, "contents").ok_or_else(|| {
            BookshelfError::protocol_violation(format!("resource {} has no contents", uri))
        })?;
        serde_json::from_str(text).map_err(|e| {
            BookshelfError::protocol_violation(format!("malformed record for {}: {}", uri, e))
        })
    }

    /// Stop the transport. The client cannot be used afterwards.
    pub async fn stop(&mut self) -> Result<()> {
        self.state = ConnectionState::Closed;
        self.transport.stop().await
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Err(BookshelfError::transport_closed(
                "connection is closed; stop and relaunch the server",
            ));
        }
        Ok(())
    }

    fn ensure_ready(&self, method: &str) -> Result<()> {
        self.ensure_open()?;
        if self.state == ConnectionState::Connected && method != "initialize" {
            return Err(BookshelfError::NotInitialized {
                method: method.to_string(),
            });
        }
        Ok(())
    }

    fn fail_on_fatal(&mut self, err: &BookshelfError) {
        if err.is_connection_fatal() {
            warn!("Connection is no longer usable: {}", err);
            self.state = ConnectionState::Closed;
        }
    }
}

/// `result[field][0].text`, the shape both tool and resource results use.
fn first_text<'a>(result: &'a Value, field: &str) -> Option<&'a str> {
    result
        .get(field)?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

fn parse_field<D: serde::de::DeserializeOwned>(mut result: Value, field: &str) -> Result<D> {
    let value = result
        .get_mut(field)
        .map(Value::take)
        .ok_or_else(|| BookshelfError::protocol_violation(format!("result missing '{}'", field)))?;
    serde_json::from_value(value).map_err(|e| {
        BookshelfError::protocol_violation(format!("malformed '{}': {}", field, e))
    })
}
