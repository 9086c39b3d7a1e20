//! Stdio JSON-RPC server.
//!
//! The dispatcher reads one message per line, handles it completely, writes
//! the reply (requests only), then reads the next. It never writes anything
//! that is not a reply: diagnostics go through `tracing`, which the binary
//! points at stderr.
//!
//! # Handshake
//!
//! Until `initialize` has been answered and the `initialized` notification
//! received, every request except `initialize` fails with `not-initialized`.

mod methods;
mod resources;
mod tools;

pub use methods::Method;
pub use tools::{LIST_ALL_BOOKS, SEARCH_BOOKS};

use crate::config::{ProtocolConfig, ServerConfig};
use crate::corpus::CorpusStore;
use crate::protocol::{self, Response};
use crate::{BookshelfError, Result};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

/// Progress through the `initialize` / `initialized` exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Pending,
    /// `initialize` answered, waiting for `initialized`.
    Initializing,
    Ready,
}

/// Routes messages to handlers and tracks the handshake.
pub struct Dispatcher {
    store: Arc<CorpusStore>,
    handshake: HandshakeState,
}

impl Dispatcher {
    pub fn new(store: Arc<CorpusStore>) -> Self {
        Self {
            store,
            handshake: HandshakeState::Pending,
        }
    }

    pub fn handshake(&self) -> HandshakeState {
        self.handshake
    }

    /// Serve until the reader reaches EOF.
    ///
    /// Bad input never ends the loop; only I/O failures on the streams do.
    pub async fn serve<R, W>(&mut self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        loop {
            let line = match protocol::read_line(&mut reader).await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    info!("Input closed, shutting down");
                    return Ok(());
                }
                Err(BookshelfError::Validation { message, .. }) => {
                    warn!("Dropping message: {}", message);
                    protocol::skip_line(&mut reader).await?;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            if let Some(response) = self.handle_line(&line) {
                let payload = serde_json::to_vec(&response)?;
                protocol::write_line(&mut writer, &payload).await?;
            }
        }
    }

    /// Handle one raw line. Returns the reply, if the message deserves one.
    pub fn handle_line(&mut self, line: &[u8]) -> Option<Response> {
        let message: Value = match serde_json::from_slice(line) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping unparseable message: {}", e);
                return None;
            }
        };

        let id = match message.get("id") {
            None | Some(Value::Null) => None,
            Some(raw) => match raw.as_u64() {
                Some(id) => Some(id),
                None => {
                    warn!("Dropping message with non-integer id {}", raw);
                    return None;
                }
            },
        };

        let Some(method) = message.get("method").and_then(Value::as_str) else {
            return reply_error(
                id,
                BookshelfError::ParseError {
                    message: "missing 'method'".to_string(),
                },
            );
        };

        if let Some(version) = message.get("protocolVersion") {
            if version.as_str() != Some(ProtocolConfig::ENVELOPE_VERSION) {
                return reply_error(
                    id,
                    BookshelfError::InvalidRequest {
                        message: format!(
                            "expected protocolVersion {}, got {}",
                            ProtocolConfig::ENVELOPE_VERSION,
                            version
                        ),
                    },
                );
            }
        }

        let params = match message.get("params") {
            None | Some(Value::Null) => json!({}),
            Some(params @ Value::Object(_)) => params.clone(),
            Some(_) => {
                return reply_error(
                    id,
                    BookshelfError::InvalidParams {
                        message: "params must be an object".to_string(),
                    },
                );
            }
        };

        let Some(id) = id else {
            self.handle_notification(method);
            return None;
        };

        debug!("Request {} {}", id, method);
        Some(match self.dispatch(method, &params) {
            Ok(result) => Response::success(id, result),
            Err(e) => {
                debug!("Request {} {} failed: {}", id, method, e);
                Response::error(id, e.to_rpc_error_code(), e.to_string())
            }
        })
    }

    fn dispatch(&mut self, name: &str, params: &Value) -> Result<Value> {
        if self.handshake != HandshakeState::Ready && name != Method::Initialize.as_str() {
            return Err(BookshelfError::NotInitialized {
                method: name.to_string(),
            });
        }

        let method = Method::parse(name).ok_or_else(|| BookshelfError::MethodNotFound {
            method: name.to_string(),
        })?;

        match method {
            Method::Initialize => {
                if self.handshake == HandshakeState::Pending {
                    self.handshake = HandshakeState::Initializing;
                }
                Ok(initialize_result(&self.store))
            }
            Method::Initialized | Method::Ping => Ok(json!({})),
            Method::ToolsList => Ok(tools::list()),
            Method::ToolsCall => tools::call(&self.store, params),
            Method::ResourcesList => Ok(resources::list(&self.store)),
            Method::ResourcesRead => resources::read(&self.store, params),
        }
    }

    fn handle_notification(&mut self, name: &str) {
        match Method::parse(name) {
            Some(Method::Initialized) => match self.handshake {
                HandshakeState::Initializing => {
                    self.handshake = HandshakeState::Ready;
                    info!("Handshake complete");
                }
                HandshakeState::Pending => {
                    warn!("Ignoring 'initialized' received before 'initialize'");
                }
                HandshakeState::Ready => {}
            },
            _ => debug!("Ignoring notification {}", name),
        }
    }
}

fn initialize_result(store: &CorpusStore) -> Value {
    json!({
        "protocolVersion": ProtocolConfig::HANDSHAKE_VERSION,
        "capabilities": {
            "tools": {},
            "resources": {}
        },
        "serverInfo": {
            "name": ServerConfig::SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
            "books": store.len()
        }
    })
}

/// Turn an error into a reply when there is an id to address it to.
fn reply_error(id: Option<u64>, err: BookshelfError) -> Option<Response> {
    match id {
        Some(id) => Some(Response::error(id, err.to_rpc_error_code(), err.to_string())),
        None => {
            warn!("Dropping message without id: {}", err);
            None
        }
    }
}

/// Extract a required string parameter or return an error.
pub(crate) fn require_str_param<'a>(params: &'a Value, name: &str) -> Result<&'a str> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| BookshelfError::InvalidParams {
            message: format!("Missing required parameter: {}", name),
        })
}

/// Serve on this process's stdin/stdout until EOF, Ctrl-C or SIGTERM.
pub async fn serve_stdio(store: Arc<CorpusStore>) -> Result<()> {
    let mut dispatcher = Dispatcher::new(store);
    let stdin = BufReader::new(tokio::io::stdin());
    let stdout = tokio::io::stdout();

    info!("Bookshelf server ready");

    tokio::select! {
        result = dispatcher.serve(stdin, stdout) => result,
        _ = shutdown_signal() => {
            info!("Shutdown signal received, exiting");
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = terminate.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
