//! Bookshelf Core - line-delimited JSON-RPC over stdio for a book corpus.
//!
//! This crate provides both ends of the protocol:
//!
//! - [`RpcClient`] launches a server as a child process, performs the
//!   `initialize` / `initialized` handshake and issues one request at a time.
//! - [`Dispatcher`] is the server side: it reads requests from stdin and
//!   answers them from an in-memory [`CorpusStore`].
//! - [`Advisor`] wraps a client for callers that want plain-text answers and
//!   a per-session chat history.
//!
//! # Example
//!
//! ```rust,ignore
//! use bookshelf_core::{ClientConfig, RpcClient};
//!
//! #[tokio::main]
//! async fn main() -> bookshelf_core::Result<()> {
//!     let config = ClientConfig::bookshelf_server("bookshelf-rpc", "books.json");
//!     let mut client = RpcClient::connect(&config).await?;
//!
//!     for uri in client.search_books("jobs").await? {
//!         let book = client.get_book(&uri).await?;
//!         println!("{}: {}", uri, book.title);
//!     }
//!
//!     client.stop().await
//! }
//! ```

pub mod client;
pub mod config;
pub mod corpus;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use client::{ConnectionState, ResourceInfo, RpcClient, ServerInfo, ToolInfo};
pub use config::{ClientConfig, ProtocolConfig, ServerConfig, SessionConfig};
pub use corpus::{CorpusStore, Record};
pub use error::{BookshelfError, Result};
pub use protocol::ErrorCode;
pub use server::{serve_stdio, Dispatcher, HandshakeState};
pub use session::{Advisor, ChatEntry, Connector, HistoryStore};
pub use transport::{LineTransport, ProcessTransport, Transport};
