//! Question answering on top of the RPC client.
//!
//! [`Advisor`] owns one server connection and a per-session chat history.
//! Answers are built from literal substring search: the whole question
//! first, then each whitespace-separated term if the whole question finds
//! nothing.

use crate::client::{RpcClient, ToolInfo};
use crate::config::{ClientConfig, SessionConfig};
use crate::corpus::{snippet, Record};
use crate::transport::{ProcessTransport, Transport};
use crate::{BookshelfError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Something that can produce a ready-to-use (handshaken) client.
#[async_trait]
pub trait Connector: Send + Sync {
    type Transport: Transport;

    async fn connect(&self) -> Result<RpcClient<Self::Transport>>;
}

#[async_trait]
impl Connector for ClientConfig {
    type Transport = ProcessTransport;

    async fn connect(&self) -> Result<RpcClient<ProcessTransport>> {
        info!("Launching server: {}", self.display_command());
        RpcClient::connect(self).await
    }
}

/// One question and the answer it got.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    pub answer: String,
}

/// Chat history keyed by session id, capped per session.
#[derive(Debug)]
pub struct HistoryStore {
    sessions: HashMap<String, VecDeque<ChatEntry>>,
    capacity: usize,
}

impl Default for HistoryStore {
    fn default() -> Self {
        Self::with_capacity(SessionConfig::MAX_HISTORY_ENTRIES)
    }
}

impl HistoryStore {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest ones past capacity.
    pub fn record(&mut self, session: &str, question: &str, answer: &str) -> ChatEntry {
        let entry = ChatEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            question: question.to_string(),
            answer: answer.to_string(),
        };

        let entries = self.sessions.entry(session.to_string()).or_default();
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        entry
    }

    /// Entries for a session, oldest first. Unknown sessions are empty.
    pub fn entries(&self, session: &str) -> Vec<ChatEntry> {
        self.sessions
            .get(session)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self, session: &str) {
        self.sessions.remove(session);
    }
}

/// Answers questions about the corpus through a server connection.
///
/// The connection is created lazily and replaced whenever it stops being
/// usable, so a crashed server costs one failed answer, not the session.
pub struct Advisor<C: Connector = ClientConfig> {
    connector: C,
    client: Mutex<Option<RpcClient<C::Transport>>>,
    history: Mutex<HistoryStore>,
}

impl<C: Connector> Advisor<C> {
    /// Connect and perform the handshake.
    pub async fn launch(connector: C) -> Result<Self> {
        let client = connector.connect().await?;
        if let Some(info) = client.server_info() {
            info!("Connected to {} {}", info.name, info.version);
        }
        Ok(Self {
            connector,
            client: Mutex::new(Some(client)),
            history: Mutex::new(HistoryStore::default()),
        })
    }

    /// Answer a question and record it in the session's history.
    ///
    /// Never fails: errors are logged and turned into a generic answer.
    pub async fn ask(&self, session: &str, question: &str) -> String {
        let answer = match self.answer(question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Failed to answer question: {}", e);
                SessionConfig::REQUEST_FAILED_MESSAGE.to_string()
            }
        };

        self.history
            .lock()
            .await
            .record(session, question.trim(), &answer);
        answer
    }

    pub async fn history(&self, session: &str) -> Vec<ChatEntry> {
        self.history.lock().await.entries(session)
    }

    pub async fn clear(&self, session: &str) {
        self.history.lock().await.clear(session);
    }

    /// Lock the connection, relaunching the server first if the previous
    /// connection failed or was stopped.
    async fn connection(&self) -> Result<MutexGuard<'_, Option<RpcClient<C::Transport>>>> {
        let mut guard = self.client.lock().await;
        if !guard.as_ref().is_some_and(|client| client.is_usable()) {
            if let Some(mut stale) = guard.take() {
                warn!("Server connection lost, relaunching");
                if let Err(e) = stale.stop().await {
                    warn!("Failed to stop previous server: {}", e);
                }
            }
            *guard = Some(self.connector.connect().await?);
        }
        Ok(guard)
    }

    pub async fn list_tools(&self) -> Result<Vec<ToolInfo>> {
        let mut guard = self.connection().await?;
        match guard.as_mut() {
            Some(client) => client.list_tools().await,
            None => Err(BookshelfError::transport_closed("no server connection")),
        }
    }

    /// Stop the server. A later `ask` relaunches it.
    pub async fn stop(&self) -> Result<()> {
        match self.client.lock().await.take() {
            Some(mut client) => client.stop().await,
            None => Ok(()),
        }
    }

    async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Ok("Please ask a question about the books in the library.".to_string());
        }

        let mut guard = self.connection().await?;
        let client = guard
            .as_mut()
            .ok_or_else(|| BookshelfError::transport_closed("no server connection"))?;

        let mut uris = client.search_books(question).await?;
        if uris.is_empty() && question.contains(char::is_whitespace) {
            for term in question.split_whitespace() {
                for uri in client.search_books(term).await? {
                    if !uris.contains(&uri) {
                        uris.push(uri);
                    }
                }
            }
        }

        let mut books = Vec::with_capacity(uris.len());
        for uri in &uris {
            books.push(client.get_book(uri).await?);
        }

        Ok(render_answer(question, &books))
    }
}

fn render_answer(question: &str, books: &[Record]) -> String {
    if books.is_empty() {
        return format!("No books in the library mention \"{}\".", question);
    }

    let mut answer = format!(
        "Found {} book{} matching \"{}\":\n",
        books.len(),
        if books.len() == 1 { "" } else { "s" },
        question
    );
    for (i, book) in books.iter().enumerate() {
        answer.push_str(&format!("\n{}. {} ({})\n", i + 1, book.title, book.uri()));
        if let Some(text) = best_snippet(book, question) {
            answer.push_str(&format!("   {}\n", text));
        }
    }
    answer
}

/// Snippet for the whole question, else for the first term found in the content.
fn best_snippet(book: &Record, question: &str) -> Option<String> {
    std::iter::once(question)
        .chain(question.split_whitespace())
        .find_map(|q| snippet(&book.content, q, SessionConfig::SNIPPET_CONTEXT_CHARS))
}
