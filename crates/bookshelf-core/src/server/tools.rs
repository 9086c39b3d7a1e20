//! `tools/list` and `tools/call` handlers.

use super::require_str_param;
use crate::config::ServerConfig;
use crate::corpus::CorpusStore;
use crate::{BookshelfError, Result};
use serde_json::{json, Value};

pub const SEARCH_BOOKS: &str = "search_books";
pub const LIST_ALL_BOOKS: &str = "list_all_books";

/// Static tool metadata.
pub fn list() -> Value {
    json!({
        "tools": [
            {
                "name": SEARCH_BOOKS,
                "description": "Search for books by looking for an exact match of your query in the book title or content. The search is case-insensitive substring matching.",
                "inputSchema": {
                    "type": "object",
                    "properties": {
                        "query": {
                            "type": "string",
                            "description": "The exact text to search for in book titles and content"
                        }
                    },
                    "required": ["query"]
                }
            },
            {
                "name": LIST_ALL_BOOKS,
                "description": "List all available books in the library",
                "inputSchema": {
                    "type": "object",
                    "properties": {}
                }
            }
        ]
    })
}

/// Run a tool. Unknown names fail with `UnknownTool` before arguments are looked at.
pub fn call(store: &CorpusStore, params: &Value) -> Result<Value> {
    let name = require_str_param(params, "name")?;
    let empty = json!({});
    let arguments = params.get("arguments").unwrap_or(&empty);

    match name {
        SEARCH_BOOKS => {
            let query = arguments
                .get("query")
                .and_then(Value::as_str)
                .ok_or_else(|| BookshelfError::InvalidParams {
                    message: "Missing required parameter: query".to_string(),
                })?;
            let uris = store.search(query);
            text_content(serde_json::to_string(&uris)?)
        }
        LIST_ALL_BOOKS => {
            let books: Vec<Value> = store
                .records()
                .iter()
                .map(|book| {
                    let preview: String = book
                        .content
                        .chars()
                        .take(ServerConfig::DESCRIPTION_PREVIEW_CHARS)
                        .collect();
                    json!({
                        "uri": book.uri(),
                        "title": book.title,
                        "description": format!("{}...", preview),
                    })
                })
                .collect();
            text_content(serde_json::to_string(&books)?)
        }
        other => Err(BookshelfError::UnknownTool {
            name: other.to_string(),
        }),
    }
}

fn text_content(text: String) -> Result<Value> {
    Ok(json!({
        "content": [{ "type": "text", "text": text }]
    }))
}
