//! `resources/list` and `resources/read` handlers.

use super::require_str_param;
use crate::config::ServerConfig;
use crate::corpus::{parse_book_uri, CorpusStore};
use crate::{BookshelfError, Result};
use serde_json::{json, Value};

pub fn list(store: &CorpusStore) -> Value {
    let resources: Vec<Value> = store
        .records()
        .iter()
        .map(|book| {
            json!({
                "uri": book.uri(),
                "name": book.title,
                "description": format!("Book: {}", book.title),
                "mimeType": ServerConfig::RESOURCE_MIME_TYPE,
            })
        })
        .collect();
    json!({ "resources": resources })
}

pub fn read(store: &CorpusStore, params: &Value) -> Result<Value> {
    let uri = require_str_param(params, "uri")?;
    let id = parse_book_uri(uri)?;
    let book = store
        .find_by_id(&id)
        .ok_or_else(|| BookshelfError::ResourceNotFound {
            uri: uri.to_string(),
        })?;

    Ok(json!({
        "contents": [{
            "uri": uri,
            "mimeType": ServerConfig::RESOURCE_MIME_TYPE,
            "text": serde_json::to_string(book)?,
        }]
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{sample_store, Record};

    #[test]
    fn test_read_resource() {
        let store = sample_store();
        let result = read(&store, &json!({"uri": "book://2"})).unwrap();
        let content = &result["contents"][0];

        assert_eq!(content["uri"], "book://2");
        assert_eq!(content["mimeType"], "application/json");
        let book: Record = serde_json::from_str(content["text"].as_str().unwrap()).unwrap();
        assert_eq!(&book, store.find_by_id("2").unwrap());
    }

    #[test]
    fn test_read_resource_errors() {
        let store = sample_store();
        assert!(matches!(
            read(&store, &json!({"uri": "file:///etc/passwd"})),
            Err(BookshelfError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            read(&store, &json!({"uri": "book://404"})),
            Err(BookshelfError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            read(&store, &json!({"uri": "book://"})),
            Err(BookshelfError::ResourceNotFound { .. })
        ));
        assert!(matches!(
            read(&store, &json!({})),
            Err(BookshelfError::InvalidParams { .. })
        ));
    }

    #[test]
    fn test_list_resources() {
        let store = sample_store();
        let result = list(&store);
        assert_eq!(result["resources"][0]["uri"], "book://1");
        assert_eq!(result["resources"][0]["name"], "Make Something Wonderful");
        assert_eq!(
            result["resources"][1]["description"],
            "Book: Thinking, Fast and Slow"
        );
    }
}
