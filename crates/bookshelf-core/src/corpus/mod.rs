//! In-memory book corpus.
//!
//! Records are loaded once at startup and never change afterwards, so the
//! store can be shared behind an `Arc` without locking.

mod snippet;
mod uri;

pub use snippet::snippet;
pub use uri::{book_uri, parse_book_uri};

use crate::{BookshelfError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

/// One corpus entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub title: String,
    pub content: String,
}

impl Record {
    pub fn new(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    /// The `book://` URI addressing this record.
    pub fn uri(&self) -> String {
        book_uri(&self.id)
    }
}

/// Lowercased copies of the searchable fields, built once at load.
#[derive(Debug)]
struct IndexedText {
    title: String,
    content: String,
}

/// Ordered, read-only record collection with id lookup and substring search.
#[derive(Debug)]
pub struct CorpusStore {
    records: Vec<Record>,
    by_id: HashMap<String, usize>,
    index: Vec<IndexedText>,
}

impl CorpusStore {
    /// Build a store from records, keeping their order.
    ///
    /// Fails if two records share an id.
    pub fn from_records(records: Vec<Record>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(records.len());
        for (pos, record) in records.iter().enumerate() {
            if by_id.insert(record.id.clone(), pos).is_some() {
                return Err(BookshelfError::Validation {
                    field: "id".to_string(),
                    message: format!("duplicate record id '{}'", record.id),
                });
            }
        }

        let index = records
            .iter()
            .map(|r| IndexedText {
                title: r.title.to_lowercase(),
                content: r.content.to_lowercase(),
            })
            .collect();

        Ok(Self {
            records,
            by_id,
            index,
        })
    }

    /// Load a JSON array of records from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data =
            std::fs::read_to_string(path).map_err(|e| BookshelfError::io_with_path(e, path))?;
        let records: Vec<Record> = serde_json::from_str(&data).map_err(|e| BookshelfError::Json {
            message: format!("Failed to parse corpus {}: {}", path.display(), e),
            source: Some(e),
        })?;

        let store = Self::from_records(records)?;
        info!("Loaded {} books from {}", store.len(), path.display());
        Ok(store)
    }

    /// Exact-match lookup. Absent ids are not an error.
    pub fn find_by_id(&self, id: &str) -> Option<&Record> {
        self.by_id.get(id).map(|&pos| &self.records[pos])
    }

    /// Case-insensitive substring search over title and content.
    ///
    /// Returns resource URIs in load order, one per matching record. The
    /// empty query matches everything.
    pub fn search(&self, query: &str) -> Vec<String> {
        let needle = query.to_lowercase();
        self.records
            .iter()
            .zip(&self.index)
            .filter(|(_, text)| text.title.contains(&needle) || text.content.contains(&needle))
            .map(|(record, _)| record.uri())
            .collect()
    }

    /// All records in load order.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
pub(crate) fn sample_store() -> CorpusStore {
    CorpusStore::from_records(vec![
        Record::new(
            "1",
            "Make Something Wonderful",
            "Steve Jobs reflects on failure and iteration.",
        ),
        Record::new(
            "2",
            "Thinking, Fast and Slow",
            "Kahneman on cognitive biases.",
        ),
    ])
    .unwrap()
}
