//! `book://<id>` resource URIs.

use crate::config::ServerConfig;
use crate::{BookshelfError, Result};

/// Build the resource URI for a record id.
pub fn book_uri(id: &str) -> String {
    format!("{}://{}", ServerConfig::RESOURCE_SCHEME, id)
}

/// Extract the record id from a resource URI.
///
/// Anything that is not `book://...` is an unsupported scheme. The id may be
/// empty; resolving it is the store's job.
pub fn parse_book_uri(uri: &str) -> Result<String> {
    match uri.split_once("://") {
        Some((scheme, id)) if scheme == ServerConfig::RESOURCE_SCHEME => Ok(id.to_string()),
        _ => Err(BookshelfError::UnsupportedScheme {
            uri: uri.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_uri() {
        assert_eq!(book_uri("42"), "book://42");
        assert_eq!(parse_book_uri(&book_uri("a b/c")).unwrap(), "a b/c");
    }

    #[test]
    fn test_parse_rejects_other_schemes() {
        for uri in ["http://1", "BOOK://1", "book:1", "1", ""] {
            assert!(
                matches!(
                    parse_book_uri(uri),
                    Err(BookshelfError::UnsupportedScheme { .. })
                ),
                "{uri} should be rejected"
            );
        }
    }

    #[test]
    fn test_parse_allows_empty_id() {
        assert_eq!(parse_book_uri("book://").unwrap(), "");
    }
}
