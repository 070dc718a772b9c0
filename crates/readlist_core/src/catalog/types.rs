use crate::errors::ClientError;
use crate::metadata::OpenLibraryDoc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Where a [`Book`] was read from.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookSource {
    /// The hosted backend's `books` collection
    Remote,
    /// The public metadata API
    Metadata,
}

/// Canonical book shape used everywhere past the transport layer.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Record id for remote books, bare work id (`OL45804W`) for metadata books
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    /// Directly loadable image URL
    pub cover_url: Option<String>,
    /// Category or kind, e.g. `fiction` or `manhwa`
    pub kind: Option<String>,
    pub description: Option<String>,
    pub rating: Option<f64>,
    pub source: BookSource,
}

impl Book {
    /// Authors joined for display.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn author_line(&self) -> String {
        if self.authors.is_empty() {
            return String::from("Unknown Author");
        }
        self.authors.join(", ")
    }
}

/// A record of the backend's `books` collection, as sent over the wire.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteBookRecord {
    pub id: String,
    #[serde(default)]
    pub collection_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    /// Stored file name of the cover, empty when none was uploaded
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub created: String,
}

/// The two wire shapes a book can arrive in.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum SourceBook {
    Remote(RemoteBookRecord),
    Metadata(OpenLibraryDoc),
}

/// Cover file uploaded together with a new book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverImage {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Input of [`crate::catalog::BookService::add_book`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub kind: String,
    pub description: String,
    pub image: Option<CoverImage>,
}

impl NewBook {
    /// Checks required fields before anything is sent.
    /// # Errors
    /// Returns a validation error naming every blank required field.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn validate(&self) -> Result<(), ClientError> {
        let mut fields = std::collections::BTreeMap::new();
        if self.title.trim().is_empty() {
            fields.insert(String::from("title"), String::from("Missing required value."));
        }
        if self.author.trim().is_empty() {
            fields.insert(String::from("author"), String::from("Missing required value."));
        }
        if fields.is_empty() {
            return Ok(());
        }
        Err(ClientError::Validation {
            message: String::from("Failed to create book."),
            fields,
        })
    }

    /// Text fields of the record, without the cover.
    pub(crate) fn fields(&self) -> Map<String, Value> {
        let mut fields = Map::new();
        fields.insert(String::from("title"), json!(self.title.trim()));
        fields.insert(String::from("author"), json!(self.author.trim()));
        fields.insert(String::from("type"), json!(self.kind));
        fields.insert(String::from("description"), json!(self.description));
        fields
    }
}

/// A record of the backend's `ratings` collection.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub id: String,
    pub book: String,
    pub user: String,
    pub rating: u8,
    #[serde(default)]
    pub review: String,
}

/// Result of rating a book: the stored rating and the book's new mean rating.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct RatingOutcome {
    pub rating: RatingRecord,
    pub average: f64,
}

impl RatingOutcome {
    #[must_use]
    #[inline]
    pub const fn new(rating: RatingRecord, average: f64) -> Self {
        Self { rating, average }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_book(title: &str, author: &str) -> NewBook {
        NewBook {
            title: title.to_owned(),
            author: author.to_owned(),
            kind: String::from("fiction"),
            description: String::new(),
            image: None,
        }
    }

    #[test]
    fn new_book_requires_title_and_author() {
        assert!(new_book("Dune", "Frank Herbert").validate().is_ok());
        let Err(ClientError::Validation { fields, .. }) = new_book(" ", "").validate() else {
            panic!("blank book must not validate");
        };
        assert_eq!(
            fields.keys().cloned().collect::<Vec<String>>(),
            vec![String::from("author"), String::from("title")]
        );
    }

    #[test]
    fn author_line_falls_back_for_unknown_authors() {
        let mut book = Book {
            id: String::from("b1"),
            title: String::from("Anonymous Tales"),
            authors: Vec::new(),
            cover_url: None,
            kind: None,
            description: None,
            rating: None,
            source: BookSource::Remote,
        };
        assert_eq!(book.author_line(), "Unknown Author");
        book.authors = vec![String::from("A"), String::from("B")];
        assert_eq!(book.author_line(), "A, B");
    }
}
