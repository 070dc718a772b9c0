use crate::catalog::types::{Book, BookSource, RemoteBookRecord, SourceBook};
use crate::metadata::client::{cover_url, work_key_to_id};
use crate::metadata::{CoverSize, OpenLibraryDoc};
use crate::remote::Collection;
use regex::Regex;
use std::sync::LazyLock;
use urlencoding::encode;

static REPEATED_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("Regex must be valid"));

/// Base URLs needed to turn cover references into loadable image URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverUrls {
    /// Hosted backend, serving uploaded files under `/api/files`
    pub backend_url: String,
    /// Metadata API cover host
    pub covers_url: String,
}

impl CoverUrls {
    #[must_use]
    #[inline]
    pub fn new(backend_url: &str, covers_url: &str) -> Self {
        Self {
            backend_url: backend_url.trim_end_matches('/').to_owned(),
            covers_url: covers_url.trim_end_matches('/').to_owned(),
        }
    }
}

/// Reconciles both wire shapes into the canonical [`Book`].
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called for every listed book")]
pub fn normalize(source: SourceBook, urls: &CoverUrls) -> Book {
    match source {
        SourceBook::Remote(record) => from_remote(record, urls),
        SourceBook::Metadata(doc) => from_metadata(doc, urls),
    }
}

fn from_remote(record: RemoteBookRecord, urls: &CoverUrls) -> Book {
    let cover_url = tidy(&record.image).map(|file_name| {
        let collection = if record.collection_id.is_empty() {
            Collection::Books.name()
        } else {
            record.collection_id.as_str()
        };
        format!(
            "{}/api/files/{}/{}/{}",
            urls.backend_url,
            encode(collection),
            encode(&record.id),
            encode(&file_name)
        )
    });

    Book {
        title: tidy(&record.title).unwrap_or_default(),
        authors: tidy(&record.author).into_iter().collect(),
        cover_url,
        kind: tidy(&record.kind),
        description: tidy(&record.description),
        // the backend stores 0 for books nobody has rated yet
        rating: record.rating.filter(|rating| *rating > 0.0),
        source: BookSource::Remote,
        id: record.id,
    }
}

fn from_metadata(doc: OpenLibraryDoc, urls: &CoverUrls) -> Book {
    let cover_url = doc
        .cover_i
        .filter(|cover_id| *cover_id > 0)
        .map(|cover_id| cover_url(&urls.covers_url, Some(cover_id), CoverSize::Medium));

    Book {
        id: work_key_to_id(&doc.key).to_owned(),
        title: tidy(&doc.title).unwrap_or_default(),
        authors: doc
            .author_name
            .iter()
            .filter_map(|name| tidy(name))
            .collect(),
        cover_url,
        kind: None,
        description: None,
        rating: None,
        source: BookSource::Metadata,
    }
}

/// Trims and collapses whitespace runs, mapping blank text to `None`.
fn tidy(text: &str) -> Option<String> {
    Some(REPEATED_WHITESPACE.replace_all(text.trim(), " ").to_string()).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn urls() -> CoverUrls {
        CoverUrls::new("https://db.example.org/", "https://covers.openlibrary.org")
    }

    #[test]
    fn remote_record_becomes_book() {
        let record = RemoteBookRecord {
            id: String::from("rec1"),
            collection_id: String::from("pbc_books"),
            title: String::from("  The   Hobbit "),
            author: String::from("J.R.R. Tolkien"),
            kind: String::from("fantasy"),
            description: String::new(),
            image: String::from("hobbit_cover.jpg"),
            rating: Some(4.5),
            created: String::new(),
        };
        let book = normalize(SourceBook::Remote(record), &urls());
        assert_eq!(book.id, "rec1");
        assert_eq!(book.title, "The Hobbit");
        assert_eq!(book.authors, vec![String::from("J.R.R. Tolkien")]);
        assert_eq!(
            book.cover_url.as_deref(),
            Some("https://db.example.org/api/files/pbc_books/rec1/hobbit_cover.jpg")
        );
        assert_eq!(book.kind.as_deref(), Some("fantasy"));
        assert_eq!(book.description, None);
        assert_eq!(book.rating, Some(4.5));
        assert_eq!(book.source, BookSource::Remote);
    }

    #[test]
    fn unrated_remote_book_has_no_rating() {
        let record = RemoteBookRecord {
            id: String::from("rec2"),
            title: String::from("Dune"),
            rating: Some(0.0),
            ..RemoteBookRecord::default()
        };
        let book = normalize(SourceBook::Remote(record), &urls());
        assert_eq!(book.rating, None);
        assert_eq!(book.cover_url, None);
        assert!(book.authors.is_empty());
    }

    #[test]
    fn metadata_doc_becomes_book() {
        let doc = OpenLibraryDoc::new(
            String::from("/works/OL27448W"),
            String::from("The Lord of the Rings"),
            vec![String::from("J.R.R. Tolkien"), String::from("  ")],
            Some(14_625_765),
        );
        let book = normalize(SourceBook::Metadata(doc), &urls());
        assert_eq!(book.id, "OL27448W");
        assert_eq!(book.authors, vec![String::from("J.R.R. Tolkien")]);
        assert_eq!(
            book.cover_url.as_deref(),
            Some("https://covers.openlibrary.org/b/id/14625765-M.jpg")
        );
        assert_eq!(book.source, BookSource::Metadata);
    }

    #[test]
    fn both_shapes_agree_on_shared_fields() {
        let remote = normalize(
            SourceBook::Remote(RemoteBookRecord {
                id: String::from("x"),
                title: String::from("Emma"),
                author: String::from("Jane Austen"),
                ..RemoteBookRecord::default()
            }),
            &urls(),
        );
        let metadata = normalize(
            SourceBook::Metadata(OpenLibraryDoc::new(
                String::from("/works/OL66554W"),
                String::from("Emma"),
                vec![String::from("Jane Austen")],
                None,
            )),
            &urls(),
        );
        assert_eq!(remote.title, metadata.title);
        assert_eq!(remote.author_line(), metadata.author_line());
        assert_eq!(remote.cover_url, metadata.cover_url);
    }
}
