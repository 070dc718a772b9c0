use crate::catalog::normalize::{CoverUrls, normalize};
use crate::catalog::types::{
    Book, NewBook, RatingOutcome, RatingRecord, RemoteBookRecord, SourceBook,
};
use crate::errors::ClientError;
use crate::remote::{Collection, FileUpload, Filter, ListQuery, RecordPage, RecordStore};
use crate::session::SessionContext;
use log::{debug, info};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::instrument;

/// Books shown per catalog page.
pub const CATALOG_PAGE_SIZE: u32 = 50;
/// Ratings taken into account when recomputing a book's mean rating.
pub const RATINGS_PAGE_SIZE: u32 = 100;

const NEWEST_FIRST: &str = "-created";

/// Read and write access to the shared `books` catalog.
pub struct BookService<S: RecordStore + ?Sized> {
    store: Arc<S>,
    session: Arc<SessionContext>,
    urls: CoverUrls,
}

impl<S: RecordStore + ?Sized> BookService<S> {
    #[must_use]
    #[inline]
    pub const fn new(store: Arc<S>, session: Arc<SessionContext>, urls: CoverUrls) -> Self {
        Self {
            store,
            session,
            urls,
        }
    }

    /// Newest books first.
    /// # Errors
    /// Propagates any backend failure.
    #[instrument(name = "catalog.list", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn list_books(&self) -> Result<Vec<Book>, ClientError> {
        let query = ListQuery::new(1, CATALOG_PAGE_SIZE).with_sort(NEWEST_FIRST);
        self.list(&query).await
    }

    /// Newest books of one category (`type` field), e.g. `manhwa`.
    /// # Errors
    /// Propagates any backend failure.
    #[instrument(name = "catalog.by_category", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn books_by_category(&self, category: &str) -> Result<Vec<Book>, ClientError> {
        let query = ListQuery::new(1, CATALOG_PAGE_SIZE)
            .with_filter(Filter::equals("type", category.trim()))
            .with_sort(NEWEST_FIRST);
        self.list(&query).await
    }

    /// # Errors
    /// `NotFound` for an unknown id.
    #[instrument(name = "catalog.book", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn book(&self, id: &str) -> Result<Book, ClientError> {
        let token = self.token().await;
        let record = self
            .store
            .get_one(Collection::Books, id, token.as_deref())
            .await?;
        self.to_book(record)
    }

    /// Books whose title or author contains `query`, case-insensitively.
    /// # Errors
    /// A blank query is a validation error and sends nothing.
    #[instrument(name = "catalog.search", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn search(&self, query: &str) -> Result<Vec<Book>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::validation("Search query must not be empty."));
        }
        let list_query = ListQuery::new(1, CATALOG_PAGE_SIZE)
            .with_filter(Filter::contains("title", query).or(Filter::contains("author", query)));
        self.list(&list_query).await
    }

    /// Adds a book to the catalog, uploading the cover alongside when one is given.
    /// # Errors
    /// `Unauthenticated` without a session, a validation error for blank required fields, or any
    /// backend failure.
    #[instrument(name = "catalog.add", skip(self, new_book), fields(title = %new_book.title))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn add_book(&self, new_book: NewBook) -> Result<Book, ClientError> {
        let session = self.session.require().await?;
        new_book.validate()?;

        let fields = new_book.fields();
        let record = match new_book.image {
            Some(image) => {
                debug!("Uploading cover {} ({} bytes)", image.file_name, image.bytes.len());
                let upload = FileUpload {
                    field: String::from("image"),
                    file_name: image.file_name,
                    mime_type: image.mime_type,
                    bytes: image.bytes,
                };
                self.store
                    .create_with_file(Collection::Books, fields, upload, Some(session.token()))
                    .await?
            }
            None => {
                self.store
                    .create(Collection::Books, Value::Object(fields), Some(session.token()))
                    .await?
            }
        };

        let book = self.to_book(record)?;
        info!("Added book {} ({})", book.title, book.id);
        Ok(book)
    }

    /// Stores a rating for the book and writes the new mean back to it.
    /// # Errors
    /// `Unauthenticated` without a session, a validation error for ratings outside 1..=5,
    /// `NotFound` for an unknown book, or any backend failure.
    #[instrument(name = "catalog.rate", skip(self, review))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn rate_book(
        &self,
        book_id: &str,
        rating: u8,
        review: &str,
    ) -> Result<RatingOutcome, ClientError> {
        let session = self.session.require().await?;
        if !(1..=5).contains(&rating) {
            let mut fields = std::collections::BTreeMap::new();
            fields.insert(
                String::from("rating"),
                String::from("Must be between 1 and 5."),
            );
            return Err(ClientError::Validation {
                message: String::from("Failed to create rating."),
                fields,
            });
        }
        let token = Some(session.token());

        self.store.get_one(Collection::Books, book_id, token).await?;
        let created = self
            .store
            .create(
                Collection::Ratings,
                json!({
                    "book": book_id,
                    "user": session.user_id(),
                    "rating": rating,
                    "review": review,
                }),
                token,
            )
            .await?;
        let stored: RatingRecord = serde_json::from_value(created)?;

        let query =
            ListQuery::new(1, RATINGS_PAGE_SIZE).with_filter(Filter::equals("book", book_id));
        let ratings = self.store.list(Collection::Ratings, &query, token).await?;
        let average = mean_rating(&ratings).unwrap_or(f64::from(stored.rating));

        self.store
            .update(Collection::Books, book_id, json!({ "rating": average }), token)
            .await?;
        info!("Book {book_id} now rated {average:.2}");
        Ok(RatingOutcome::new(stored, average))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Book>, ClientError> {
        let token = self.token().await;
        let page = self
            .store
            .list(Collection::Books, query, token.as_deref())
            .await?;
        debug!("Fetched {} of {} books", page.items.len(), page.total_items);
        page.items
            .into_iter()
            .map(|record| self.to_book(record))
            .collect()
    }

    /// The catalog is public; a session token is sent along when there is one.
    async fn token(&self) -> Option<String> {
        self.session
            .current()
            .await
            .map(|session| session.token().to_owned())
    }

    fn to_book(&self, record: Value) -> Result<Book, ClientError> {
        let record: RemoteBookRecord = serde_json::from_value(record)?;
        Ok(normalize(SourceBook::Remote(record), &self.urls))
    }
}

/// Mean of the `rating` fields on a page of rating records, `None` for an empty page.
fn mean_rating(page: &RecordPage) -> Option<f64> {
    let ratings = page
        .items
        .iter()
        .filter_map(|record| record.get("rating").and_then(Value::as_f64))
        .collect::<Vec<f64>>();
    if ratings.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss, reason = "At most one page of ratings")]
    let count = ratings.len() as f64;
    Some(ratings.iter().sum::<f64>() / count)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::catalog::types::{BookSource, CoverImage};
    use crate::storage::LocalStore;
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;

    async fn service(logged_in: bool) -> (Arc<MemoryStore>, BookService<MemoryStore>) {
        let remote = Arc::new(MemoryStore::new());
        remote.add_user("reader@example.org", "correct horse");
        let session = Arc::new(SessionContext::new(Arc::new(LocalStore::in_memory())));
        if logged_in {
            session
                .login(&*remote, "reader@example.org", "correct horse")
                .await
                .unwrap();
        }
        let service = BookService::new(
            Arc::clone(&remote),
            session,
            CoverUrls::new("https://db.example.org", "https://covers.openlibrary.org"),
        );
        (remote, service)
    }

    fn seed(remote: &MemoryStore) {
        remote.insert(
            Collection::Books,
            json!({"id": "b1", "title": "Dune", "author": "Frank Herbert", "type": "fiction"}),
        );
        remote.insert(
            Collection::Books,
            json!({"id": "b2", "title": "Tower of God", "author": "SIU", "type": "manhwa",
                   "image": "tog.png"}),
        );
        remote.insert(
            Collection::Books,
            json!({"id": "b3", "title": "Children of Dune", "author": "Frank Herbert",
                   "type": "fiction"}),
        );
    }

    fn titles(books: &[Book]) -> Vec<&str> {
        books.iter().map(|book| book.title.as_str()).collect()
    }

    #[tokio::test]
    async fn lists_newest_first() {
        let (remote, service) = service(false).await;
        seed(&remote);
        let books = service.list_books().await.unwrap();
        assert_eq!(titles(&books), vec!["Children of Dune", "Tower of God", "Dune"]);
        assert!(books.iter().all(|book| book.source == BookSource::Remote));
    }

    #[tokio::test]
    async fn filters_by_category() {
        let (remote, service) = service(false).await;
        seed(&remote);
        let books = service.books_by_category("manhwa").await.unwrap();
        assert_eq!(titles(&books), vec!["Tower of God"]);
        assert_eq!(
            books[0].cover_url.as_deref(),
            Some("https://db.example.org/api/files/books/b2/tog.png")
        );
    }

    #[tokio::test]
    async fn searches_title_and_author() {
        let (remote, service) = service(false).await;
        seed(&remote);
        assert_eq!(
            titles(&service.search("dune").await.unwrap()),
            vec!["Dune", "Children of Dune"]
        );
        assert_eq!(titles(&service.search("siu").await.unwrap()), vec!["Tower of God"]);
        assert!(matches!(
            service.search("   ").await,
            Err(ClientError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_book_is_not_found() {
        let (_remote, service) = service(false).await;
        assert!(matches!(
            service.book("missing").await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn adding_requires_session() {
        let (remote, service) = service(false).await;
        let new_book = NewBook {
            title: String::from("Dune"),
            author: String::from("Frank Herbert"),
            kind: String::from("fiction"),
            description: String::new(),
            image: None,
        };
        let before = remote.calls();
        assert!(matches!(
            service.add_book(new_book).await,
            Err(ClientError::Unauthenticated)
        ));
        assert_eq!(remote.calls(), before);
    }

    #[tokio::test]
    async fn adds_book_with_cover() {
        let (_remote, service) = service(true).await;
        let book = service
            .add_book(NewBook {
                title: String::from("  Omniscient Reader  "),
                author: String::from("Sing Shong"),
                kind: String::from("manhwa"),
                description: String::from("A reader becomes part of the story."),
                image: Some(CoverImage {
                    file_name: String::from("orv.jpg"),
                    mime_type: Some(String::from("image/jpeg")),
                    bytes: vec![0xFF, 0xD8, 0xFF],
                }),
            })
            .await
            .unwrap();
        assert_eq!(book.title, "Omniscient Reader");
        assert_eq!(book.kind.as_deref(), Some("manhwa"));
        assert!(book.cover_url.unwrap().ends_with("/orv.jpg"));
    }

    #[tokio::test]
    async fn rating_updates_book_mean() {
        let (remote, service) = service(true).await;
        seed(&remote);
        remote.insert(
            Collection::Ratings,
            json!({"book": "b1", "user": "someone-else", "rating": 2}),
        );

        let outcome = service.rate_book("b1", 5, "Spice!").await.unwrap();
        assert_eq!(outcome.rating.rating, 5);
        assert_eq!(outcome.rating.review, "Spice!");
        assert!((outcome.average - 3.5).abs() < f64::EPSILON);

        let book = service.book("b1").await.unwrap();
        assert_eq!(book.rating, Some(3.5));
    }

    #[tokio::test]
    async fn rating_is_bounded() {
        let (remote, service) = service(true).await;
        seed(&remote);
        let before = remote.calls();
        for rating in [0, 6] {
            assert!(matches!(
                service.rate_book("b1", rating, "").await,
                Err(ClientError::Validation { .. })
            ));
        }
        assert_eq!(remote.calls(), before);
    }

    #[tokio::test]
    async fn rating_unknown_book_is_not_found() {
        let (remote, service) = service(true).await;
        assert!(matches!(
            service.rate_book("missing", 4, "").await,
            Err(ClientError::NotFound(_))
        ));
        assert!(remote.records(Collection::Ratings).is_empty());
    }
}
