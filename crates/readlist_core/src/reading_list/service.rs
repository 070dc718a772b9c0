use crate::catalog::normalize::CoverUrls;
use crate::errors::ClientError;
use crate::reading_list::retry::{RetryPolicy, retry_transient};
use crate::reading_list::types::{
    Progress, ReadingListEntry, ReadingStatus, create_body, update_body,
};
use crate::remote::{Collection, Filter, ListQuery, RecordStore};
use crate::session::SessionContext;
use chrono::Utc;
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::instrument;

/// Entries fetched per list call.
pub const FETCH_PAGE_SIZE: u32 = 100;

/// What `add_or_update` did.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Upsert {
    Created(ReadingListEntry),
    Updated(ReadingListEntry),
}

impl Upsert {
    #[must_use]
    #[inline]
    pub const fn entry(&self) -> &ReadingListEntry {
        match self {
            Self::Created(entry) | Self::Updated(entry) => entry,
        }
    }

    #[must_use]
    #[inline]
    pub fn into_entry(self) -> ReadingListEntry {
        match self {
            Self::Created(entry) | Self::Updated(entry) => entry,
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Reading-list operations of the current user.
pub struct ReadingListService<S: RecordStore + ?Sized> {
    store: Arc<S>,
    session: Arc<SessionContext>,
    urls: CoverUrls,
    retry: RetryPolicy,
}

impl<S: RecordStore + ?Sized> ReadingListService<S> {
    #[must_use]
    #[inline]
    pub fn new(store: Arc<S>, session: Arc<SessionContext>, urls: CoverUrls) -> Self {
        Self {
            store,
            session,
            urls,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    #[inline]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetches the current user's entries, one per book.
    ///
    /// Without a session, or when the backend rejects the session, the list is empty rather than
    /// an error. Transient failures are retried according to the retry policy.
    /// # Errors
    /// Returns the last transient error once retries are exhausted, or any other failure.
    #[instrument(name = "reading_list.fetch", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn fetch_list(&self) -> Result<Vec<ReadingListEntry>, ClientError> {
        let Some(session) = self.session.current().await else {
            info!("No session, reading list is empty");
            return Ok(Vec::new());
        };

        let query = ListQuery::new(1, FETCH_PAGE_SIZE)
            .with_filter(Filter::equals("user", session.user_id()))
            .with_expand("book");
        let fetched = retry_transient(&self.retry, || {
            self.store
                .list(Collection::ReadingList, &query, Some(session.token()))
        })
        .await;

        let page = match fetched {
            Ok(page) => page,
            Err(ClientError::Unauthenticated) => {
                warn!("Backend rejected the session while fetching the reading list");
                return Ok(Vec::new());
            }
            Err(error) => return Err(error),
        };

        let entries = page
            .items
            .into_iter()
            .map(|record| ReadingListEntry::from_record(record, &self.urls))
            .collect::<Result<Vec<ReadingListEntry>, ClientError>>()?;
        info!("Fetched {} reading list entries", entries.len());
        Ok(dedupe_by_book(entries))
    }

    /// Creates the entry for (user, book) or, if one exists, updates it in place.
    /// # Errors
    /// `Unauthenticated` without a session (no request is made), otherwise any backend failure.
    #[instrument(name = "reading_list.add_or_update", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn add_or_update(
        &self,
        book_id: &str,
        status: ReadingStatus,
        progress: Progress,
    ) -> Result<Upsert, ClientError> {
        let session = self.session.require().await?;
        let token = Some(session.token());
        let lookup = ListQuery::new(1, 1).with_filter(
            Filter::equals("user", session.user_id()).and(Filter::equals("book", book_id)),
        );
        let existing = self
            .store
            .list(Collection::ReadingList, &lookup, token)
            .await?
            .items
            .into_iter()
            .next()
            .map(|record| ReadingListEntry::from_record(record, &self.urls))
            .transpose()?;

        let now = Utc::now();
        if let Some(existing) = existing {
            let record = self
                .store
                .update(
                    Collection::ReadingList,
                    &existing.id,
                    update_body(status, progress, now),
                    token,
                )
                .await?;
            info!("Updated reading list entry {} for book {book_id}", existing.id);
            return Ok(Upsert::Updated(ReadingListEntry::from_record(
                record, &self.urls,
            )?));
        }

        let record = self
            .store
            .create(
                Collection::ReadingList,
                create_body(session.user_id(), book_id, status, progress, now),
                token,
            )
            .await?;
        let entry = ReadingListEntry::from_record(record, &self.urls)?;
        info!("Created reading list entry {} for book {book_id}", entry.id);
        Ok(Upsert::Created(entry))
    }

    /// Updates status and progress of an existing entry.
    /// # Errors
    /// `Unauthenticated` without a session, `NotFound` if the entry is gone (e.g. removed in
    /// another client), otherwise any backend failure.
    #[instrument(name = "reading_list.update_progress", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn update_progress(
        &self,
        entry_id: &str,
        status: ReadingStatus,
        progress: Progress,
    ) -> Result<ReadingListEntry, ClientError> {
        let session = self.session.require().await?;
        let updated = self
            .store
            .update(
                Collection::ReadingList,
                entry_id,
                update_body(status, progress, Utc::now()),
                Some(session.token()),
            )
            .await;

        match updated {
            Ok(record) => ReadingListEntry::from_record(record, &self.urls),
            Err(error) => {
                if error.is_not_found() {
                    warn!("Reading list entry {entry_id} no longer exists");
                }
                Err(error)
            }
        }
    }

    /// Deletes an entry.
    /// # Errors
    /// `Unauthenticated` without a session, `NotFound` if the entry was already removed,
    /// otherwise any backend failure.
    #[instrument(name = "reading_list.remove", skip(self))]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn remove(&self, entry_id: &str) -> Result<(), ClientError> {
        let session = self.session.require().await?;
        self.store
            .delete(Collection::ReadingList, entry_id, Some(session.token()))
            .await?;
        info!("Removed reading list entry {entry_id}");
        Ok(())
    }
}

/// Keeps one entry per book: the most recently updated one, at the position of the book's first
/// occurrence.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn dedupe_by_book(entries: Vec<ReadingListEntry>) -> Vec<ReadingListEntry> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<ReadingListEntry> = Vec::with_capacity(entries.len());

    for entry in entries {
        match positions.get(&entry.book_id) {
            Some(&position) => {
                if let Some(kept) = unique.get_mut(position) {
                    if entry.updated_at > kept.updated_at {
                        warn!(
                            "Duplicate reading list entries {} and {} for book {}",
                            kept.id, entry.id, entry.book_id
                        );
                        *kept = entry;
                    }
                }
            }
            None => {
                positions.insert(entry.book_id.clone(), unique.len());
                unique.push(entry);
            }
        }
    }
    unique
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::storage::LocalStore;
    use crate::testing::MemoryStore;
    use core::time::Duration;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    struct Fixture {
        remote: Arc<MemoryStore>,
        session: Arc<SessionContext>,
        service: ReadingListService<MemoryStore>,
        user_id: String,
    }

    fn fixture() -> Fixture {
        let remote = Arc::new(MemoryStore::new());
        let user_id = remote.add_user("reader@example.org", "correct horse");
        let session = Arc::new(SessionContext::new(Arc::new(LocalStore::in_memory())));
        let service = ReadingListService::new(
            Arc::clone(&remote),
            Arc::clone(&session),
            CoverUrls::new("https://db.example.org", "https://covers.openlibrary.org"),
        )
        .with_retry(RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(1),
        });
        Fixture {
            remote,
            session,
            service,
            user_id,
        }
    }

    async fn logged_in() -> Fixture {
        let fixture = fixture();
        fixture
            .session
            .login(&*fixture.remote, "reader@example.org", "correct horse")
            .await
            .unwrap();
        fixture
    }

    #[tokio::test]
    async fn add_or_update_without_session_makes_no_call() {
        let fixture = fixture();
        let result = fixture
            .service
            .add_or_update("book-42", ReadingStatus::Reading, Progress::pages(10, 200))
            .await;
        assert!(matches!(result, Err(ClientError::Unauthenticated)));
        assert_eq!(fixture.remote.calls(), 0);
    }

    #[tokio::test]
    async fn add_or_update_creates_then_updates_in_place() {
        let fixture = logged_in().await;

        let first = fixture
            .service
            .add_or_update("book-7", ReadingStatus::ToRead, Progress::default())
            .await
            .unwrap();
        assert!(first.is_created());
        assert_eq!(first.entry().status, ReadingStatus::ToRead);
        assert_eq!(first.entry().user_id, fixture.user_id);
        assert!(first.entry().created_at.is_some());

        let second = fixture
            .service
            .add_or_update("book-7", ReadingStatus::Completed, Progress::pages(300, 300))
            .await
            .unwrap();
        assert!(!second.is_created());
        assert_eq!(second.entry().id, first.entry().id);
        assert_eq!(second.entry().status, ReadingStatus::Completed);
        assert_eq!(second.entry().progress, Progress::pages(300, 300));

        let stored = fixture.remote.records(Collection::ReadingList);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["status"], "completed");
    }

    #[tokio::test]
    async fn entries_of_other_users_are_not_matched() {
        let fixture = logged_in().await;
        fixture.remote.insert(
            Collection::ReadingList,
            json!({"user": "someone-else", "book": "book-7", "status": "reading"}),
        );

        let upsert = fixture
            .service
            .add_or_update("book-7", ReadingStatus::ToRead, Progress::default())
            .await
            .unwrap();
        assert!(upsert.is_created());
        assert_eq!(fixture.remote.records(Collection::ReadingList).len(), 2);
    }

    #[tokio::test]
    async fn fetch_list_without_session_is_empty() {
        let fixture = fixture();
        assert!(fixture.service.fetch_list().await.unwrap().is_empty());
        assert_eq!(fixture.remote.calls(), 0);
    }

    #[tokio::test]
    async fn fetch_list_returns_own_entries_with_books() {
        let fixture = logged_in().await;
        fixture.remote.insert(
            Collection::Books,
            json!({"id": "b1", "title": "Solo Leveling", "author": "Chugong", "type": "manhwa"}),
        );
        fixture.remote.insert(
            Collection::ReadingList,
            json!({"user": fixture.user_id, "book": "b1", "status": "reading",
                   "currentChapter": 90, "totalChapters": 179}),
        );
        fixture.remote.insert(
            Collection::ReadingList,
            json!({"user": "someone-else", "book": "b1", "status": "dropped"}),
        );

        let entries = fixture.service.fetch_list().await.unwrap();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.book.as_ref().unwrap().title, "Solo Leveling");
        assert_eq!(entry.percent(), 50);
    }

    #[tokio::test]
    async fn fetch_list_keeps_entries_with_blank_status() {
        let fixture = logged_in().await;
        fixture.remote.insert(
            Collection::ReadingList,
            json!({"user": fixture.user_id, "book": "b1", "status": "reading"}),
        );
        fixture.remote.insert(
            Collection::ReadingList,
            json!({"user": fixture.user_id, "book": "b2", "status": ""}),
        );

        let entries = fixture.service.fetch_list().await.unwrap();
        let statuses = entries
            .iter()
            .map(|entry| (entry.book_id.as_str(), entry.status))
            .collect::<Vec<(&str, ReadingStatus)>>();
        assert_eq!(
            statuses,
            vec![("b1", ReadingStatus::Reading), ("b2", ReadingStatus::ToRead)]
        );
    }

    #[tokio::test]
    async fn fetch_list_treats_rejected_session_as_empty() {
        let fixture = logged_in().await;
        fixture.remote.fail_next(ClientError::Unauthenticated);
        assert!(fixture.service.fetch_list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_list_retries_transient_failures() {
        let fixture = logged_in().await;
        fixture.remote.insert(
            Collection::ReadingList,
            json!({"user": fixture.user_id, "book": "b1", "status": "to-read"}),
        );
        let before = fixture.remote.calls();
        fixture.remote.fail_next(ClientError::Transient(String::from("502")));
        fixture.remote.fail_next(ClientError::Transient(String::from("502")));

        let entries = fixture.service.fetch_list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(fixture.remote.calls() - before, 3);
    }

    #[tokio::test]
    async fn fetch_list_surfaces_transient_after_three_attempts() {
        let fixture = logged_in().await;
        let before = fixture.remote.calls();
        for _ in 0..4 {
            fixture.remote.fail_next(ClientError::Transient(String::from("timeout")));
        }

        let result = fixture.service.fetch_list().await;
        assert!(matches!(result, Err(ClientError::Transient(_))));
        assert_eq!(fixture.remote.calls() - before, 3);
    }

    #[tokio::test]
    async fn fetch_list_propagates_other_failures() {
        let fixture = logged_in().await;
        fixture.remote.fail_next(ClientError::validation("bad filter"));
        assert!(matches!(
            fixture.service.fetch_list().await,
            Err(ClientError::Validation { .. })
        ));
    }

    #[tokio::test]
    async fn update_progress_on_deleted_entry_is_not_found() {
        let fixture = logged_in().await;
        let entry = fixture
            .service
            .add_or_update("book-1", ReadingStatus::Reading, Progress::pages(1, 10))
            .await
            .unwrap()
            .into_entry();
        fixture.service.remove(&entry.id).await.unwrap();

        let result = fixture
            .service
            .update_progress(&entry.id, ReadingStatus::Reading, Progress::pages(2, 10))
            .await;
        assert!(matches!(result, Err(ClientError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_progress_changes_existing_entry() {
        let fixture = logged_in().await;
        let entry = fixture
            .service
            .add_or_update("book-1", ReadingStatus::ToRead, Progress::default())
            .await
            .unwrap()
            .into_entry();

        let updated = fixture
            .service
            .update_progress(&entry.id, ReadingStatus::Reading, Progress::chapters(3, 12))
            .await
            .unwrap();
        assert_eq!(updated.id, entry.id);
        assert_eq!(updated.status, ReadingStatus::Reading);
        assert_eq!(updated.progress, Progress::chapters(3, 12));
    }

    #[tokio::test]
    async fn removing_twice_reports_not_found() {
        let fixture = logged_in().await;
        let entry = fixture
            .service
            .add_or_update("book-1", ReadingStatus::ToRead, Progress::default())
            .await
            .unwrap()
            .into_entry();

        fixture.service.remove(&entry.id).await.unwrap();
        assert!(matches!(
            fixture.service.remove(&entry.id).await,
            Err(ClientError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn mutations_without_session_fail_fast() {
        let fixture = fixture();
        assert!(matches!(
            fixture
                .service
                .update_progress("e1", ReadingStatus::Dropped, Progress::default())
                .await,
            Err(ClientError::Unauthenticated)
        ));
        assert!(matches!(
            fixture.service.remove("e1").await,
            Err(ClientError::Unauthenticated)
        ));
        assert_eq!(fixture.remote.calls(), 0);
    }

    #[test]
    fn dedupe_keeps_latest_entry_per_book() {
        let urls = CoverUrls::new("https://db", "https://covers");
        let entry = |id: &str, book: &str, updated: &str| {
            ReadingListEntry::from_record(
                json!({"id": id, "user": "u1", "book": book, "status": "reading",
                       "updated": updated}),
                &urls,
            )
            .unwrap()
        };
        let entries = vec![
            entry("e1", "b1", "2024-01-01 10:00:00.000Z"),
            entry("e2", "b2", "2024-01-02 10:00:00.000Z"),
            entry("e3", "b1", "2024-03-01 10:00:00.000Z"),
            entry("e4", "b2", "2023-12-01 10:00:00.000Z"),
        ];
        let ids = dedupe_by_book(entries)
            .into_iter()
            .map(|entry| entry.id)
            .collect::<Vec<String>>();
        assert_eq!(ids, vec![String::from("e3"), String::from("e2")]);
    }
}
