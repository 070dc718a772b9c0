//! Application wiring
//!
//! [`LibraryApp`] owns everything a front end needs: the local store, the remote and metadata
//! clients, the session and the services built on them.
use crate::catalog::{BookService, CoverUrls};
use crate::config::ClientConfig;
use crate::errors::{AppError, ClientError, StorageError};
use crate::metadata::MetadataClient;
use crate::reading_list::ReadingListService;
use crate::remote::RecordStore;
use crate::remote::pocketbase::PocketBaseClient;
use crate::session::{Registration, Session, SessionContext, SessionState};
use crate::storage::{DARK_MODE_KEY, LocalStore};
use log::{info, warn};
use std::sync::Arc;

pub struct LibraryApp {
    config: ClientConfig,
    store: Arc<LocalStore>,
    remote: Arc<dyn RecordStore>,
    metadata: MetadataClient,
    session: Arc<SessionContext>,
    reading_list: ReadingListService<dyn RecordStore>,
    books: BookService<dyn RecordStore>,
}

impl LibraryApp {
    /// Opens the local store, builds the HTTP clients and restores the previous session.
    /// # Errors
    /// Fails if the store file cannot be read or an HTTP client cannot be built.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn bootstrap(config: ClientConfig) -> Result<Self, AppError> {
        let remote = PocketBaseClient::new(&config.backend_url, config.request_timeout)?;
        Self::with_remote(config, Arc::new(remote)).await
    }

    /// Like [`Self::bootstrap`], against an already constructed record store.
    /// # Errors
    /// Fails if the store file cannot be read or the metadata client cannot be built.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn with_remote(
        config: ClientConfig,
        remote: Arc<dyn RecordStore>,
    ) -> Result<Self, AppError> {
        let store = Arc::new(LocalStore::open(&config.store_path)?);
        let metadata = MetadataClient::new(
            &config.metadata_url,
            &config.covers_url,
            config.request_timeout,
        )?;
        let session = Arc::new(SessionContext::new(Arc::clone(&store)));
        let restored = session.restore(&*remote).await;
        info!(
            "Session {}",
            if matches!(restored, SessionState::Authenticated(_)) {
                "restored"
            } else {
                "anonymous"
            }
        );

        let urls = CoverUrls::new(&config.backend_url, &config.covers_url);
        let reading_list =
            ReadingListService::new(Arc::clone(&remote), Arc::clone(&session), urls.clone())
                .with_retry(config.retry);
        let books = BookService::new(Arc::clone(&remote), Arc::clone(&session), urls);

        Ok(Self {
            config,
            store,
            remote,
            metadata,
            session,
            reading_list,
            books,
        })
    }

    #[must_use]
    #[inline]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    #[must_use]
    #[inline]
    pub const fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    #[must_use]
    #[inline]
    pub const fn reading_list(&self) -> &ReadingListService<dyn RecordStore> {
        &self.reading_list
    }

    #[must_use]
    #[inline]
    pub const fn books(&self) -> &BookService<dyn RecordStore> {
        &self.books
    }

    #[must_use]
    #[inline]
    pub const fn metadata(&self) -> &MetadataClient {
        &self.metadata
    }

    /// # Errors
    /// See [`SessionContext::login`].
    #[inline]
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ClientError> {
        self.session.login(&*self.remote, email, password).await
    }

    /// # Errors
    /// See [`SessionContext::register`].
    #[inline]
    pub async fn register(&self, registration: &Registration) -> Result<Session, ClientError> {
        self.session.register(&*self.remote, registration).await
    }

    /// # Errors
    /// Fails if the stored credentials cannot be removed.
    #[inline]
    pub async fn logout(&self) -> Result<(), StorageError> {
        self.session.logout().await
    }

    /// The stored dark-mode preference, `false` if unset or unreadable.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn dark_mode(&self) -> bool {
        match self.store.get::<bool>(DARK_MODE_KEY) {
            Ok(enabled) => enabled.unwrap_or(false),
            Err(err) => {
                warn!("Ignoring unreadable dark mode preference: {err}");
                false
            }
        }
    }

    /// # Errors
    /// Fails if the preference cannot be written.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn set_dark_mode(&self, enabled: bool) -> Result<(), StorageError> {
        self.store.set(DARK_MODE_KEY, &enabled)
    }

    /// Flips the preference and returns the new value.
    /// # Errors
    /// Fails if the preference cannot be written.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn toggle_dark_mode(&self) -> Result<bool, StorageError> {
        let enabled = !self.dark_mode();
        self.set_dark_mode(enabled)?;
        Ok(enabled)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::reading_list::{Progress, ReadingStatus};
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn config(dir: &TempDir) -> ClientConfig {
        ClientConfig {
            store_path: dir.path().join("store.json"),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn dark_mode_persists_across_restarts() {
        let dir = TempDir::new().unwrap();
        let remote: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());

        let app = LibraryApp::with_remote(config(&dir), Arc::clone(&remote))
            .await
            .unwrap();
        assert!(!app.dark_mode());
        assert!(app.toggle_dark_mode().unwrap());
        drop(app);

        let app = LibraryApp::with_remote(config(&dir), remote).await.unwrap();
        assert!(app.dark_mode());
        app.set_dark_mode(false).unwrap();
        assert!(!app.dark_mode());
    }

    #[tokio::test]
    async fn session_survives_restart_and_logout_clears_it() {
        let dir = TempDir::new().unwrap();
        let memory = Arc::new(MemoryStore::new());
        memory.add_user("reader@example.org", "correct horse");
        let remote: Arc<dyn RecordStore> = memory;

        let app = LibraryApp::with_remote(config(&dir), Arc::clone(&remote))
            .await
            .unwrap();
        assert!(!app.session().is_authenticated().await);
        app.login("reader@example.org", "correct horse")
            .await
            .unwrap();
        app.reading_list()
            .add_or_update("book-7", ReadingStatus::Reading, Progress::pages(5, 100))
            .await
            .unwrap();
        drop(app);

        let app = LibraryApp::with_remote(config(&dir), Arc::clone(&remote))
            .await
            .unwrap();
        assert!(app.session().is_authenticated().await);
        assert_eq!(app.reading_list().fetch_list().await.unwrap().len(), 1);

        app.logout().await.unwrap();
        drop(app);
        let app = LibraryApp::with_remote(config(&dir), remote).await.unwrap();
        assert!(!app.session().is_authenticated().await);
        assert!(app.reading_list().fetch_list().await.unwrap().is_empty());
    }
}
