//! Auth/session state
//!
//! `SessionContext` is the explicit session handed to every service. It moves through
//! `Anonymous → Authenticating → Authenticated` (or back to `Anonymous` on failure), is
//! rehydrated from the local store on startup and cleared on logout.
use crate::errors::{ClientError, StorageError};
use crate::remote::{AuthRecord, Collection, RecordStore, UserRecord};
use crate::storage::{AUTH_KEY, LocalStore};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shortest password the sign-up form accepts.
const MIN_PASSWORD_LENGTH: usize = 6;

/// Profile fields of the authenticated user.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub created: Option<String>,
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl From<UserRecord> for UserProfile {
    fn from(record: UserRecord) -> Self {
        let name = if record.name.trim().is_empty() {
            record.username
        } else {
            record.name
        };
        Self {
            id: record.id,
            email: record.email,
            name,
            avatar: Some(record.avatar).filter(|avatar| !avatar.is_empty()),
            created: Some(record.created).filter(|created| !created.is_empty()),
        }
    }
}

/// An authenticated session. Serialized as `{ token, model }` in the local store.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    #[serde(rename = "model")]
    profile: UserProfile,
}

impl Session {
    #[must_use]
    #[inline]
    pub const fn new(token: String, profile: UserProfile) -> Self {
        Self { token, profile }
    }

    #[must_use]
    #[inline]
    pub fn user_id(&self) -> &str {
        &self.profile.id
    }

    #[must_use]
    #[inline]
    pub fn token(&self) -> &str {
        &self.token
    }

    #[must_use]
    #[inline]
    pub const fn profile(&self) -> &UserProfile {
        &self.profile
    }
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl From<AuthRecord> for Session {
    fn from(auth: AuthRecord) -> Self {
        Self::new(auth.token, UserProfile::from(auth.record))
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Authenticating,
    Authenticated(Session),
}

/// Sign-up form data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub email: String,
    pub password: String,
    pub password_confirm: String,
    pub username: String,
}

impl Registration {
    /// # Errors
    /// Returns a validation error listing every offending field.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn validate(&self) -> Result<(), ClientError> {
        let mut fields = std::collections::BTreeMap::new();
        if !self.email.contains('@') {
            fields.insert(
                String::from("email"),
                String::from("Must be a valid email address."),
            );
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            fields.insert(
                String::from("password"),
                format!("Password must be at least {MIN_PASSWORD_LENGTH} characters."),
            );
        }
        if self.password != self.password_confirm {
            fields.insert(
                String::from("passwordConfirm"),
                String::from("Passwords do not match."),
            );
        }
        if self.username.trim().is_empty() {
            fields.insert(String::from("name"), String::from("Missing required value."));
        }
        if fields.is_empty() {
            return Ok(());
        }
        Err(ClientError::Validation {
            message: String::from("Failed to create user."),
            fields,
        })
    }
}

/// The current session, shared by all services.
pub struct SessionContext {
    state: RwLock<SessionState>,
    store: Arc<LocalStore>,
}

impl SessionContext {
    /// An anonymous context persisting into `store`.
    #[must_use]
    #[inline]
    pub fn new(store: Arc<LocalStore>) -> Self {
        Self {
            state: RwLock::new(SessionState::Anonymous),
            store,
        }
    }

    /// Rehydrates the session from the local store and validates it against the backend.
    /// Malformed or rejected credentials are discarded. A backend that cannot be reached keeps the
    /// stored session, which the next authenticated call will validate again.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub async fn restore<S: RecordStore + ?Sized>(&self, remote: &S) -> SessionState {
        let stored = match self.store.get::<Session>(AUTH_KEY) {
            Ok(Some(session)) if !session.token.is_empty() => session,
            Ok(Some(_)) | Err(_) => {
                warn!("Discarding malformed stored session");
                self.forget_stored();
                return self.set_state(SessionState::Anonymous).await;
            }
            Ok(None) => {
                info!("No stored session, starting anonymous");
                return self.set_state(SessionState::Anonymous).await;
            }
        };

        self.set_state(SessionState::Authenticating).await;
        match remote.auth_refresh(&stored.token).await {
            Ok(auth) => {
                let session = Session::from(auth);
                self.persist(&session);
                info!("Restored session for user {}", session.user_id());
                self.set_state(SessionState::Authenticated(session)).await
            }
            Err(ClientError::Transient(reason)) => {
                warn!("Could not validate stored session ({reason}), keeping it");
                self.set_state(SessionState::Authenticated(stored)).await
            }
            Err(err) => {
                info!("Stored session rejected: {err}");
                self.forget_stored();
                self.set_state(SessionState::Anonymous).await
            }
        }
    }

    /// # Errors
    /// Returns a validation error for blank credentials, otherwise whatever the backend reports.
    /// A rejected attempt leaves the context anonymous and clears the stored session.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn login<S: RecordStore + ?Sized>(
        &self,
        remote: &S,
        email: &str,
        password: &str,
    ) -> Result<Session, ClientError> {
        let email = email.trim();
        if email.is_empty() || password.is_empty() {
            return Err(ClientError::validation("Email and password are required."));
        }

        self.set_state(SessionState::Authenticating).await;
        match remote.auth_with_password(email, password).await {
            Ok(auth) => {
                let session = Session::from(auth);
                self.persist(&session);
                info!("Logged in user {}", session.user_id());
                self.set_state(SessionState::Authenticated(session.clone()))
                    .await;
                Ok(session)
            }
            Err(err) => {
                warn!("Login failed: {err}");
                self.forget_stored();
                self.set_state(SessionState::Anonymous).await;
                Err(err)
            }
        }
    }

    /// Creates the user, then logs in with the new credentials.
    /// # Errors
    /// Returns a validation error before any request if the form is invalid.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn register<S: RecordStore + ?Sized>(
        &self,
        remote: &S,
        registration: &Registration,
    ) -> Result<Session, ClientError> {
        registration.validate()?;
        let body = json!({
            "email": registration.email.trim(),
            "password": registration.password,
            "passwordConfirm": registration.password_confirm,
            "name": registration.username.trim(),
        });
        remote.create(Collection::Users, body, None).await?;
        self.login(remote, &registration.email, &registration.password)
            .await
    }

    /// Clears the in-memory session and the stored credentials.
    /// # Errors
    /// Fails if the local store cannot be written; the in-memory session is cleared regardless.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn logout(&self) -> Result<(), StorageError> {
        self.set_state(SessionState::Anonymous).await;
        info!("Logged out");
        self.store.remove(AUTH_KEY)
    }

    #[allow(clippy::missing_inline_in_public_items, reason = "Called on every request")]
    pub async fn current(&self) -> Option<Session> {
        match &*self.state.read().await {
            SessionState::Authenticated(session) => Some(session.clone()),
            SessionState::Anonymous | SessionState::Authenticating => None,
        }
    }

    /// The current session, or `Unauthenticated` without touching the network.
    /// # Errors
    /// Fails if no session is authenticated.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called on every request")]
    pub async fn require(&self) -> Result<Session, ClientError> {
        self.current().await.ok_or(ClientError::Unauthenticated)
    }

    #[inline]
    pub async fn is_authenticated(&self) -> bool {
        self.current().await.is_some()
    }

    #[inline]
    pub async fn state(&self) -> SessionState {
        self.state.read().await.clone()
    }

    async fn set_state(&self, state: SessionState) -> SessionState {
        let mut guard = self.state.write().await;
        *guard = state;
        guard.clone()
    }

    fn persist(&self, session: &Session) {
        if let Err(err) = self.store.set(AUTH_KEY, session) {
            error!("Failed to persist session: {err}");
        }
    }

    fn forget_stored(&self) {
        if let Err(err) = self.store.remove(AUTH_KEY) {
            error!("Failed to clear stored session: {err}");
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::testing::MemoryStore;
    use pretty_assertions::assert_eq;

    fn context() -> (SessionContext, Arc<LocalStore>) {
        let store = Arc::new(LocalStore::in_memory());
        (SessionContext::new(Arc::clone(&store)), store)
    }

    #[tokio::test]
    async fn login_authenticates_and_persists() {
        let remote = MemoryStore::new();
        let user_id = remote.add_user("reader@example.org", "correct horse");
        let (context, store) = context();

        let session = context
            .login(&remote, " reader@example.org ", "correct horse")
            .await
            .unwrap();
        assert_eq!(session.user_id(), user_id);
        assert_eq!(session.profile().name, "Reader");
        assert!(context.is_authenticated().await);
        assert_eq!(store.get::<Session>(AUTH_KEY).unwrap(), Some(session));
    }

    #[tokio::test]
    async fn failed_login_falls_back_to_anonymous() {
        let remote = MemoryStore::new();
        remote.add_user("reader@example.org", "correct horse");
        let (context, store) = context();

        let result = context.login(&remote, "reader@example.org", "wrong").await;
        assert!(matches!(result, Err(ClientError::Validation { .. })));
        assert_eq!(context.state().await, SessionState::Anonymous);
        assert_eq!(store.get::<Session>(AUTH_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn failed_relogin_drops_previous_session_everywhere() {
        let remote = MemoryStore::new();
        remote.add_user("reader@example.org", "correct horse");
        remote.add_user("other@example.org", "battery staple");
        let (context, store) = context();
        context
            .login(&remote, "reader@example.org", "correct horse")
            .await
            .unwrap();

        assert!(
            context
                .login(&remote, "other@example.org", "wrong")
                .await
                .is_err()
        );
        assert!(!context.is_authenticated().await);
        assert_eq!(store.get::<Session>(AUTH_KEY).unwrap(), None);

        let restarted = SessionContext::new(Arc::clone(&store));
        assert_eq!(restarted.restore(&remote).await, SessionState::Anonymous);
    }

    #[tokio::test]
    async fn blank_credentials_fail_without_network() {
        let remote = MemoryStore::new();
        let (context, _store) = context();
        assert!(context.login(&remote, "  ", "secret").await.is_err());
        assert_eq!(remote.calls(), 0);
    }

    #[tokio::test]
    async fn restore_refreshes_valid_stored_session() {
        let remote = MemoryStore::new();
        let user_id = remote.add_user("reader@example.org", "correct horse");
        let auth = remote.token_for(&user_id);
        let (context, store) = context();
        store.set(AUTH_KEY, &Session::from(auth.clone())).unwrap();

        let SessionState::Authenticated(session) = context.restore(&remote).await else {
            panic!("stored session should be restored");
        };
        assert_eq!(session.user_id(), user_id);
        assert_ne!(session.token(), auth.token);
        assert_eq!(store.get::<Session>(AUTH_KEY).unwrap(), Some(session));
    }

    #[tokio::test]
    async fn restore_discards_rejected_session() {
        let remote = MemoryStore::new();
        let (context, store) = context();
        let stale = Session::new(
            String::from("expired"),
            UserProfile::from(UserRecord {
                id: String::from("u1"),
                ..UserRecord::default()
            }),
        );
        store.set(AUTH_KEY, &stale).unwrap();

        assert_eq!(context.restore(&remote).await, SessionState::Anonymous);
        assert_eq!(store.get::<Session>(AUTH_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn restore_discards_malformed_session() {
        let remote = MemoryStore::new();
        let (context, store) = context();
        store.set(AUTH_KEY, &json!({ "token": 42 })).unwrap();

        assert_eq!(context.restore(&remote).await, SessionState::Anonymous);
        assert_eq!(remote.calls(), 0);
        assert!(store.get::<serde_json::Value>(AUTH_KEY).unwrap().is_none());
    }

    #[tokio::test]
    async fn restore_keeps_session_when_backend_unreachable() {
        let remote = MemoryStore::new();
        let user_id = remote.add_user("reader@example.org", "correct horse");
        let auth = remote.token_for(&user_id);
        let (context, store) = context();
        store.set(AUTH_KEY, &Session::from(auth)).unwrap();
        remote.fail_next(ClientError::Transient(String::from("connection reset")));

        assert!(matches!(
            context.restore(&remote).await,
            SessionState::Authenticated(_)
        ));
    }

    #[tokio::test]
    async fn register_validates_then_logs_in() {
        let remote = MemoryStore::new();
        let (context, _store) = context();
        let mut registration = Registration {
            email: String::from("new@example.org"),
            password: String::from("long enough"),
            password_confirm: String::from("different"),
            username: String::from("newbie"),
        };
        assert!(context.register(&remote, &registration).await.is_err());
        assert_eq!(remote.calls(), 0);

        registration.password_confirm = registration.password.clone();
        let session = context.register(&remote, &registration).await.unwrap();
        assert_eq!(session.profile().email, "new@example.org");
        assert_eq!(session.profile().name, "newbie");
    }

    #[test]
    fn registration_checks_form_fields() {
        let registration = Registration {
            email: String::from("new@example.org"),
            password: String::from("sixsix"),
            password_confirm: String::from("sixsix"),
            username: String::from("newbie"),
        };
        assert!(registration.validate().is_ok());

        let short = Registration {
            password: String::from("five5"),
            password_confirm: String::from("five5"),
            ..registration.clone()
        };
        let Err(ClientError::Validation { fields, .. }) = short.validate() else {
            panic!("short password must not validate");
        };
        assert_eq!(
            fields.get("password").map(String::as_str),
            Some("Password must be at least 6 characters.")
        );

        let blank = Registration {
            email: String::from("nobody"),
            username: String::from(" "),
            ..registration
        };
        let Err(ClientError::Validation { fields, .. }) = blank.validate() else {
            panic!("blank form must not validate");
        };
        assert_eq!(
            fields.keys().cloned().collect::<Vec<String>>(),
            vec![String::from("email"), String::from("name")]
        );
    }

    #[tokio::test]
    async fn logout_clears_state_and_store() {
        let remote = MemoryStore::new();
        remote.add_user("reader@example.org", "correct horse");
        let (context, store) = context();
        context
            .login(&remote, "reader@example.org", "correct horse")
            .await
            .unwrap();

        context.logout().await.unwrap();
        assert!(!context.is_authenticated().await);
        assert!(matches!(
            context.require().await,
            Err(ClientError::Unauthenticated)
        ));
        assert_eq!(store.get::<Session>(AUTH_KEY).unwrap(), None);
    }
}
