//! Remote record store
//!
//! Transport seam towards the hosted backend. [`RecordStore`] is a pure CRUD wrapper over the
//! record collections: no retries, no merging. [`pocketbase::PocketBaseClient`] is the HTTP
//! implementation used by the application.
pub mod filter;
pub mod pocketbase;

use crate::errors::ClientError;
use async_trait::async_trait;
use core::fmt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use filter::Filter;

/// Record collections consumed by the application.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Books,
    ReadingList,
    Ratings,
    Users,
}

impl Collection {
    #[must_use]
    #[inline]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::ReadingList => "reading_list",
            Self::Ratings => "ratings",
            Self::Users => "users",
        }
    }
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl fmt::Display for Collection {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.name())
    }
}

/// Parameters of a list call: pagination plus optional filter, sort and relation expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub per_page: u32,
    pub filter: Option<Filter>,
    pub sort: Option<String>,
    pub expand: Option<String>,
}

impl ListQuery {
    #[must_use]
    #[inline]
    pub const fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            filter: None,
            sort: None,
            expand: None,
        }
    }

    #[must_use]
    #[inline]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Sort expression, e.g. `-created` for newest first.
    #[must_use]
    #[inline]
    pub fn with_sort(mut self, sort: &str) -> Self {
        self.sort = Some(sort.to_owned());
        self
    }

    /// Name of a relation field whose target record is embedded under `expand`.
    #[must_use]
    #[inline]
    pub fn with_expand(mut self, relation: &str) -> Self {
        self.expand = Some(relation.to_owned());
        self
    }
}

/// One page of raw records.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub total_pages: u32,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl RecordPage {
    #[must_use]
    #[inline]
    pub const fn new(page: u32, per_page: u32, total_items: u64, items: Vec<Value>) -> Self {
        let total_pages = if per_page == 0 {
            0
        } else {
            #[allow(
                clippy::cast_possible_truncation,
                reason = "Page counts of a single user's records stay far below u32::MAX"
            )]
            let pages = total_items.div_ceil(per_page as u64) as u32;
            pages
        };
        Self {
            page,
            per_page,
            total_items,
            total_pages,
            items,
        }
    }
}

/// A file attached to a record on creation, sent as multipart form data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    /// Record field the file is stored under
    pub field: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// User record as returned by the auth endpoints.
#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub created: String,
}

/// Successful authentication: a fresh token and the authenticated user.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRecord {
    pub token: String,
    pub record: UserRecord,
}

impl AuthRecord {
    #[must_use]
    #[inline]
    pub const fn new(token: String, record: UserRecord) -> Self {
        Self { token, record }
    }
}

/// CRUD access to the hosted backend's record collections.
///
/// Every call takes the session token explicitly; `None` issues an anonymous request.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
        token: Option<&str>,
    ) -> Result<RecordPage, ClientError>;

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        token: Option<&str>,
    ) -> Result<Value, ClientError>;

    async fn create(
        &self,
        collection: Collection,
        body: Value,
        token: Option<&str>,
    ) -> Result<Value, ClientError>;

    async fn create_with_file(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
        file: FileUpload,
        token: Option<&str>,
    ) -> Result<Value, ClientError>;

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        token: Option<&str>,
    ) -> Result<Value, ClientError>;

    async fn delete(
        &self,
        collection: Collection,
        id: &str,
        token: Option<&str>,
    ) -> Result<(), ClientError>;

    /// Password authentication against the users collection.
    async fn auth_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AuthRecord, ClientError>;

    /// Validates `token` and returns a refreshed one.
    async fn auth_refresh(&self, token: &str) -> Result<AuthRecord, ClientError>;
}
