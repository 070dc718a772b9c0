use crate::errors::ClientError;
use crate::metadata::client::MetadataClient;
use crate::metadata::types::{OpenLibraryDoc, WorkDetails};

/// Default number of works fetched for a subject listing.
pub const DEFAULT_SUBJECT_LIMIT: u32 = 20;

pub trait RequestState {}
#[allow(clippy::exhaustive_structs, reason = "Empty state will remain empty")]
pub struct EmptyState;
pub struct QueryState(String);
pub struct SubjectState(String, u32);
pub struct WorkState(String);

impl RequestState for EmptyState {}
impl RequestState for QueryState {}
impl RequestState for SubjectState {}
impl RequestState for WorkState {}

/// Builder for constructing a metadata request.
pub struct MetadataRequestBuilder<T: RequestState> {
    /// Represents what is being looked up: nothing yet, a search query, a subject or a work id
    state: T,
}

impl Default for MetadataRequestBuilder<EmptyState> {
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataRequestBuilder<EmptyState> {
    /// Constructor function for default empty state. Use this in combination with any of the other
    /// generic implementations to construct a new `MetadataRequestBuilder` and modify its state.
    const fn new() -> Self {
        Self { state: EmptyState }
    }

    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn with_query(self, query: &str) -> MetadataRequestBuilder<QueryState> {
        MetadataRequestBuilder {
            state: QueryState(query.to_owned()),
        }
    }

    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn with_subject(self, subject: &str) -> MetadataRequestBuilder<SubjectState> {
        MetadataRequestBuilder {
            state: SubjectState(subject.to_owned(), DEFAULT_SUBJECT_LIMIT),
        }
    }

    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn with_work_id(self, work_id: &str) -> MetadataRequestBuilder<WorkState> {
        MetadataRequestBuilder {
            state: WorkState(work_id.to_owned()),
        }
    }
}

impl MetadataRequestBuilder<QueryState> {
    /// Execute the search request
    /// # Errors
    /// Returns an error if the query is blank or the HTTP request fails
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn execute(
        &self,
        client: &MetadataClient,
    ) -> Result<Vec<OpenLibraryDoc>, ClientError> {
        client.search(&self.state.0).await
    }
}

impl MetadataRequestBuilder<SubjectState> {
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn with_limit(self, limit: u32) -> Self {
        Self {
            state: SubjectState(self.state.0, limit),
        }
    }

    /// Execute the subject browse request
    /// # Errors
    /// Returns an error if the subject is blank or the HTTP request fails
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn execute(
        &self,
        client: &MetadataClient,
    ) -> Result<Vec<OpenLibraryDoc>, ClientError> {
        client.subject(&self.state.0, self.state.1).await
    }
}

impl MetadataRequestBuilder<WorkState> {
    /// Execute the work details request
    /// # Errors
    /// Returns an error if the id is blank, the work does not exist or the HTTP request fails
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn execute(&self, client: &MetadataClient) -> Result<WorkDetails, ClientError> {
        client.work(&self.state.0).await
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use core::time::Duration;

    #[test]
    fn subject_limit_defaults_and_overrides() {
        let request = MetadataRequestBuilder::default().with_subject("crime");
        assert_eq!(request.state.1, DEFAULT_SUBJECT_LIMIT);
        let request = request.with_limit(5);
        assert_eq!(request.state.0, "crime");
        assert_eq!(request.state.1, 5);
    }

    #[tokio::test]
    async fn blank_query_is_rejected_through_builder() {
        let client = MetadataClient::new(
            "https://openlibrary.org",
            "https://covers.openlibrary.org",
            Duration::from_secs(5),
        )
        .unwrap();
        let result = MetadataRequestBuilder::default()
            .with_query(" ")
            .execute(&client)
            .await;
        assert!(matches!(result, Err(ClientError::Validation { .. })));
    }
}
