use crate::errors::ClientError;
use crate::metadata::types::{
    CoverSize, OpenLibraryDoc, SearchResponse, SubjectResponse, WorkDetails,
};
use core::time::Duration;
use log::info;
use reqwest::{ClientBuilder, Response, header};
use serde::de::DeserializeOwned;
use urlencoding::encode;

/// Shown for books without any cover id.
pub const PLACEHOLDER_COVER_URL: &str = "https://via.placeholder.com/150";

/// Read-only client for the public book-metadata API.
pub struct MetadataClient {
    /// A HTTP client used to execute all GET requests against the metadata API
    http_client: reqwest::Client,
    /// Base URL of the metadata API, e.g. `https://openlibrary.org`
    base_url: String,
    /// Base URL of the cover image host, e.g. `https://covers.openlibrary.org`
    covers_url: String,
}

impl MetadataClient {
    /// Create a new HTTP request client, to be used for all subsequent metadata requests
    /// # Errors
    /// Fails in case any of the reqwest `ClientBuilder` methods fail
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per program run"
    )]
    pub fn new(base_url: &str, covers_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            header::HeaderValue::from_static("en-US,en;q=0.9"),
        );
        let client = ClientBuilder::new()
            .user_agent(concat!("readlist/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(Duration::from_secs(30))
            .build();

        client
            .map(|http_client| Self {
                http_client,
                base_url: base_url.trim_end_matches('/').to_owned(),
                covers_url: covers_url.trim_end_matches('/').to_owned(),
            })
            .map_err(|err| {
                ClientError::Unknown(format!("Failed to create HTTP client for metadata: {err}"))
            })
    }

    /// Full-text search over titles and authors.
    /// # Errors
    /// Returns a validation error for blank queries, otherwise fails if the request fails.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn search(&self, query: &str) -> Result<Vec<OpenLibraryDoc>, ClientError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ClientError::validation("search query must not be empty"));
        }
        let url = format!("{}/search.json?q={}", self.base_url, encode(query));
        let response: SearchResponse = self.get_json(&url).await?;
        info!("Metadata search for {query:?} returned {} docs", response.docs.len());
        Ok(response.docs)
    }

    /// Works listed under a subject, e.g. `science` or `fantasy`.
    /// # Errors
    /// Returns a validation error for blank subjects, otherwise fails if the request fails.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn subject(
        &self,
        subject: &str,
        limit: u32,
    ) -> Result<Vec<OpenLibraryDoc>, ClientError> {
        let subject = subject.trim().to_lowercase();
        if subject.is_empty() {
            return Err(ClientError::validation("subject must not be empty"));
        }
        let url = format!(
            "{}/subjects/{}.json?limit={limit}",
            self.base_url,
            encode(&subject)
        );
        let response: SubjectResponse = self.get_json(&url).await?;
        Ok(response.works.into_iter().map(OpenLibraryDoc::from).collect())
    }

    /// Details of one work. Accepts a bare id (`OL45804W`) or a work key (`/works/OL45804W`).
    /// # Errors
    /// Returns a validation error for blank ids, `NotFound` for unknown works.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn work(&self, work_id: &str) -> Result<WorkDetails, ClientError> {
        let work_id = work_key_to_id(work_id);
        if work_id.is_empty() {
            return Err(ClientError::validation("work id must not be empty"));
        }
        let url = format!("{}/works/{}.json", self.base_url, encode(work_id));
        self.get_json(&url).await
    }

    #[must_use]
    #[inline]
    pub fn cover_url(&self, cover_id: Option<i64>, size: CoverSize) -> String {
        cover_url(&self.covers_url, cover_id, size)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        let response = self.http_client.get(url).send().await?;
        Ok(check_status(response).await?.json::<T>().await?)
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::from_response(status.as_u16(), &body))
}

/// Builds the image URL for a numeric cover id, falling back to a placeholder.
#[must_use]
#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
pub fn cover_url(covers_base: &str, cover_id: Option<i64>, size: CoverSize) -> String {
    match cover_id {
        Some(id) if id > 0 => format!(
            "{}/b/id/{id}-{}.jpg",
            covers_base.trim_end_matches('/'),
            size.suffix()
        ),
        _ => PLACEHOLDER_COVER_URL.to_owned(),
    }
}

/// Strips the `/works/` prefix off a work key.
#[must_use]
#[inline]
pub fn work_key_to_id(key: &str) -> &str {
    let key = key.trim();
    key.strip_prefix("/works/").unwrap_or(key)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn client() -> MetadataClient {
        MetadataClient::new(
            "https://openlibrary.org/",
            "https://covers.openlibrary.org",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn cover_url_uses_size_suffix() {
        assert_eq!(
            cover_url("https://covers.openlibrary.org/", Some(6_424_091), CoverSize::Medium),
            "https://covers.openlibrary.org/b/id/6424091-M.jpg"
        );
        assert_eq!(
            client().cover_url(Some(1), CoverSize::Large),
            "https://covers.openlibrary.org/b/id/1-L.jpg"
        );
    }

    #[test]
    fn cover_url_falls_back_to_placeholder() {
        assert_eq!(cover_url("https://c", None, CoverSize::Small), PLACEHOLDER_COVER_URL);
        assert_eq!(cover_url("https://c", Some(0), CoverSize::Small), PLACEHOLDER_COVER_URL);
    }

    #[test]
    fn strips_work_key_prefix() {
        assert_eq!(work_key_to_id("/works/OL45804W"), "OL45804W");
        assert_eq!(work_key_to_id("OL45804W"), "OL45804W");
    }

    #[tokio::test]
    async fn blank_inputs_fail_before_any_request() {
        let client = client();
        assert!(matches!(
            client.search("   ").await,
            Err(ClientError::Validation { .. })
        ));
        assert!(matches!(
            client.subject("", 10).await,
            Err(ClientError::Validation { .. })
        ));
        assert!(matches!(
            client.work("/works/").await,
            Err(ClientError::Validation { .. })
        ));
    }
}
