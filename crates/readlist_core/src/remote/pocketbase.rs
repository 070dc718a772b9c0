use crate::errors::ClientError;
use crate::remote::{AuthRecord, Collection, FileUpload, ListQuery, RecordPage, RecordStore};
use async_trait::async_trait;
use core::time::Duration;
use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::{ClientBuilder, RequestBuilder, Response, header};
use serde_json::{Map, Value, json};
use urlencoding::encode;

/// HTTP implementation of [`RecordStore`] for a PocketBase-compatible backend.
pub struct PocketBaseClient {
    /// Shared HTTP client used for every request against the backend
    http_client: reqwest::Client,
    /// Base URL without trailing slash, e.g. `https://db.example.org`
    base_url: String,
}

impl PocketBaseClient {
    /// Create a new client for the backend at `base_url`.
    /// # Errors
    /// Fails in case any of the reqwest `ClientBuilder` methods fail
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once per program run"
    )]
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );
        let http_client = ClientBuilder::new()
            .user_agent(concat!("readlist/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                ClientError::Unknown(format!("Failed to create HTTP client for backend: {err}"))
            })?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }

    #[must_use]
    #[inline]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn records_url(&self, collection: Collection) -> String {
        format!(
            "{}/api/collections/{}/records",
            self.base_url,
            collection.name()
        )
    }

    fn record_url(&self, collection: Collection, id: &str) -> String {
        format!("{}/{}", self.records_url(collection), encode(id))
    }

    fn auth_url(&self, action: &str) -> String {
        format!(
            "{}/api/collections/{}/{action}",
            self.base_url,
            Collection::Users.name()
        )
    }

    async fn send_json(request: RequestBuilder, token: Option<&str>) -> Result<Value, ClientError> {
        let response = Self::send(request, token).await?;
        Ok(response.json::<Value>().await?)
    }

    async fn send(request: RequestBuilder, token: Option<&str>) -> Result<Response, ClientError> {
        let request = match token {
            Some(token) => request.header(header::AUTHORIZATION, token),
            None => request,
        };
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let error = ClientError::from_response(status.as_u16(), &body);
        debug!("Backend answered {status}: {error}");
        Err(error)
    }
}

/// Query string pairs for a list call.
fn list_params(query: &ListQuery) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("page", query.page.to_string()),
        ("perPage", query.per_page.to_string()),
    ];
    if let Some(filter) = &query.filter {
        params.push(("filter", filter.to_string()));
    }
    if let Some(sort) = &query.sort {
        params.push(("sort", sort.clone()));
    }
    if let Some(expand) = &query.expand {
        params.push(("expand", expand.clone()));
    }
    params
}

/// Multipart form values are plain text; strings are sent without JSON quoting.
fn form_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[async_trait]
impl RecordStore for PocketBaseClient {
    async fn list(
        &self,
        collection: Collection,
        query: &ListQuery,
        token: Option<&str>,
    ) -> Result<RecordPage, ClientError> {
        let request = self
            .http_client
            .get(self.records_url(collection))
            .query(&list_params(query));
        let page = Self::send(request, token).await?.json::<RecordPage>().await?;
        Ok(page)
    }

    async fn get_one(
        &self,
        collection: Collection,
        id: &str,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let request = self.http_client.get(self.record_url(collection, id));
        Self::send_json(request, token).await
    }

    async fn create(
        &self,
        collection: Collection,
        body: Value,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let request = self.http_client.post(self.records_url(collection)).json(&body);
        Self::send_json(request, token).await
    }

    async fn create_with_file(
        &self,
        collection: Collection,
        fields: Map<String, Value>,
        file: FileUpload,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let mut form = Form::new();
        for (name, value) in fields {
            form = form.text(name, form_text(value));
        }
        let mut part = Part::bytes(file.bytes).file_name(file.file_name);
        if let Some(mime_type) = file.mime_type {
            part = part.mime_str(&mime_type)?;
        }
        form = form.part(file.field, part);

        let request = self
            .http_client
            .post(self.records_url(collection))
            .multipart(form);
        Self::send_json(request, token).await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        body: Value,
        token: Option<&str>,
    ) -> Result<Value, ClientError> {
        let request = self
            .http_client
            .patch(self.record_url(collection, id))
            .json(&body);
        Self::send_json(request, token).await
    }

    async fn delete(
        &self,
        collection: Collection,
        id: &str,
        token: Option<&str>,
    ) -> Result<(), ClientError> {
        let request = self.http_client.delete(self.record_url(collection, id));
        Self::send(request, token).await?;
        Ok(())
    }

    async fn auth_with_password(
        &self,
        identity: &str,
        password: &str,
    ) -> Result<AuthRecord, ClientError> {
        let request = self
            .http_client
            .post(self.auth_url("auth-with-password"))
            .json(&json!({ "identity": identity, "password": password }));
        let auth = Self::send(request, None).await?.json::<AuthRecord>().await?;
        Ok(auth)
    }

    async fn auth_refresh(&self, token: &str) -> Result<AuthRecord, ClientError> {
        let request = self.http_client.post(self.auth_url("auth-refresh"));
        match Self::send(request, Some(token)).await {
            Ok(response) => Ok(response.json::<AuthRecord>().await?),
            Err(error) => {
                warn!("Stored session token was not accepted: {error}");
                Err(error)
            }
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
    use crate::remote::Filter;
    use pretty_assertions::assert_eq;

    fn client() -> PocketBaseClient {
        PocketBaseClient::new("https://db.example.org/", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn builds_collection_urls() {
        let client = client();
        assert_eq!(client.base_url(), "https://db.example.org");
        assert_eq!(
            client.records_url(Collection::ReadingList),
            "https://db.example.org/api/collections/reading_list/records"
        );
        assert_eq!(
            client.record_url(Collection::Books, "abc 1"),
            "https://db.example.org/api/collections/books/records/abc%201"
        );
        assert_eq!(
            client.auth_url("auth-refresh"),
            "https://db.example.org/api/collections/users/auth-refresh"
        );
    }

    #[test]
    fn list_params_include_only_given_options() {
        let bare = list_params(&ListQuery::new(1, 50));
        assert_eq!(
            bare,
            vec![("page", "1".to_owned()), ("perPage", "50".to_owned())]
        );

        let query = ListQuery::new(1, 100)
            .with_filter(Filter::equals("user", "u1"))
            .with_sort("-created")
            .with_expand("book");
        let params = list_params(&query);
        assert_eq!(params[2], ("filter", r#"user = "u1""#.to_owned()));
        assert_eq!(params[3], ("sort", "-created".to_owned()));
        assert_eq!(params[4], ("expand", "book".to_owned()));
    }

    #[test]
    fn form_text_unquotes_strings() {
        assert_eq!(form_text(json!("Dune")), "Dune");
        assert_eq!(form_text(json!(4.5)), "4.5");
        assert_eq!(form_text(Value::Null), "");
    }
}
