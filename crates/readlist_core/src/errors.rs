//! Error types
//!
//! `ClientError` is the failure taxonomy shared by the remote adapter, the metadata client and
//! the services built on top of them. Storage and configuration failures have their own enums.
use serde::Deserialize;
use std::collections::BTreeMap;

/// Failure of any call against the hosted backend or the metadata API.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// No valid session, or the remote rejected the session token.
    #[error("not authenticated")]
    Unauthenticated,
    /// The referenced record does not exist (anymore).
    #[error("record not found: {0}")]
    NotFound(String),
    /// Timeouts, cancellations and server-side failures. Eligible for retry.
    #[error("transient failure: {0}")]
    Transient(String),
    /// The remote rejected the payload. `fields` holds per-field messages.
    #[error("{}", render_validation(.message, .fields))]
    Validation {
        message: String,
        fields: BTreeMap<String, String>,
    },
    /// Anything not covered above.
    #[error("unexpected failure: {0}")]
    Unknown(String),
}

impl ClientError {
    /// Shorthand for a validation failure without field details.
    #[must_use]
    #[inline]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    #[inline]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    #[must_use]
    #[inline]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Whether the caller should send the user to the login screen.
    #[must_use]
    #[inline]
    pub const fn requires_login(&self) -> bool {
        matches!(self, Self::Unauthenticated)
    }

    /// Maps a non-success HTTP response onto the taxonomy. `body` is the raw response body, which
    /// for the hosted backend is a JSON object with `message` and per-field `data` entries.
    #[must_use]
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed = serde_json::from_str::<ErrorBody>(body).ok();
        let message = parsed
            .as_ref()
            .map(|error_body| error_body.message.trim().to_owned())
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| format!("request failed with status {status}"));

        match status {
            400 | 422 => {
                let fields = parsed
                    .map(|error_body| {
                        error_body
                            .data
                            .into_iter()
                            .map(|(field, detail)| (field, detail.message))
                            .collect()
                    })
                    .unwrap_or_default();
                Self::Validation { message, fields }
            }
            401 | 403 => Self::Unauthenticated,
            404 => Self::NotFound(message),
            408 | 429 | 500..=599 => Self::Transient(message),
            _ => Self::Unknown(message),
        }
    }
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() || error.is_request() {
            return Self::Transient(error.to_string());
        }
        match error.status() {
            Some(status) => Self::from_response(status.as_u16(), ""),
            None => Self::Unknown(error.to_string()),
        }
    }
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl From<serde_json::Error> for ClientError {
    fn from(error: serde_json::Error) -> Self {
        Self::Unknown(format!("malformed record: {error}"))
    }
}

/// Error body returned by the hosted backend on failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: BTreeMap<String, FieldError>,
}

#[derive(Debug, Deserialize)]
struct FieldError {
    #[serde(default)]
    message: String,
}

fn render_validation(message: &str, fields: &BTreeMap<String, String>) -> String {
    if fields.is_empty() {
        return message.to_owned();
    }
    let details = fields
        .iter()
        .map(|(field, detail)| format!("{field}: {detail}"))
        .collect::<Vec<String>>()
        .join("\n");
    format!("{message}\n{details}")
}

/// Failures of the local key-value store.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("failed to access local store: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to (de)serialize local store entry: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("local store lock poisoned")]
    Poisoned,
}

/// Invalid configuration values.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} must be a positive integer, got {value:?}")]
    InvalidNumber { key: String, value: String },

    #[error("{key} must be an http(s) URL, got {value:?}")]
    InvalidUrl { key: String, value: String },
}

/// Failures while starting up or driving [`crate::app::LibraryApp`].
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn maps_status_codes_onto_taxonomy() {
        assert!(ClientError::from_response(401, "").requires_login());
        assert!(ClientError::from_response(403, "").requires_login());
        assert!(ClientError::from_response(404, "").is_not_found());
        assert!(ClientError::from_response(503, "").is_transient());
        assert!(ClientError::from_response(429, "").is_transient());
        assert!(matches!(
            ClientError::from_response(418, ""),
            ClientError::Unknown(_)
        ));
    }

    #[test]
    fn validation_keeps_server_message_and_fields() {
        let body = r#"{
            "code": 400,
            "message": "Failed to create record.",
            "data": {
                "title": {"code": "validation_required", "message": "Missing required value."},
                "type": {"code": "validation_invalid", "message": "Invalid value."}
            }
        }"#;
        let error = ClientError::from_response(400, body);
        let ClientError::Validation { message, fields } = &error else {
            panic!("expected validation error, got {error:?}");
        };
        assert_eq!(message, "Failed to create record.");
        assert_eq!(fields.len(), 2);
        assert_eq!(
            error.to_string(),
            "Failed to create record.\ntitle: Missing required value.\ntype: Invalid value."
        );
    }

    #[test]
    fn falls_back_to_status_message_for_unparseable_bodies() {
        let error = ClientError::from_response(404, "<html>gone</html>");
        assert_eq!(
            error.to_string(),
            "record not found: request failed with status 404"
        );
    }
}
