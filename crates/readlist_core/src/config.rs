//! Client configuration
//!
//! Read from `READLIST_*` environment variables, optionally seeded from a `.env` file. Every value
//! has a default, so an empty environment yields a client talking to a local backend.
use crate::errors::ConfigError;
use crate::reading_list::RetryPolicy;
use core::time::Duration;
use log::{debug, info};
use std::env;
use std::path::PathBuf;

pub const BACKEND_URL_VAR: &str = "READLIST_BACKEND_URL";
pub const METADATA_URL_VAR: &str = "READLIST_METADATA_URL";
pub const COVERS_URL_VAR: &str = "READLIST_COVERS_URL";
pub const REQUEST_TIMEOUT_VAR: &str = "READLIST_REQUEST_TIMEOUT_SECS";
pub const STORE_PATH_VAR: &str = "READLIST_STORE_PATH";

pub const DEFAULT_BACKEND_URL: &str = "http://127.0.0.1:8090";
pub const DEFAULT_METADATA_URL: &str = "https://openlibrary.org";
pub const DEFAULT_COVERS_URL: &str = "https://covers.openlibrary.org";
pub const DEFAULT_STORE_PATH: &str = "readlist-store.json";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Hosted record backend
    pub backend_url: String,
    /// Public metadata API
    pub metadata_url: String,
    /// Cover image host of the metadata API
    pub covers_url: String,
    /// Timeout of a single HTTP request
    pub request_timeout: Duration,
    /// Local store file holding the session and preferences
    pub store_path: PathBuf,
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    #[inline]
    fn default() -> Self {
        let request_timeout = Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS);
        Self {
            backend_url: String::from(DEFAULT_BACKEND_URL),
            metadata_url: String::from(DEFAULT_METADATA_URL),
            covers_url: String::from(DEFAULT_COVERS_URL),
            request_timeout,
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            retry: RetryPolicy {
                attempt_timeout: request_timeout,
                ..RetryPolicy::default()
            },
        }
    }
}

impl ClientConfig {
    /// Loads `.env` if present, then reads the process environment.
    /// # Errors
    /// Fails on a malformed URL or timeout value.
    #[allow(
        clippy::missing_inline_in_public_items,
        reason = "Called once at start of program"
    )]
    pub fn from_env() -> Result<Self, ConfigError> {
        if dotenvy::dotenv().is_err() {
            debug!("No .env file loaded, using process environment only");
        }
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source. Unset or blank variables take their
    /// defaults.
    /// # Errors
    /// Fails on a malformed URL or timeout value.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };
        let mut config = Self::default();

        if let Some(url) = read(BACKEND_URL_VAR) {
            config.backend_url = parse_url(BACKEND_URL_VAR, &url)?;
        }
        if let Some(url) = read(METADATA_URL_VAR) {
            config.metadata_url = parse_url(METADATA_URL_VAR, &url)?;
        }
        if let Some(url) = read(COVERS_URL_VAR) {
            config.covers_url = parse_url(COVERS_URL_VAR, &url)?;
        }
        if let Some(raw) = read(REQUEST_TIMEOUT_VAR) {
            let seconds = raw
                .parse::<u64>()
                .ok()
                .filter(|seconds| *seconds > 0)
                .ok_or_else(|| ConfigError::InvalidNumber {
                    key: String::from(REQUEST_TIMEOUT_VAR),
                    value: raw.clone(),
                })?;
            config.request_timeout = Duration::from_secs(seconds);
            config.retry.attempt_timeout = config.request_timeout;
        }
        if let Some(path) = read(STORE_PATH_VAR) {
            config.store_path = PathBuf::from(path);
        }

        info!(
            "Using backend {} and metadata API {}",
            config.backend_url, config.metadata_url
        );
        Ok(config)
    }
}

fn parse_url(key: &str, value: &str) -> Result<String, ConfigError> {
    let has_host = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .is_some_and(|rest| !rest.trim_matches('/').is_empty());
    if !has_host {
        return Err(ConfigError::InvalidUrl {
            key: key.to_owned(),
            value: value.to_owned(),
        });
    }
    Ok(value.trim_end_matches('/').to_owned())
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let vars = pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect::<HashMap<String, String>>();
        ClientConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        assert_eq!(config_from(&[]).unwrap(), ClientConfig::default());
        assert_eq!(
            config_from(&[(BACKEND_URL_VAR, "   ")]).unwrap().backend_url,
            DEFAULT_BACKEND_URL
        );
    }

    #[test]
    fn reads_every_variable() {
        let config = config_from(&[
            (BACKEND_URL_VAR, "https://db.example.org/"),
            (METADATA_URL_VAR, "http://localhost:9000"),
            (COVERS_URL_VAR, "https://img.example.org"),
            (REQUEST_TIMEOUT_VAR, "3"),
            (STORE_PATH_VAR, "/tmp/readlist.json"),
        ])
        .unwrap();
        assert_eq!(config.backend_url, "https://db.example.org");
        assert_eq!(config.metadata_url, "http://localhost:9000");
        assert_eq!(config.covers_url, "https://img.example.org");
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.attempt_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.store_path, PathBuf::from("/tmp/readlist.json"));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(matches!(
            config_from(&[(REQUEST_TIMEOUT_VAR, "soon")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[(REQUEST_TIMEOUT_VAR, "0")]),
            Err(ConfigError::InvalidNumber { .. })
        ));
        assert!(matches!(
            config_from(&[(BACKEND_URL_VAR, "db.example.org")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
        assert!(matches!(
            config_from(&[(COVERS_URL_VAR, "https://")]),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
