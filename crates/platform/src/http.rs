//! Shared HTTP plumbing for the adapters.

use std::time::Duration;

use reqwest::{Client, Url};
use serde::Deserialize;

use crate::ClientError;

/// Maximum number of response-body characters kept in error details.
const MAX_ERROR_BODY: usize = 512;

/// Where an adapter sends its requests.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpEndpoint {
    /// Absolute base URL; adapter paths are appended to it.
    pub base_url: String,
    /// Per-request timeout in seconds. Must be at least 1.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl HttpEndpoint {
    /// Creates an endpoint with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout_secs: default_timeout_secs(),
        }
    }

    /// Parses the base URL and builds a client with the configured timeout.
    pub(crate) fn connect(&self) -> Result<(Client, Url), ClientError> {
        let base = Url::parse(&self.base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: self.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: self.base_url.clone(),
                reason: "expected an http or https URL".to_string(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::InvalidTimeout);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(self.timeout_secs))
            .build()?;
        Ok((client, base))
    }
}

/// Appends path segments to `base`, percent-encoding each one.
pub(crate) fn join(base: &Url, segments: &[&str]) -> Result<Url, String> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| format!("{base} cannot be a base URL"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Reads an error response body, truncated for diagnostics.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    if body.chars().count() > MAX_ERROR_BODY {
        let truncated: String = body.chars().take(MAX_ERROR_BODY).collect();
        format!("{truncated}…")
    } else {
        body
    }
}
