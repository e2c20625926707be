//! Summary delivery.

use std::path::PathBuf;

use async_trait::async_trait;
use reqwest::{Client, Url};
use tracing::{info, warn};

use pipeline::{Notifier, NotifyError, RunSummary};

use crate::http::error_body;
use crate::{ClientError, HttpEndpoint};

/// Writes the summary to the log: one structured event with the counters,
/// plus the human-readable report at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        let termination = summary.termination.to_string();
        if summary.termination.is_success() {
            info!(
                run_id = %summary.run_id,
                termination = %termination,
                applied = summary.applied,
                failed = summary.failed,
                skipped = summary.skipped,
                "Run finished"
            );
        } else {
            warn!(
                run_id = %summary.run_id,
                termination = %termination,
                applied = summary.applied,
                failed = summary.failed,
                skipped = summary.skipped,
                "Run aborted"
            );
        }
        info!("\n{summary}");
        Ok(())
    }
}

/// Writes the summary as pretty-printed JSON to a file.
#[derive(Debug, Clone)]
pub struct JsonFileNotifier {
    path: PathBuf,
}

impl JsonFileNotifier {
    /// Creates a notifier that overwrites `path` on every run.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Notifier for JsonFileNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        let json = serde_json::to_vec_pretty(summary)
            .map_err(|e| NotifyError::new(format!("summary serialisation failed: {e}")))?;
        tokio::fs::write(&self.path, json).await.map_err(|e| {
            NotifyError::new(format!("cannot write {}: {e}", self.path.display()))
        })?;
        info!(path = %self.path.display(), "Summary written");
        Ok(())
    }
}

/// POSTs the summary as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    /// The endpoint's base URL is used as-is as the webhook target.
    pub fn new(endpoint: &HttpEndpoint) -> Result<Self, ClientError> {
        let (client, url) = endpoint.connect()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, summary: &RunSummary) -> Result<(), NotifyError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(summary)
            .send()
            .await
            .map_err(|e| NotifyError::new(format!("webhook request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::new(format!(
                "webhook returned {}: {}",
                status.as_u16(),
                error_body(response).await
            )));
        }
        Ok(())
    }
}
