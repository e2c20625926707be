//! Mutation adapters for the advertising platform.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use tracing::{debug, info};

use pipeline::{ActuationError, BidFraction, EntityId, Platform};

use crate::http::{error_body, join};
use crate::{ClientError, HttpEndpoint};

/// [`Platform`] over the platform's HTTP mutation endpoints.
///
/// - pause: `POST {base}/v1/entities/{id}:pause`
/// - bid reduction: `POST {base}/v1/entities/{id}:reduceBid` with
///   `{"fraction": "0.2"}`
#[derive(Debug, Clone)]
pub struct HttpPlatform {
    client: Client,
    base: Url,
}

impl HttpPlatform {
    /// Creates a client for the mutation endpoints under `endpoint`.
    pub fn new(endpoint: &HttpEndpoint) -> Result<Self, ClientError> {
        let (client, base) = endpoint.connect()?;
        Ok(Self { client, base })
    }

    async fn mutate(
        &self,
        entity: &EntityId,
        verb: &str,
        body: serde_json::Value,
    ) -> Result<(), ActuationError> {
        let segment = format!("{entity}:{verb}");
        let url = join(&self.base, &["v1", "entities", &segment])
            .map_err(|message| ActuationError::Transport { message })?;

        debug!(entity = %entity, verb, "Sending mutation");
        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ActuationError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(ActuationError::Rejected {
                status: status.as_u16(),
                body: error_body(response).await,
            })
        }
    }
}

#[async_trait]
impl Platform for HttpPlatform {
    async fn pause(&self, entity: &EntityId) -> Result<(), ActuationError> {
        self.mutate(entity, "pause", json!({})).await
    }

    async fn reduce_bid(
        &self,
        entity: &EntityId,
        fraction: BidFraction,
    ) -> Result<(), ActuationError> {
        self.mutate(
            entity,
            "reduceBid",
            json!({ "fraction": fraction.as_decimal() }),
        )
        .await
    }
}

/// [`Platform`] that records intended mutations in the log and changes nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunPlatform;

#[async_trait]
impl Platform for DryRunPlatform {
    async fn pause(&self, entity: &EntityId) -> Result<(), ActuationError> {
        info!(entity = %entity, "Dry run: would pause");
        Ok(())
    }

    async fn reduce_bid(
        &self,
        entity: &EntityId,
        fraction: BidFraction,
    ) -> Result<(), ActuationError> {
        info!(entity = %entity, fraction = %fraction, "Dry run: would reduce bid");
        Ok(())
    }
}
