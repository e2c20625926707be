//! Report source over HTTP.
//!
//! `POST {base}/v1/reports:query` with the serialised [`PageRequest`] as the
//! body. The response carries the rows of one page and, unless it is the last
//! page, a continuation token:
//!
//! ```json
//! {
//!   "rows": [{ "id": "123", "name": "shoes", "metrics": { "cost": 1500000000 } }],
//!   "next_page_token": "CAE"
//! }
//! ```
//!
//! An absent or empty `next_page_token` ends pagination. Only a response that
//! cannot be parsed as this envelope is a [`FetchError::Decode`]; a metric
//! cell that does not match the [`MetricSchema`] rejects just its row.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use tracing::debug;

use pipeline::{
    EntityId, FetchError, MetricSchema, MetricsSource, Page, PageRequest, PageToken,
};

use crate::http::{error_body, join};
use crate::{ClientError, HttpEndpoint};

#[derive(Debug, Deserialize)]
struct WireRow {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    metrics: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    rows: Vec<WireRow>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// [`MetricsSource`] backed by an HTTP report endpoint.
#[derive(Debug, Clone)]
pub struct HttpMetricsSource {
    client: Client,
    base: Url,
    schema: MetricSchema,
}

impl HttpMetricsSource {
    /// Creates a source for `endpoint`, decoding rows with `schema`.
    pub fn new(endpoint: &HttpEndpoint, schema: MetricSchema) -> Result<Self, ClientError> {
        let (client, base) = endpoint.connect()?;
        Ok(Self {
            client,
            base,
            schema,
        })
    }

    fn decode(&self, response: WireResponse) -> Result<Page, FetchError> {
        let records = response
            .rows
            .into_iter()
            .map(|row| {
                let id = EntityId::new(row.id).ok_or_else(|| FetchError::Decode {
                    message: "row with an empty entity id".to_string(),
                })?;
                Ok(self.schema.assemble(id, row.name, row.metrics))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            records,
            next_page_token: response.next_page_token.and_then(PageToken::new),
        })
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
        let url = join(&self.base, &["v1", "reports:query"])
            .map_err(|message| FetchError::Transport { message })?;

        let response = self
            .client
            .post(url)
            .json(request)
            .send()
            .await
            .map_err(|e| FetchError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Rejected {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        let wire: WireResponse = response.json().await.map_err(|e| FetchError::Decode {
            message: e.to_string(),
        })?;
        debug!(rows = wire.rows.len(), "Report page received");
        self.decode(wire)
    }
}
