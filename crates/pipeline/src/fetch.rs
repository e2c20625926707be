//! Paginated retrieval of metric records.
//!
//! [`PageFetcher`] walks a [`MetricsSource`] one page at a time, threading the
//! continuation token from each response into the next request. It never holds
//! more than the current page: the caller consumes each [`Page`] before asking
//! for the next one.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    DateRange, EntityKind, FetchError, MetricName, MetricRecord, MetricsSource, PageSize, PageToken,
};

// ---------------------------------------------------------------------------
// Request / response shapes
// ---------------------------------------------------------------------------

/// Which entities a report covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    /// Hierarchy level to report on.
    pub kind: EntityKind,
    /// Restrict to entities currently serving.
    pub enabled_only: bool,
}

/// Stable sort key for report rows.
///
/// Must be unique and stable across pages so pagination neither skips nor
/// repeats a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKey {
    /// Ascending platform entity identifier.
    #[default]
    EntityId,
}

/// Everything about a report query except the position within it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportQuery {
    /// Entities to include.
    pub filter: EntityFilter,
    /// Reporting window.
    pub date_range: DateRange,
    /// Metric columns to return.
    pub fields: Vec<MetricName>,
    /// Row ordering.
    pub order_by: OrderKey,
    /// Maximum rows per page.
    pub page_size: PageSize,
}

/// A single page request: the query plus the cursor to resume from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// The report query, identical for every page of one run.
    #[serde(flatten)]
    pub query: ReportQuery,
    /// `None` for the first page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_token: Option<PageToken>,
}

/// One page of report rows.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Page {
    /// Rows in order-key order.
    pub records: Vec<MetricRecord>,
    /// Cursor for the next page; `None` when the result set is exhausted.
    pub next_page_token: Option<PageToken>,
}

// ---------------------------------------------------------------------------
// Fetcher
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Cursor {
    Start,
    At(PageToken),
    Exhausted,
}

/// Lazy, finite sequence of pages from a [`MetricsSource`].
///
/// Restartable from the beginning with [`PageFetcher::restart`]; there is no
/// way to resume in the middle of a page.
pub struct PageFetcher<'a> {
    source: &'a dyn MetricsSource,
    query: ReportQuery,
    cursor: Cursor,
    pages_fetched: u64,
    /// Tokens already sent since the last (re)start.
    sent: HashSet<PageToken>,
}

impl<'a> PageFetcher<'a> {
    /// Creates a fetcher positioned before the first page.
    pub fn new(source: &'a dyn MetricsSource, query: ReportQuery) -> Self {
        Self {
            source,
            query,
            cursor: Cursor::Start,
            pages_fetched: 0,
            sent: HashSet::new(),
        }
    }

    /// Requests the next page.
    ///
    /// Returns `Ok(None)` once the source has reported that no further pages
    /// exist. Errors are returned unchanged; the fetcher does not retry and
    /// stays positioned on the failed page.
    pub async fn next_page(&mut self) -> Result<Option<Page>, FetchError> {
        let page_token = match &self.cursor {
            Cursor::Exhausted => return Ok(None),
            Cursor::Start => None,
            Cursor::At(token) => Some(token.clone()),
        };

        let request = PageRequest {
            query: self.query.clone(),
            page_token,
        };
        let page = self.source.fetch_page(&request).await?;
        self.pages_fetched += 1;

        if let Some(sent) = request.page_token {
            self.sent.insert(sent);
        }
        if let Some(received) = &page.next_page_token {
            if self.sent.contains(received) {
                return Err(FetchError::StalledCursor {
                    token: received.clone(),
                });
            }
        }

        debug!(
            page = self.pages_fetched,
            rows = page.records.len(),
            has_more = page.next_page_token.is_some(),
            "Fetched report page"
        );

        self.cursor = match &page.next_page_token {
            Some(token) => Cursor::At(token.clone()),
            None => Cursor::Exhausted,
        };
        Ok(Some(page))
    }

    /// `true` once the last page has been returned.
    pub fn is_exhausted(&self) -> bool {
        self.cursor == Cursor::Exhausted
    }

    /// Number of pages successfully retrieved since the last (re)start.
    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Rewinds to before the first page.
    pub fn restart(&mut self) {
        self.cursor = Cursor::Start;
        self.pages_fetched = 0;
        self.sent.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::NaiveDate;

    use crate::EntityId;

    /// Serves fixed pages keyed by the incoming token and records each request.
    struct ScriptedSource {
        pages: Vec<(Option<&'static str>, Page)>,
        requests: Mutex<Vec<Option<PageToken>>>,
    }

    #[async_trait]
    impl MetricsSource for ScriptedSource {
        async fn fetch_page(&self, request: &PageRequest) -> Result<Page, FetchError> {
            self.requests
                .lock()
                .unwrap()
                .push(request.page_token.clone());
            let wanted = request.page_token.as_ref().map(|t| t.as_str());
            self.pages
                .iter()
                .find(|(token, _)| *token == wanted)
                .map(|(_, page)| page.clone())
                .ok_or_else(|| FetchError::Rejected {
                    status: 400,
                    body: "unknown token".into(),
                })
        }
    }

    fn query() -> ReportQuery {
        ReportQuery {
            filter: EntityFilter {
                kind: EntityKind::Keyword,
                enabled_only: true,
            },
            date_range: DateRange::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 1, 31).unwrap(),
            )
            .unwrap(),
            fields: vec![MetricName::new("cost").unwrap()],
            order_by: OrderKey::EntityId,
            page_size: PageSize::new(2).unwrap(),
        }
    }

    fn page(ids: &[&str], next: Option<&str>) -> Page {
        Page {
            records: ids
                .iter()
                .map(|id| MetricRecord {
                    id: EntityId::new(*id).unwrap(),
                    name: id.to_string(),
                    micros: BTreeMap::new(),
                    values: BTreeMap::new(),
                    malformed: BTreeMap::new(),
                })
                .collect(),
            next_page_token: next.map(|t| PageToken::new(t).unwrap()),
        }
    }

    #[tokio::test]
    async fn test_follows_tokens_until_exhausted() {
        let source = ScriptedSource {
            pages: vec![
                (None, page(&["a", "b"], Some("t1"))),
                (Some("t1"), page(&["c", "d"], Some("t2"))),
                (Some("t2"), page(&["e"], None)),
            ],
            requests: Mutex::new(Vec::new()),
        };
        let mut fetcher = PageFetcher::new(&source, query());

        let mut ids = Vec::new();
        while let Some(page) = fetcher.next_page().await.unwrap() {
            ids.extend(page.records.into_iter().map(|r| r.id.to_string()));
        }

        assert_eq!(ids, vec!["a", "b", "c", "d", "e"]);
        assert_eq!(fetcher.pages_fetched(), 3);
        assert!(fetcher.is_exhausted());
        // Exhausted fetchers do not hit the source again.
        assert!(fetcher.next_page().await.unwrap().is_none());
        assert_eq!(source.requests.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_restart_begins_from_first_page() {
        let source = ScriptedSource {
            pages: vec![(None, page(&["a"], None))],
            requests: Mutex::new(Vec::new()),
        };
        let mut fetcher = PageFetcher::new(&source, query());
        assert!(fetcher.next_page().await.unwrap().is_some());
        assert!(fetcher.next_page().await.unwrap().is_none());

        fetcher.restart();
        assert!(!fetcher.is_exhausted());
        let again = fetcher.next_page().await.unwrap().unwrap();
        assert_eq!(again.records[0].id.as_str(), "a");
        assert_eq!(*source.requests.lock().unwrap(), vec![None, None]);
    }

    #[tokio::test]
    async fn test_source_error_is_returned_unchanged() {
        let source = ScriptedSource {
            pages: vec![(None, page(&["a"], Some("missing")))],
            requests: Mutex::new(Vec::new()),
        };
        let mut fetcher = PageFetcher::new(&source, query());
        fetcher.next_page().await.unwrap();
        let err = fetcher.next_page().await.unwrap_err();
        assert!(matches!(err, FetchError::Rejected { status: 400, .. }));
        assert!(!fetcher.is_exhausted());
    }

    #[tokio::test]
    async fn test_repeated_token_is_reported_as_stalled() {
        let source = ScriptedSource {
            pages: vec![
                (None, page(&["a"], Some("loop"))),
                (Some("loop"), page(&["b"], Some("loop"))),
            ],
            requests: Mutex::new(Vec::new()),
        };
        let mut fetcher = PageFetcher::new(&source, query());
        fetcher.next_page().await.unwrap();
        let err = fetcher.next_page().await.unwrap_err();
        assert!(matches!(err, FetchError::StalledCursor { .. }));
    }

    #[tokio::test]
    async fn test_token_cycle_is_reported_as_stalled() {
        let source = ScriptedSource {
            pages: vec![
                (None, page(&["a"], Some("t1"))),
                (Some("t1"), page(&["b"], Some("t2"))),
                (Some("t2"), page(&["c"], Some("t1"))),
            ],
            requests: Mutex::new(Vec::new()),
        };
        let mut fetcher = PageFetcher::new(&source, query());
        fetcher.next_page().await.unwrap();
        fetcher.next_page().await.unwrap();
        let err = fetcher.next_page().await.unwrap_err();
        assert!(matches!(
            err,
            FetchError::StalledCursor { ref token } if token.as_str() == "t1"
        ));

        fetcher.restart();
        assert!(fetcher.next_page().await.unwrap().is_some());
        assert!(fetcher.next_page().await.unwrap().is_some());
    }

    #[test]
    fn test_page_request_wire_shape() {
        let request = PageRequest {
            query: query(),
            page_token: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["filter"]["kind"], "keyword");
        assert_eq!(json["order_by"], "entity_id");
        assert_eq!(json["page_size"], 2);
        assert!(json.get("page_token").is_none());
    }
}
