//! Client for the upstream content API (spec.md section 6): bit-exact paths
//! relative to a configured base URL, fronted by a token-bucket limiter and a
//! bounded-concurrency fan-out for batch fetches.

use crate::model::enums::ItemKind;
use crate::model::item::EnrichedItem;
use futures::stream::{self, StreamExt};
use governor::{Quota, RateLimiter};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request to {url} timed out")]
    Timeout { url: String },
    #[error("request to {url} failed: {source}")]
    Request { url: String, #[source] source: reqwest::Error },
    #[error("malformed response from {url}: {source}")]
    Decode { url: String, #[source] source: reqwest::Error },
}

/// Raw shape of `GET /item/{id}.json`, before front-page enrichment.
#[derive(Debug, Clone, Deserialize)]
pub struct RawItem {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub dead: bool,
    pub title: Option<String>,
    pub url: Option<String>,
    pub text: Option<String>,
    pub by: Option<String>,
    pub time: Option<i64>,
    pub score: Option<i32>,
    pub descendants: Option<i32>,
    pub parent: Option<i64>,
    pub kids: Option<Vec<i64>>,
}

impl RawItem {
    /// Folds in a front-page observation to produce the row the store writes.
    /// Unrecognized `kind` strings fall back to [`ItemKind::Story`] rather
    /// than failing the whole batch over one odd record.
    pub fn enrich(self, is_front_page: bool) -> EnrichedItem {
        let kind = self.kind.parse().unwrap_or(ItemKind::Story);
        EnrichedItem {
            id: self.id,
            kind,
            deleted: self.deleted,
            dead: self.dead,
            title: self.title,
            url: self.url,
            text: self.text,
            author: self.by,
            external_time: self.time,
            score: self.score,
            descendants: self.descendants,
            parent: self.parent,
            kids: self.kids,
            is_front_page,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Updates {
    #[serde(default)]
    pub items: Vec<i64>,
    #[serde(default)]
    pub profiles: Vec<String>,
}

/// Generic over the transport so pipelines can be exercised against a fake
/// in tests without a live server; [`HttpUpstreamClient`] is the only
/// production implementation.
pub trait UpstreamSource {
    fn max_item_id(&self) -> impl Future<Output = Result<i64, UpstreamError>> + Send;
    fn item(&self, id: i64) -> impl Future<Output = Result<Option<RawItem>, UpstreamError>> + Send;
    fn top_stories(&self) -> impl Future<Output = Result<Vec<i64>, UpstreamError>> + Send;
    fn updates(&self) -> impl Future<Output = Result<Updates, UpstreamError>> + Send;

    /// Fetches `ids` concurrently and fails the whole batch if any single
    /// fetch errors out; present items come back in arbitrary order. This is
    /// what discovery/update treat as a "whole-batch failure" (spec.md
    /// sections 4.4/4.5) — as opposed to an individual 404, which is a
    /// legitimate absent item and never fails the batch.
    fn items_batch_strict(&self, ids: &[i64], concurrency: usize) -> impl Future<Output = Result<Vec<RawItem>, UpstreamError>> + Send
    where
        Self: Sync,
    {
        async move {
            let results: Vec<_> = stream::iter(ids.to_vec())
                .map(|id| self.item(id))
                .buffer_unordered(concurrency.max(1))
                .collect()
                .await;
            let mut items = Vec::with_capacity(results.len());
            for result in results {
                if let Some(item) = result? {
                    items.push(item);
                }
            }
            Ok(items)
        }
    }
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// `reqwest`-backed client, rate limited by a process-wide token bucket
/// (spec.md section 5's "shared resources").
pub struct HttpUpstreamClient {
    client: Client,
    base_url: Url,
    limiter: Arc<Limiter>,
}

impl HttpUpstreamClient {
    pub fn new(base_url: Url, capacity: u32, refill_per_sec: u32) -> Self {
        let capacity = NonZeroU32::new(capacity.max(1)).expect("capacity is clamped to at least 1");
        let refill = NonZeroU32::new(refill_per_sec.max(1)).expect("refill rate is clamped to at least 1");
        let quota = Quota::per_second(refill).allow_burst(capacity);
        Self {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build().expect("reqwest client builds"),
            base_url,
            limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    fn url(&self, path: &str) -> Url {
        self.base_url.join(path).expect("path segments are static and valid")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>, UpstreamError> {
        let url = self.url(path);
        let mut last_err = None;
        for attempt in 0..MAX_ATTEMPTS {
            self.limiter.until_ready().await;
            let response = self.client.get(url.clone()).send().await;
            match response {
                Ok(response) if response.status() == StatusCode::NOT_FOUND => return Ok(None),
                Ok(response) => match response.error_for_status() {
                    Ok(response) => match response.json::<T>().await {
                        Ok(value) => return Ok(Some(value)),
                        Err(source) => last_err = Some(UpstreamError::Decode { url: url.to_string(), source }),
                    },
                    Err(source) => last_err = Some(UpstreamError::Request { url: url.to_string(), source }),
                },
                Err(err) if err.is_timeout() => last_err = Some(UpstreamError::Timeout { url: url.to_string() }),
                Err(err) => last_err = Some(UpstreamError::Request { url: url.to_string(), source: err }),
            }
            if attempt + 1 < MAX_ATTEMPTS {
                tokio::time::sleep(Duration::from_secs(1 << attempt)).await;
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}

impl HttpUpstreamClient {
    /// Fetches `ids` with up to `concurrency` requests in flight at once,
    /// skipping any that come back absent or fail after retrying; callers
    /// that need to know about failures compare the result length to `ids`.
    pub async fn items_batch(&self, ids: &[i64], concurrency: usize) -> Vec<RawItem> {
        stream::iter(ids.to_vec())
            .map(|id| async move { self.item(id).await })
            .buffer_unordered(concurrency.max(1))
            .filter_map(|result| async move { result.ok().flatten() })
            .collect()
            .await
    }
}

impl UpstreamSource for HttpUpstreamClient {
    async fn max_item_id(&self) -> Result<i64, UpstreamError> {
        Ok(self.get_json::<i64>("maxitem.json").await?.unwrap_or(0))
    }

    async fn item(&self, id: i64) -> Result<Option<RawItem>, UpstreamError> {
        self.get_json(&format!("item/{id}.json")).await
    }

    async fn top_stories(&self) -> Result<Vec<i64>, UpstreamError> {
        Ok(self.get_json::<Vec<i64>>("topstories.json").await?.unwrap_or_default())
    }

    async fn updates(&self) -> Result<Updates, UpstreamError> {
        Ok(self.get_json::<Updates>("updates.json").await?.unwrap_or_default())
    }
}

impl Default for Updates {
    fn default() -> Self {
        Self { items: Vec::new(), profiles: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_item_enriches_recognized_kind() {
        let raw = RawItem {
            id: 1,
            kind: "comment".to_owned(),
            deleted: false,
            dead: false,
            title: None,
            url: None,
            text: Some("hi".to_owned()),
            by: Some("bob".to_owned()),
            time: Some(100),
            score: None,
            descendants: None,
            parent: Some(5),
            kids: None,
        };
        let enriched = raw.enrich(true);
        assert_eq!(enriched.kind, ItemKind::Comment);
        assert!(enriched.is_front_page);
        assert_eq!(enriched.parent, Some(5));
    }

    #[test]
    fn unrecognized_kind_falls_back_to_story() {
        let raw = RawItem {
            id: 1,
            kind: "something-new".to_owned(),
            deleted: false,
            dead: false,
            title: Some("t".to_owned()),
            url: None,
            text: None,
            by: None,
            time: None,
            score: None,
            descendants: None,
            parent: None,
            kids: None,
        };
        assert_eq!(raw.enrich(false).kind, ItemKind::Story);
    }
}
