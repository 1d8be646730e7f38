//! Client for the vector store (spec.md section 6). Vector ids are the
//! decimal-string form of the item id they were computed from.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Serialize)]
pub struct VectorMetadata {
    pub topic: String,
    pub score: Option<i32>,
    /// Truncated to at most 200 characters (spec.md section 4.6 Phase C).
    pub title: String,
}

impl VectorMetadata {
    pub fn new(topic: impl Into<String>, score: Option<i32>, title: &str) -> Self {
        const TITLE_MAX_LEN: usize = 200;
        let title = if title.chars().count() > TITLE_MAX_LEN {
            title.chars().take(TITLE_MAX_LEN).collect()
        } else {
            title.to_owned()
        };
        Self { topic: topic.into(), score, title }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: VectorMetadata,
}

impl VectorRecord {
    pub fn new(item_id: i64, values: Vec<f32>, metadata: VectorMetadata) -> Self {
        Self { id: item_id.to_string(), values, metadata }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<serde_json::Value>,
    /// Present on `get_by_ids` responses, absent on `query` responses (Vectorize
    /// only returns raw vector values for direct id lookups).
    #[serde(default)]
    pub values: Option<Vec<f32>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VectorStoreInfo {
    pub dimensions: usize,
    #[serde(rename = "vectorCount")]
    pub vector_count: i64,
}

pub struct VectorStore {
    client: Client,
    endpoint: Url,
}

impl VectorStore {
    pub fn new(endpoint: Url, api_key: Option<&str>) -> Self {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(key) = api_key {
            let mut headers = reqwest::header::HeaderMap::new();
            if let Ok(value) = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, value);
            }
            builder = builder.default_headers(headers);
        }
        Self {
            client: builder.build().expect("reqwest client builds"),
            endpoint,
        }
    }

    pub async fn upsert(&self, vectors: &[VectorRecord]) -> Result<(), reqwest::Error> {
        let endpoint = self.endpoint.join("upsert").expect("static path");
        self.client
            .post(endpoint)
            .json(&serde_json::json!({ "vectors": vectors }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn query(&self, vector: &[f32], top_k: usize, return_metadata: bool) -> Result<Vec<VectorMatch>, reqwest::Error> {
        let endpoint = self.endpoint.join("query").expect("static path");
        let response = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "vector": vector, "topK": top_k, "returnMetadata": return_metadata }))
            .send()
            .await?
            .error_for_status()?;
        response.json().await
    }

    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<VectorMatch>, reqwest::Error> {
        let endpoint = self.endpoint.join("get-by-ids").expect("static path");
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let response = self
            .client
            .post(endpoint)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await?
            .error_for_status()?;
        response.json().await
    }

    pub async fn describe(&self) -> Result<VectorStoreInfo, reqwest::Error> {
        let endpoint = self.endpoint.join("describe").expect("static path");
        self.client.get(endpoint).send().await?.error_for_status()?.json().await
    }

    pub async fn delete_by_ids(&self, ids: &[i64]) -> Result<(), reqwest::Error> {
        let endpoint = self.endpoint.join("delete-by-ids").expect("static path");
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        self.client
            .post(endpoint)
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_record_id_is_decimal_item_id() {
        let record = VectorRecord::new(42, vec![0.1, 0.2], VectorMetadata::new("science", Some(10), "title"));
        assert_eq!(record.id, "42");
    }

    #[test]
    fn vector_metadata_truncates_long_titles() {
        let long_title = "x".repeat(250);
        let metadata = VectorMetadata::new("science", None, &long_title);
        assert_eq!(metadata.title.chars().count(), 200);
    }

    #[test]
    fn short_title_is_untouched() {
        let metadata = VectorMetadata::new("science", None, "short");
        assert_eq!(metadata.title, "short");
    }
}
