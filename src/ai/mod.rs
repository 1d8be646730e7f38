//! Client for the AI collaborator (spec.md section 6): three opaque remote
//! classification operations plus embedding generation, each tolerant of
//! transient failure so a partial analysis still produces a usable row.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{Display, EnumString};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SENTIMENT: f64 = 0.5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    ArtificialIntelligence,
    Programming,
    WebDevelopment,
    Startups,
    Science,
    Security,
    CryptoBlockchain,
    Hardware,
    Career,
    Politics,
    Business,
    Gaming,
    Other,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ContentType {
    News,
    Tutorial,
    Opinion,
    Research,
    Launch,
    Discussion,
    ShowHn,
    AskHn,
    TellHn,
    Job,
    Other,
}

impl ContentType {
    /// Title-prefix short-circuits (spec.md section 6) that bypass the model
    /// call entirely for the HN-specific submission conventions.
    pub fn from_title_shortcut(title: &str) -> Option<Self> {
        let lower = title.to_lowercase();
        if lower.starts_with("show hn:") {
            Some(Self::ShowHn)
        } else if lower.starts_with("ask hn:") {
            Some(Self::AskHn)
        } else if lower.starts_with("tell hn:") {
            Some(Self::TellHn)
        } else if lower.contains("is hiring") || lower.contains("job:") || lower.contains("(yc ") {
            Some(Self::Job)
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct TopicResponse {
    topic: String,
}

#[derive(Debug, Deserialize)]
struct ContentTypeResponse {
    content_type: String,
}

#[derive(Debug, Deserialize)]
struct SentimentLabel {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
struct SentimentResponse {
    labels: Vec<SentimentLabel>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// Thin reqwest wrapper over the classifier endpoint. All four operations
/// swallow errors into a best-effort default rather than propagating them,
/// matching spec.md section 6's "best-effort settler" requirement.
pub struct AiClient {
    client: Client,
    endpoint: Url,
}

impl AiClient {
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

    pub async fn classify_topic(&self, title: &str, url: Option<&str>) -> Topic {
        let endpoint = self.endpoint.join("classify/topic").expect("static path");
        let body = serde_json::json!({ "title": title, "url": url });
        let result: Option<TopicResponse> = async {
            let response = self.client.post(endpoint).json(&body).send().await.ok()?;
            response.json().await.ok()
        }
        .await;
        result.and_then(|response| response.topic.parse().ok()).unwrap_or(Topic::Other)
    }

    pub async fn classify_content_type(&self, title: &str) -> ContentType {
        if let Some(shortcut) = ContentType::from_title_shortcut(title) {
            return shortcut;
        }
        let endpoint = self.endpoint.join("classify/content-type").expect("static path");
        let body = serde_json::json!({ "title": title });
        let result: Option<ContentTypeResponse> = async {
            let response = self.client.post(endpoint).json(&body).send().await.ok()?;
            response.json().await.ok()
        }
        .await;
        result.and_then(|response| response.content_type.parse().ok()).unwrap_or(ContentType::Other)
    }

    pub async fn sentiment(&self, title: &str) -> f64 {
        let endpoint = self.endpoint.join("sentiment").expect("static path");
        let body = serde_json::json!({ "title": title });
        let decoded = async {
            let response = self.client.post(endpoint).json(&body).send().await.ok()?;
            response.json::<SentimentResponse>().await.ok()
        }
        .await;
        decoded.and_then(|response| score_from_labels(&response.labels)).unwrap_or(DEFAULT_SENTIMENT)
    }

    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let endpoint = self.endpoint.join("embed").expect("static path");
        let body = serde_json::json!({ "text": text });
        let response = self.client.post(endpoint).json(&body).send().await.ok()?;
        let decoded: EmbeddingResponse = response.json().await.ok()?;
        Some(decoded.embedding)
    }
}

/// POSITIVE maps directly; if only NEGATIVE appears, invert it; anything else
/// (ties, unknown labels, empty response) is malformed per spec.md section 6.
fn score_from_labels(labels: &[SentimentLabel]) -> Option<f64> {
    let positive = labels.iter().find(|label| label.label.eq_ignore_ascii_case("positive"));
    let negative = labels.iter().find(|label| label.label.eq_ignore_ascii_case("negative"));
    match (positive, negative) {
        (Some(positive), _) => Some(positive.score),
        (None, Some(negative)) => Some(1.0 - negative.score),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_hn_prefix_short_circuits() {
        assert_eq!(ContentType::from_title_shortcut("Show HN: my thing"), Some(ContentType::ShowHn));
    }

    #[test]
    fn ask_hn_prefix_is_case_insensitive() {
        assert_eq!(ContentType::from_title_shortcut("ASK HN: why?"), Some(ContentType::AskHn));
    }

    #[test]
    fn hiring_pattern_maps_to_job() {
        assert_eq!(ContentType::from_title_shortcut("Acme Corp is hiring engineers"), Some(ContentType::Job));
        assert_eq!(ContentType::from_title_shortcut("Job: Rust dev at Acme"), Some(ContentType::Job));
        assert_eq!(ContentType::from_title_shortcut("Widgets Inc (YC W24)"), Some(ContentType::Job));
    }

    #[test]
    fn ordinary_title_has_no_shortcut() {
        assert_eq!(ContentType::from_title_shortcut("A new Rust compiler backend"), None);
    }

    #[test]
    fn positive_label_maps_directly() {
        let labels = vec![SentimentLabel { label: "POSITIVE".to_owned(), score: 0.8 }];
        assert_eq!(score_from_labels(&labels), Some(0.8));
    }

    #[test]
    fn negative_only_label_is_inverted() {
        let labels = vec![SentimentLabel { label: "NEGATIVE".to_owned(), score: 0.3 }];
        assert_eq!(score_from_labels(&labels), Some(0.7));
    }

    #[test]
    fn empty_labels_are_malformed() {
        assert_eq!(score_from_labels(&[]), None);
    }
}
