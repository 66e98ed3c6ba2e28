//! Question answering over a manuscript.

use std::fmt;

use tracing::{debug, warn};

use crate::api::{RagQueryRequest, RagQueryResponse};
use crate::utils::url::endpoint_url;

#[derive(Debug)]
pub enum RagError {
    /// Rejected locally; nothing was sent.
    EmptyQuestion,
    Transport(reqwest::Error),
    /// Non-success status, with the service's error detail when it sent one.
    Status { status: u16, detail: String },
    Decode(String),
    InvalidBaseUrl(String),
}

impl fmt::Display for RagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RagError::EmptyQuestion => write!(f, "Question is empty"),
            RagError::Transport(e) => write!(f, "Failed to reach the query service: {e}"),
            RagError::Status { status, detail } if detail.is_empty() => {
                write!(f, "Query failed with status {status}")
            }
            RagError::Status { status, detail } => {
                write!(f, "Query failed with status {status}: {detail}")
            }
            RagError::Decode(reason) => write!(f, "Unreadable query response: {reason}"),
            RagError::InvalidBaseUrl(url) => write!(f, "Invalid base URL '{url}'"),
        }
    }
}

impl std::error::Error for RagError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RagError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RagAnswer {
    pub answer: String,
    pub relevant_scenes: Vec<String>,
    /// In `[0, 1]` when the service reports one.
    pub confidence: Option<f64>,
}

impl From<RagQueryResponse> for RagAnswer {
    fn from(response: RagQueryResponse) -> Self {
        Self {
            answer: response.answer,
            relevant_scenes: response.relevant_scenes.unwrap_or_default(),
            confidence: response
                .confidence
                .filter(|value| !value.is_nan())
                .map(|value| value.clamp(0.0, 1.0)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RagClient {
    client: reqwest::Client,
    base_url: String,
}

impl RagClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `POST /rag/query`. Not retried on failure.
    pub async fn query(&self, manuscript_id: &str, question: &str) -> Result<RagAnswer, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::EmptyQuestion);
        }
        let url = endpoint_url(&self.base_url, &["rag", "query"])
            .ok_or_else(|| RagError::InvalidBaseUrl(self.base_url.clone()))?;

        debug!(%url, manuscript = manuscript_id, "sending story question");
        let response = self
            .client
            .post(url)
            .json(&RagQueryRequest {
                manuscript_id,
                question,
            })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "query request failed");
                RagError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = error_detail(&body);
            warn!(%status, %detail, "query rejected");
            return Err(RagError::Status {
                status: status.as_u16(),
                detail,
            });
        }

        let body = response.text().await.map_err(RagError::Transport)?;
        let parsed: RagQueryResponse =
            serde_json::from_str(&body).map_err(|e| RagError::Decode(e.to_string()))?;
        Ok(parsed.into())
    }
}

/// Best-effort one-line summary of an error body. Understands the
/// `{"detail": ...}` shape the service uses and falls back to the raw text.
fn error_detail(body: &str) -> String {
    let summary = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value.get("detail").and_then(|detail| match detail {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            })
        })
        .unwrap_or_else(|| body.to_string());

    summary.split_whitespace().collect::<Vec<_>>().join(" ")
}
