//! Character sentiment arcs.
//!
//! [`ArcDataClient::fetch_arc`] never fails: "the backend does not know this
//! character" and "the request did not work" come back as distinct
//! [`ArcResult`] variants so a view can render either without error
//! plumbing. There is no automatic retry.

use tracing::{debug, warn};

use crate::api::{ArcDataPoint, ArcResponse};
use crate::utils::url::endpoint_url;

pub const NOT_FOUND_LABEL: &str = "Character not found";
pub const ERROR_LABEL: &str = "Error fetching data";

#[derive(Debug, Clone, PartialEq)]
pub struct ArcPoint {
    pub step: i64,
    /// In `[-1, 1]`.
    pub sentiment_score: f64,
    /// In `[-1, 1]`.
    pub smoothed_score: f64,
}

impl From<ArcDataPoint> for ArcPoint {
    fn from(point: ArcDataPoint) -> Self {
        let sentiment_score = clamp_score(point.sentiment_score);
        Self {
            step: point.step,
            sentiment_score,
            smoothed_score: point
                .smoothed_score
                .map_or(sentiment_score, clamp_score),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArcResult {
    Found {
        points: Vec<ArcPoint>,
        overall_sentiment: String,
    },
    /// The service answered with a non-success status.
    NotFound,
    /// The request could not be made or the reply could not be read.
    Error { message: String },
}

impl ArcResult {
    pub fn points(&self) -> &[ArcPoint] {
        match self {
            ArcResult::Found { points, .. } => points,
            ArcResult::NotFound | ArcResult::Error { .. } => &[],
        }
    }

    /// Overall sentiment, or the marker shown in its place.
    pub fn label(&self) -> &str {
        match self {
            ArcResult::Found {
                overall_sentiment, ..
            } => overall_sentiment,
            ArcResult::NotFound => NOT_FOUND_LABEL,
            ArcResult::Error { .. } => ERROR_LABEL,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, ArcResult::Found { .. })
    }
}

#[derive(Debug, Clone)]
pub struct ArcDataClient {
    client: reqwest::Client,
    base_url: String,
}

impl ArcDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// `GET /analytics/character-arc/{manuscript_id}/{character_name}`.
    pub async fn fetch_arc(&self, manuscript_id: &str, character_name: &str) -> ArcResult {
        let name = character_name.trim();
        if name.is_empty() {
            return ArcResult::Error {
                message: "character name is empty".to_string(),
            };
        }

        let Some(url) = endpoint_url(
            &self.base_url,
            &["analytics", "character-arc", manuscript_id, name],
        ) else {
            return ArcResult::Error {
                message: format!("invalid base URL '{}'", self.base_url),
            };
        };

        debug!(%url, "fetching character arc");
        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, character = name, "arc request failed");
                return ArcResult::Error {
                    message: e.to_string(),
                };
            }
        };

        let status = response.status();
        if !status.is_success() {
            debug!(%status, character = name, "character not found");
            return ArcResult::NotFound;
        }

        match response.json::<ArcResponse>().await {
            Ok(body) => ArcResult::Found {
                points: body.data_points.into_iter().map(ArcPoint::from).collect(),
                overall_sentiment: body.overall_sentiment,
            },
            Err(e) => {
                warn!(error = %e, character = name, "unreadable arc response");
                ArcResult::Error {
                    message: e.to_string(),
                }
            }
        }
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(-1.0, 1.0)
    }
}
