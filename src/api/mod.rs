//! Wire payloads exchanged with the narrative-analysis service.
//!
//! The persistent connection carries [`ParagraphFrame`] outbound and
//! [`InboundMessage`] inbound; the request/response endpoints live in
//! [`analytics`] and [`rag`].

pub mod analytics;
pub mod rag;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag of the only inbound message kind the synchronization core consumes.
pub const ENTITIES_EXTRACTED: &str = "entities_extracted";

/// Outbound frame sent on every accepted submission.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ParagraphFrame {
    pub text: String,
    pub chapter: u32,
    pub paragraph: u32,
}

#[derive(Deserialize)]
struct InboundEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Recognized inbound messages.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Raw `data.entities_extracted` payload; `None` when the backend omitted it.
    EntitiesExtracted { payload: Option<Value> },
}

/// Parse one inbound text frame.
///
/// Returns `Ok(None)` for well-formed frames whose `type` this core does not
/// handle, and `Err` when the frame is not a JSON object with a string `type`.
/// An entity frame whose `data` or payload is present but not an object is
/// also an `Err`; absent or `null` means "no entities".
pub fn parse_inbound(frame: &str) -> Result<Option<InboundMessage>, serde_json::Error> {
    let envelope: InboundEnvelope = serde_json::from_str(frame)?;
    if envelope.kind != ENTITIES_EXTRACTED {
        return Ok(None);
    }

    let payload = match envelope.data {
        None | Some(Value::Null) => None,
        Some(Value::Object(mut data)) => match data.remove(ENTITIES_EXTRACTED) {
            None | Some(Value::Null) => None,
            Some(payload @ Value::Object(_)) => Some(payload),
            Some(other) => return Err(not_an_object("data.entities_extracted", &other)),
        },
        Some(other) => return Err(not_an_object("data", &other)),
    };
    Ok(Some(InboundMessage::EntitiesExtracted { payload }))
}

fn not_an_object(field: &str, found: &Value) -> serde_json::Error {
    let found = match found {
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Null | Value::Object(_) => "an unexpected value",
    };
    <serde_json::Error as serde::de::Error>::custom(format!(
        "{field} must be an object, found {found}"
    ))
}

#[derive(Deserialize, Debug)]
pub struct ArcDataPoint {
    pub step: i64,
    pub sentiment_score: f64,
    #[serde(default)]
    pub smoothed_score: Option<f64>,
}

#[derive(Deserialize, Debug)]
pub struct ArcResponse {
    #[serde(default)]
    pub data_points: Vec<ArcDataPoint>,
    #[serde(default)]
    pub overall_sentiment: String,
}

#[derive(Serialize)]
pub struct RagQueryRequest<'a> {
    pub manuscript_id: &'a str,
    pub question: &'a str,
}

#[derive(Deserialize, Debug)]
pub struct RagQueryResponse {
    pub answer: String,
    #[serde(default)]
    pub relevant_scenes: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Option<f64>,
}
