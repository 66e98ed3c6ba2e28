//! Canonical entity model and the normalizer for backend entity payloads.
//!
//! The backend groups entities under pluralized type keys
//! (`{"characters": ["Ann"], "locations": [{"text": "Forest"}]}`).
//! [`normalize_entities`] flattens that into an ordered `Vec<Entity>`.

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

/// Narrative role of an entity.
///
/// Keys the backend sends that do not map onto a known role are kept as
/// [`EntityKind::Unknown`] with the singularized key, so unexpected output
/// stays visible instead of being dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Character,
    Location,
    Object,
    Event,
    Time,
    Unknown(String),
}

impl EntityKind {
    /// Resolve a pluralized payload key (`"characters"`) to a kind.
    pub fn from_type_key(key: &str) -> Self {
        let lowered = key.trim().to_ascii_lowercase();
        let singular = lowered.strip_suffix('s').unwrap_or(&lowered);
        match singular {
            "character" => EntityKind::Character,
            "location" => EntityKind::Location,
            "object" => EntityKind::Object,
            "event" => EntityKind::Event,
            "time" => EntityKind::Time,
            other => EntityKind::Unknown(other.to_string()),
        }
    }

    /// Bucket name used for display and serialization.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Character => "character",
            EntityKind::Location => "location",
            EntityKind::Object => "object",
            EntityKind::Event => "event",
            EntityKind::Time => "time",
            EntityKind::Unknown(_) => "unknown",
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EntityKind::Unknown(_))
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Unknown(raw) if !raw.is_empty() => write!(f, "unknown ({raw})"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl Serialize for EntityKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub start: usize,
    pub end: usize,
}

impl Entity {
    pub fn new(text: impl Into<String>, kind: EntityKind) -> Self {
        Self {
            text: text.into(),
            kind,
            start: 0,
            end: 0,
        }
    }
}

/// Flatten a backend entity payload into canonical entities.
///
/// Total over any JSON value: an absent, empty or non-object payload yields
/// an empty list, and list items that are neither strings nor objects with a
/// string `text` field are skipped. Key order and item order are preserved.
pub fn normalize_entities(payload: Option<&Value>) -> Vec<Entity> {
    let Some(Value::Object(groups)) = payload else {
        if let Some(other) = payload {
            debug!(payload = %other, "entity payload is not an object");
        }
        return Vec::new();
    };

    let mut entities = Vec::new();
    for (key, items) in groups {
        let Value::Array(items) = items else {
            debug!(key = %key, "entity group is not a list; skipping");
            continue;
        };

        let kind = EntityKind::from_type_key(key);
        for item in items {
            match entity_from_item(item, &kind) {
                Some(entity) => entities.push(entity),
                None => debug!(key = %key, item = %item, "unusable entity entry"),
            }
        }
    }
    entities
}

fn entity_from_item(item: &Value, kind: &EntityKind) -> Option<Entity> {
    match item {
        Value::String(text) => Some(Entity::new(text.clone(), kind.clone())),
        Value::Object(fields) => {
            let text = fields.get("text")?.as_str()?;
            Some(Entity {
                text: text.to_string(),
                kind: kind.clone(),
                start: offset(fields, "start"),
                end: offset(fields, "end"),
            })
        }
        _ => None,
    }
}

fn offset(fields: &Map<String, Value>, name: &str) -> usize {
    fields
        .get(name)
        .and_then(Value::as_u64)
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(0)
}

/// View-time projection: entities bucketed by kind in first-seen order.
///
/// Every unknown kind lands in the single `"unknown"` bucket.
pub fn group_by_kind(entities: &[Entity]) -> Vec<(&'static str, Vec<&Entity>)> {
    let mut groups: Vec<(&'static str, Vec<&Entity>)> = Vec::new();
    for entity in entities {
        let bucket = entity.kind.as_str();
        match groups.iter_mut().find(|(name, _)| *name == bucket) {
            Some((_, members)) => members.push(entity),
            None => groups.push((bucket, vec![entity])),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn normalizes_strings_and_objects_in_key_order() {
        let payload = json!({
            "characters": ["Ann"],
            "locations": [{"text": "Forest"}]
        });

        let entities = normalize_entities(Some(&payload));

        assert_eq!(
            entities,
            vec![
                Entity::new("Ann", EntityKind::Character),
                Entity::new("Forest", EntityKind::Location),
            ]
        );
    }

    #[test]
    fn preserves_backend_key_order_rather_than_sorting() {
        let payload: Value =
            serde_json::from_str(r#"{"times":["Dawn"],"events":["Fire"],"characters":["Ann"]}"#)
                .expect("parse");

        let kinds: Vec<_> = normalize_entities(Some(&payload))
            .into_iter()
            .map(|entity| entity.kind)
            .collect();

        assert_eq!(
            kinds,
            vec![EntityKind::Time, EntityKind::Event, EntityKind::Character]
        );
    }

    #[test]
    fn absent_or_empty_payload_yields_nothing() {
        assert!(normalize_entities(None).is_empty());
        assert!(normalize_entities(Some(&json!({}))).is_empty());
        assert!(normalize_entities(Some(&json!([]))).is_empty());
        assert!(normalize_entities(Some(&json!("characters"))).is_empty());
    }

    #[test]
    fn unknown_keys_are_bucketed_not_dropped() {
        let payload = json!({"themes": ["Hope"], "Objects": ["Matchbox"]});

        let entities = normalize_entities(Some(&payload));

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].kind, EntityKind::Unknown("theme".into()));
        assert_eq!(entities[0].kind.as_str(), "unknown");
        assert_eq!(entities[1].kind, EntityKind::Object);
    }

    #[test]
    fn offsets_are_used_when_present() {
        let payload = json!({
            "characters": [
                {"text": "Ann", "start": 4, "end": 7},
                {"text": "Bob", "start": -1, "end": "9"}
            ]
        });

        let entities = normalize_entities(Some(&payload));

        assert_eq!((entities[0].start, entities[0].end), (4, 7));
        assert_eq!((entities[1].start, entities[1].end), (0, 0));
    }

    #[test]
    fn malformed_entries_are_skipped_without_failing() {
        let payload = json!({
            "characters": ["Ann", 42, null, {"name": "Bob"}, {"text": 7}, {"text": "Cleo"}],
            "locations": "Forest",
            "objects": null
        });

        let texts: Vec<_> = normalize_entities(Some(&payload))
            .into_iter()
            .map(|entity| entity.text)
            .collect();

        assert_eq!(texts, vec!["Ann", "Cleo"]);
    }

    #[test]
    fn entity_serializes_kind_as_type() {
        let value = serde_json::to_value(Entity::new("Ann", EntityKind::Character)).unwrap();
        assert_eq!(
            value,
            json!({"text": "Ann", "type": "character", "start": 0, "end": 0})
        );
    }

    #[test]
    fn grouping_keeps_first_seen_order_and_single_unknown_bucket() {
        let entities = vec![
            Entity::new("Forest", EntityKind::Location),
            Entity::new("Ann", EntityKind::Character),
            Entity::new("Hope", EntityKind::Unknown("theme".into())),
            Entity::new("Bob", EntityKind::Character),
            Entity::new("Winter", EntityKind::Unknown("season".into())),
        ];

        let groups = group_by_kind(&entities);
        let summary: Vec<_> = groups
            .iter()
            .map(|(name, members)| (*name, members.len()))
            .collect();

        assert_eq!(
            summary,
            vec![("location", 1), ("character", 2), ("unknown", 2)]
        );
    }

    #[test]
    fn display_includes_raw_unknown_key() {
        assert_eq!(EntityKind::Unknown("theme".into()).to_string(), "unknown (theme)");
        assert_eq!(EntityKind::Time.to_string(), "time");
    }
}
