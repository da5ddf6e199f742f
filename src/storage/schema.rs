//! JSON layout of the persisted keys and the validation applied on load.
//!
//! A key either decodes and validates completely or is rejected as a whole;
//! there is no partial recovery of individual records.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::{Constellation, ConstellationId, Memory, MemoryId, Mood, Pattern, Point};

pub const CONSTELLATIONS_KEY: &str = "stellar-constellations";
pub const MEMORIES_KEY: &str = "stellar-memories";
pub const ACTIVE_CONSTELLATION_KEY: &str = "stellar-active-constellation";
pub const SETTINGS_KEY: &str = "stellar-constellation-settings";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record {index} has an empty id")]
    EmptyId { index: usize },

    #[error("duplicate id '{0}'")]
    DuplicateId(String),

    #[error("memory '{0}' has a non-finite position")]
    NonFinitePosition(String),

    #[error("active constellation id is blank")]
    BlankActiveId,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredConstellation {
    id: String,
    name: String,
    #[serde(default)]
    pattern: Pattern,
    #[serde(with = "iso_millis")]
    created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredMemory {
    id: String,
    title: String,
    image_url: String,
    mood: Mood,
    #[serde(with = "iso_millis")]
    created_at: DateTime<Utc>,
    position: Point,
    constellation_id: String,
}

/// Timestamps as ISO-8601 strings with millisecond precision.
mod iso_millis {
    use super::*;

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

impl From<&Constellation> for StoredConstellation {
    fn from(c: &Constellation) -> Self {
        Self {
            id: c.id.to_string(),
            name: c.name.clone(),
            pattern: c.pattern,
            created_at: c.created_at,
        }
    }
}

impl From<StoredConstellation> for Constellation {
    fn from(c: StoredConstellation) -> Self {
        Self {
            id: ConstellationId::from(c.id),
            name: c.name,
            pattern: c.pattern,
            created_at: c.created_at,
        }
    }
}

impl From<&Memory> for StoredMemory {
    fn from(m: &Memory) -> Self {
        Self {
            id: m.id.to_string(),
            title: m.title.clone(),
            image_url: m.image_url.clone(),
            mood: m.mood,
            created_at: m.created_at,
            position: m.position,
            constellation_id: m.constellation_id.to_string(),
        }
    }
}

impl From<StoredMemory> for Memory {
    fn from(m: StoredMemory) -> Self {
        Self {
            id: MemoryId::from(m.id),
            title: m.title,
            image_url: m.image_url,
            mood: m.mood,
            created_at: m.created_at,
            position: m.position,
            constellation_id: ConstellationId::from(m.constellation_id),
        }
    }
}

fn check_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for (index, id) in ids.enumerate() {
        if id.trim().is_empty() {
            return Err(SchemaError::EmptyId { index });
        }
        if !seen.insert(id) {
            return Err(SchemaError::DuplicateId(id.to_string()));
        }
    }
    Ok(())
}

pub fn encode_constellations(constellations: &[Constellation]) -> Result<String, serde_json::Error> {
    let stored: Vec<StoredConstellation> = constellations.iter().map(Into::into).collect();
    serde_json::to_string(&stored)
}

pub fn decode_constellations(raw: &str) -> Result<Vec<Constellation>, SchemaError> {
    let stored: Vec<StoredConstellation> = serde_json::from_str(raw)?;
    check_ids(stored.iter().map(|c| c.id.as_str()))?;
    Ok(stored.into_iter().map(Into::into).collect())
}

pub fn encode_memories(memories: &[Memory]) -> Result<String, serde_json::Error> {
    let stored: Vec<StoredMemory> = memories.iter().map(Into::into).collect();
    serde_json::to_string(&stored)
}

pub fn decode_memories(raw: &str) -> Result<Vec<Memory>, SchemaError> {
    let stored: Vec<StoredMemory> = serde_json::from_str(raw)?;
    check_ids(stored.iter().map(|m| m.id.as_str()))?;
    if let Some(bad) = stored
        .iter()
        .find(|m| !m.position.x.is_finite() || !m.position.y.is_finite())
    {
        return Err(SchemaError::NonFinitePosition(bad.id.clone()));
    }
    Ok(stored.into_iter().map(Into::into).collect())
}

/// The active id is stored as a bare string, not JSON.
pub fn decode_active_id(raw: &str) -> Result<ConstellationId, SchemaError> {
    let id = raw.trim();
    if id.is_empty() {
        return Err(SchemaError::BlankActiveId);
    }
    Ok(ConstellationId::from(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_memory_wire_shape() {
        let memory = Memory {
            id: MemoryId::from("m1"),
            title: "Beach".to_string(),
            image_url: "https://example.com/a.jpg".to_string(),
            mood: Mood::Nostalgic,
            created_at: Utc.with_ymd_and_hms(2024, 6, 1, 12, 30, 0).unwrap(),
            position: Point::new(150.5, 240.0),
            constellation_id: ConstellationId::from("c1"),
        };

        let json = encode_memories(&[memory]).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["imageUrl"], "https://example.com/a.jpg");
        assert_eq!(value[0]["mood"], "nostalgic");
        assert_eq!(value[0]["createdAt"], "2024-06-01T12:30:00.000Z");
        assert_eq!(value[0]["position"]["x"], 150.5);
        assert_eq!(value[0]["constellationId"], "c1");
    }

    #[test]
    fn test_constellation_pattern_defaults_to_auto() {
        let raw = r#"[{"id":"c1","name":"Trip","createdAt":"2024-01-02T03:04:05.678Z"}]"#;
        let decoded = decode_constellations(raw).unwrap();
        assert_eq!(decoded[0].pattern, Pattern::Auto);
        assert_eq!(decoded[0].created_at.timestamp_millis(), 1_704_164_645_678);
    }

    #[test]
    fn test_rejects_malformed_records() {
        assert!(matches!(decode_constellations("{not json"), Err(SchemaError::Json(_))));
        assert!(decode_constellations(r#"[{"id":"c1"}]"#).is_err());
        assert!(decode_memories(r#"[{"id":"m1","title":"x","imageUrl":"","mood":"angry","createdAt":"2024-01-01T00:00:00Z","position":{"x":1,"y":2},"constellationId":"c"}]"#).is_err());

        let dup = r#"[
            {"id":"c1","name":"a","pattern":"auto","createdAt":"2024-01-01T00:00:00Z"},
            {"id":"c1","name":"b","pattern":"leo","createdAt":"2024-01-01T00:00:00Z"}
        ]"#;
        assert!(matches!(decode_constellations(dup), Err(SchemaError::DuplicateId(_))));

        let blank = r#"[{"id":" ","name":"a","createdAt":"2024-01-01T00:00:00Z"}]"#;
        assert!(matches!(decode_constellations(blank), Err(SchemaError::EmptyId { index: 0 })));
    }

    #[test]
    fn test_active_id_is_trimmed_plain_string() {
        assert_eq!(decode_active_id(" abc \n").unwrap().as_str(), "abc");
        assert!(decode_active_id("   ").is_err());
    }
}
