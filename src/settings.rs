//! Viewer preferences: the pattern offered for new constellations and
//! whether stars are connected per mood.

use serde::{Deserialize, Serialize};

use crate::model::Pattern;
use crate::storage::schema::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    pub pattern: Pattern,
    pub group_by_mood: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            pattern: Pattern::Auto,
            group_by_mood: true,
        }
    }
}

impl DisplaySettings {
    /// Stored fields override the defaults; absent ones keep them.
    pub fn decode(raw: &str) -> Result<Self, SchemaError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
