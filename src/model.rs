//! Core records: memories, constellations and the small value types they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A point in viewport pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Happy,
    Calm,
    Nostalgic,
}

impl Mood {
    /// Every mood in display order.
    pub const ALL: [Mood; 3] = [Mood::Happy, Mood::Calm, Mood::Nostalgic];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "happy",
            Mood::Calm => "calm",
            Mood::Nostalgic => "nostalgic",
        }
    }

    /// Star color as an RGB triple.
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            Mood::Happy => (255, 215, 0),
            Mood::Calm => (100, 149, 237),
            Mood::Nostalgic => (186, 85, 211),
        }
    }

    /// Position in [`Mood::ALL`]; used for stable per-mood bucketing.
    pub fn index(&self) -> usize {
        match self {
            Mood::Happy => 0,
            Mood::Calm => 1,
            Mood::Nostalgic => 2,
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Mood {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mood::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown mood '{}' (expected happy, calm or nostalgic)", s))
    }
}

/// Named connection templates a constellation can be drawn with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Pattern {
    #[default]
    Auto,
    Capricorn,
    Aries,
    Taurus,
    Gemini,
    Cancer,
    Leo,
    Virgo,
    Libra,
    Scorpio,
    Sagittarius,
    Aquarius,
    Pisces,
    Orion,
    UrsaMajor,
    UrsaMinor,
}

impl Pattern {
    pub const ALL: [Pattern; 16] = [
        Pattern::Auto,
        Pattern::Capricorn,
        Pattern::Aries,
        Pattern::Taurus,
        Pattern::Gemini,
        Pattern::Cancer,
        Pattern::Leo,
        Pattern::Virgo,
        Pattern::Libra,
        Pattern::Scorpio,
        Pattern::Sagittarius,
        Pattern::Aquarius,
        Pattern::Pisces,
        Pattern::Orion,
        Pattern::UrsaMajor,
        Pattern::UrsaMinor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Pattern::Auto => "auto",
            Pattern::Capricorn => "capricorn",
            Pattern::Aries => "aries",
            Pattern::Taurus => "taurus",
            Pattern::Gemini => "gemini",
            Pattern::Cancer => "cancer",
            Pattern::Leo => "leo",
            Pattern::Virgo => "virgo",
            Pattern::Libra => "libra",
            Pattern::Scorpio => "scorpio",
            Pattern::Sagittarius => "sagittarius",
            Pattern::Aquarius => "aquarius",
            Pattern::Pisces => "pisces",
            Pattern::Orion => "orion",
            Pattern::UrsaMajor => "ursa-major",
            Pattern::UrsaMinor => "ursa-minor",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Pattern::Auto => "Auto Form",
            Pattern::Capricorn => "Capricorn",
            Pattern::Aries => "Aries",
            Pattern::Taurus => "Taurus",
            Pattern::Gemini => "Gemini",
            Pattern::Cancer => "Cancer",
            Pattern::Leo => "Leo",
            Pattern::Virgo => "Virgo",
            Pattern::Libra => "Libra",
            Pattern::Scorpio => "Scorpio",
            Pattern::Sagittarius => "Sagittarius",
            Pattern::Aquarius => "Aquarius",
            Pattern::Pisces => "Pisces",
            Pattern::Orion => "Orion",
            Pattern::UrsaMajor => "Ursa Major",
            Pattern::UrsaMinor => "Ursa Minor",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Pattern::Auto => "Connect by creation order",
            Pattern::Capricorn => "The sea-goat pattern",
            Pattern::Aries => "The ram pattern",
            Pattern::Taurus => "The bull pattern",
            Pattern::Gemini => "The twins pattern",
            Pattern::Cancer => "The crab pattern",
            Pattern::Leo => "The lion pattern",
            Pattern::Virgo => "The maiden pattern",
            Pattern::Libra => "The scales pattern",
            Pattern::Scorpio => "The scorpion pattern",
            Pattern::Sagittarius => "The archer pattern",
            Pattern::Aquarius => "The water-bearer pattern",
            Pattern::Pisces => "The fish pattern",
            Pattern::Orion => "The hunter",
            Pattern::UrsaMajor => "The great bear",
            Pattern::UrsaMinor => "The little bear",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Pattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown pattern '{}'", s))
    }
}

macro_rules! string_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Fresh random identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(MemoryId);
string_id!(ConstellationId);

/// One uploaded photo.
#[derive(Debug, Clone, PartialEq)]
pub struct Memory {
    pub id: MemoryId,
    pub title: String,
    /// Remote URL or embedded (compressed) data URL
    pub image_url: String,
    pub mood: Mood,
    pub created_at: DateTime<Utc>,
    pub position: Point,
    pub constellation_id: ConstellationId,
}

/// A named collection of memories sharing a connection pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct Constellation {
    pub id: ConstellationId,
    pub name: String,
    pub pattern: Pattern,
    pub created_at: DateTime<Utc>,
}
