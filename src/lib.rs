//! Stellar: a memory scrapbook laid out as constellations.
//!
//! Photos ("memories") are tagged with a [`Mood`], placed as stars on a 2D
//! canvas, and joined into constellation shapes. This crate holds the data
//! and layout model the views are drawn from:
//!
//! - [`store::ConstellationStore`] owns every constellation and memory and
//!   persists them into a [`storage::BlobStore`].
//! - [`layout`] places new stars, groups them by mood and resolves which
//!   stars are connected.
//! - [`imaging`] shrinks uploaded photos before they are stored inline.
//! - [`stats`] derives the summary and timeline views.

pub mod config;
pub mod imaging;
pub mod layout;
pub mod logging;
pub mod model;
pub mod settings;
pub mod stats;
pub mod storage;
pub mod store;

pub use config::{Config, QuotaPolicy};
pub use layout::{group_by_mood, resolve, Connection, MemoryCluster};
pub use model::{Constellation, ConstellationId, Memory, MemoryId, Mood, Pattern, Point};
pub use settings::DisplaySettings;
pub use store::{ConstellationStore, StoreError, StoreOptions};
