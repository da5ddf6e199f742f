//! The constellation/memory store: sole owner of every persisted record.
//!
//! Each mutation updates in-memory state and immediately writes the affected
//! keys to the [`BlobStore`]. A failed write never aborts the application.
//! What happens to the in-memory change depends on [`QuotaPolicy`]:
//!
//! - `Diverge` keeps it and queues the failure in [`ConstellationStore::take_warnings`],
//!   so state runs ahead of storage until space frees up.
//! - `Rollback` restores the previous state, rewrites what was already
//!   written, and returns the failure to the caller.

use chrono::{SubsecRound, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use crate::config::{Config, ImageConfig, LayoutConfig, QuotaPolicy, ViewportConfig};
use crate::imaging::{self, PreparedPayload};
use crate::layout::{self, Connection, ResolveOptions};
use crate::model::{Constellation, ConstellationId, Memory, MemoryId, Mood, Pattern};
use crate::settings::DisplaySettings;
use crate::storage::schema::{self, SchemaError};
use crate::storage::{BlobError, BlobStore};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to persist {key}: {source}")]
    Persist {
        key: &'static str,
        #[source]
        source: BlobError,
    },

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// True when the write was refused for lack of space.
    pub fn is_quota(&self) -> bool {
        matches!(self, StoreError::Persist { source, .. } if source.is_quota())
    }

    /// Storage key of the failed write.
    pub fn key(&self) -> &'static str {
        match self {
            StoreError::Persist { key, .. } | StoreError::Encode { key, .. } => *key,
        }
    }
}

/// Knobs the store needs from the application config.
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    pub viewport: ViewportConfig,
    pub layout: LayoutConfig,
    pub images: ImageConfig,
    pub quota_policy: QuotaPolicy,
}

impl From<&Config> for StoreOptions {
    fn from(config: &Config) -> Self {
        Self {
            viewport: config.viewport.clone(),
            layout: config.layout.clone(),
            images: config.images.clone(),
            quota_policy: config.quota_policy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Constellations,
    Memories,
    Active,
    Settings,
}

impl Key {
    fn as_str(&self) -> &'static str {
        match self {
            Key::Constellations => schema::CONSTELLATIONS_KEY,
            Key::Memories => schema::MEMORIES_KEY,
            Key::Active => schema::ACTIVE_CONSTELLATION_KEY,
            Key::Settings => schema::SETTINGS_KEY,
        }
    }
}

#[derive(Debug, Default)]
struct State {
    constellations: Vec<Constellation>,
    memories: Vec<Memory>,
    active_id: Option<ConstellationId>,
    settings: DisplaySettings,
}

/// Copy of the parts of [`State`] a mutation is about to write.
#[derive(Debug, Default)]
struct Snapshot {
    constellations: Option<Vec<Constellation>>,
    memories: Option<Vec<Memory>>,
    active_id: Option<Option<ConstellationId>>,
    settings: Option<DisplaySettings>,
}

impl Snapshot {
    fn take(state: &State, keys: &[Key]) -> Self {
        let mut snapshot = Snapshot::default();
        for key in keys {
            match key {
                Key::Constellations => snapshot.constellations = Some(state.constellations.clone()),
                Key::Memories => snapshot.memories = Some(state.memories.clone()),
                Key::Active => snapshot.active_id = Some(state.active_id.clone()),
                Key::Settings => snapshot.settings = Some(state.settings),
            }
        }
        snapshot
    }

    fn restore(self, state: &mut State) {
        if let Some(constellations) = self.constellations {
            state.constellations = constellations;
        }
        if let Some(memories) = self.memories {
            state.memories = memories;
        }
        if let Some(active_id) = self.active_id {
            state.active_id = active_id;
        }
        if let Some(settings) = self.settings {
            state.settings = settings;
        }
    }
}

pub struct ConstellationStore<B, R = StdRng> {
    blobs: B,
    rng: R,
    options: StoreOptions,
    state: State,
    warnings: Vec<StoreError>,
}

impl<B: BlobStore> ConstellationStore<B, StdRng> {
    /// Load persisted state from `blobs`.
    pub fn open(blobs: B, options: StoreOptions) -> Self {
        Self::open_with_rng(blobs, options, StdRng::from_entropy())
    }
}

impl<B: BlobStore, R: Rng> ConstellationStore<B, R> {
    /// Load persisted state, drawing star positions from `rng`.
    ///
    /// Each key is loaded independently. A key that fails validation is
    /// removed from storage and its collection starts empty.
    pub fn open_with_rng(mut blobs: B, options: StoreOptions, rng: R) -> Self {
        let constellations =
            load_key(&mut blobs, Key::Constellations, schema::decode_constellations).unwrap_or_default();
        let memories = load_key(&mut blobs, Key::Memories, schema::decode_memories).unwrap_or_default();
        let active_id = load_key(&mut blobs, Key::Active, schema::decode_active_id);
        let settings = load_key(&mut blobs, Key::Settings, DisplaySettings::decode).unwrap_or_default();

        tracing::info!(
            constellations = constellations.len(),
            memories = memories.len(),
            active = ?active_id.as_ref().map(|id| id.as_str()),
            "Store loaded"
        );

        Self {
            blobs,
            rng,
            options,
            state: State {
                constellations,
                memories,
                active_id,
                settings,
            },
            warnings: Vec::new(),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn constellations(&self) -> &[Constellation] {
        &self.state.constellations
    }

    pub fn constellation(&self, id: &ConstellationId) -> Option<&Constellation> {
        self.state.constellations.iter().find(|c| &c.id == id)
    }

    pub fn active_constellation_id(&self) -> Option<&ConstellationId> {
        self.state.active_id.as_ref()
    }

    /// The active constellation, if the active id still refers to one.
    pub fn active_constellation(&self) -> Option<&Constellation> {
        self.state
            .active_id
            .as_ref()
            .and_then(|id| self.constellation(id))
    }

    /// Memories of the active constellation, in insertion order.
    pub fn active_memories(&self) -> Vec<&Memory> {
        match &self.state.active_id {
            Some(id) => self.memories_in(id).collect(),
            None => Vec::new(),
        }
    }

    pub fn all_memories(&self) -> &[Memory] {
        &self.state.memories
    }

    pub fn memories_by_mood(&self, mood: Mood) -> Vec<&Memory> {
        self.active_memories()
            .into_iter()
            .filter(|m| m.mood == mood)
            .collect()
    }

    pub fn settings(&self) -> DisplaySettings {
        self.state.settings
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Edges for the active constellation, drawn with its own pattern and
    /// the mood-grouping display setting.
    pub fn active_connections(&self) -> Vec<Connection<'_>> {
        let pattern = self
            .active_constellation()
            .map(|c| c.pattern)
            .unwrap_or_default();
        layout::resolve_with(
            pattern,
            self.active_memories(),
            self.state.settings.group_by_mood,
            ResolveOptions {
                close_loops: self.options.layout.close_loops,
            },
        )
    }

    /// Drain write failures kept under [`QuotaPolicy::Diverge`].
    ///
    /// Holds the latest failure per key; a later successful write of the
    /// same key drops it.
    pub fn take_warnings(&mut self) -> Vec<StoreError> {
        std::mem::take(&mut self.warnings)
    }

    pub fn blob_store(&self) -> &B {
        &self.blobs
    }

    pub fn into_blob_store(self) -> B {
        self.blobs
    }

    fn memories_in<'a>(&'a self, id: &'a ConstellationId) -> impl Iterator<Item = &'a Memory> + 'a {
        self.state
            .memories
            .iter()
            .filter(move |m| &m.constellation_id == id)
    }

    // ========================================================================
    // Constellation operations
    // ========================================================================

    /// Create a constellation and make it active.
    ///
    /// Names are taken as given; rejecting empty names is up to the caller.
    pub fn create_constellation(
        &mut self,
        name: impl Into<String>,
        pattern: Pattern,
    ) -> Result<Constellation, StoreError> {
        let constellation = Constellation {
            id: ConstellationId::generate(),
            name: name.into(),
            pattern,
            created_at: Utc::now().trunc_subsecs(3),
        };

        let created = constellation.clone();
        self.mutate(&[Key::Constellations, Key::Active], move |state| {
            state.active_id = Some(created.id.clone());
            state.constellations.push(created);
        })?;

        tracing::info!(id = %constellation.id, name = %constellation.name, "Created constellation");
        Ok(constellation)
    }

    /// Rename a constellation. Returns false (and writes nothing) when the id
    /// is unknown.
    pub fn rename_constellation(
        &mut self,
        id: &ConstellationId,
        name: impl Into<String>,
    ) -> Result<bool, StoreError> {
        let Some(index) = self.state.constellations.iter().position(|c| &c.id == id) else {
            tracing::debug!(id = %id, "Rename of unknown constellation ignored");
            return Ok(false);
        };

        let name = name.into();
        self.mutate(&[Key::Constellations], |state| {
            state.constellations[index].name = name;
        })?;
        Ok(true)
    }

    /// Change the pattern a constellation is drawn with. Returns false when
    /// the id is unknown.
    pub fn set_constellation_pattern(
        &mut self,
        id: &ConstellationId,
        pattern: Pattern,
    ) -> Result<bool, StoreError> {
        let Some(index) = self.state.constellations.iter().position(|c| &c.id == id) else {
            tracing::debug!(id = %id, "Pattern change of unknown constellation ignored");
            return Ok(false);
        };

        self.mutate(&[Key::Constellations], |state| {
            state.constellations[index].pattern = pattern;
        })?;
        Ok(true)
    }

    /// Delete a constellation together with its memories.
    ///
    /// When it was active, the first remaining constellation becomes active
    /// (or none, if it was the last).
    pub fn delete_constellation(&mut self, id: &ConstellationId) -> Result<bool, StoreError> {
        if self.constellation(id).is_none() {
            tracing::debug!(id = %id, "Delete of unknown constellation ignored");
            return Ok(false);
        }

        let was_active = self.state.active_id.as_ref() == Some(id);
        let keys: &[Key] = if was_active {
            &[Key::Constellations, Key::Memories, Key::Active]
        } else {
            &[Key::Constellations, Key::Memories]
        };

        let removed = self.mutate(keys, |state| {
            state.constellations.retain(|c| &c.id != id);
            let before = state.memories.len();
            state.memories.retain(|m| &m.constellation_id != id);
            if was_active {
                state.active_id = state.constellations.first().map(|c| c.id.clone());
            }
            before - state.memories.len()
        })?;

        tracing::info!(id = %id, memories_removed = removed, "Deleted constellation");
        Ok(true)
    }

    /// Select the active constellation, or clear the selection with `None`.
    pub fn set_active_constellation(&mut self, id: Option<ConstellationId>) -> Result<(), StoreError> {
        if self.state.active_id == id {
            return Ok(());
        }
        self.mutate(&[Key::Active], |state| {
            state.active_id = id;
        })
    }

    // ========================================================================
    // Memory operations
    // ========================================================================

    /// Compression phase of adding a memory. Safe to run for several uploads
    /// at once; nothing is stored until [`Self::commit_memory`].
    pub async fn prepare_memory(&self, image_url: impl Into<String>) -> PreparedPayload {
        imaging::prepare(image_url.into(), &self.options.images).await
    }

    /// Prepare a batch of uploads with bounded parallelism, in input order.
    pub async fn prepare_many(&self, images: Vec<String>) -> Vec<PreparedPayload> {
        imaging::prepare_many(images, &self.options.images).await
    }

    /// Store a prepared upload as a new memory of `constellation_id`.
    ///
    /// The position is allocated against memories already in that
    /// constellation only.
    pub fn commit_memory(
        &mut self,
        prepared: PreparedPayload,
        title: impl Into<String>,
        mood: Mood,
        constellation_id: &ConstellationId,
    ) -> Result<Memory, StoreError> {
        let existing: Vec<_> = self.memories_in(constellation_id).map(|m| m.position).collect();
        let position = layout::allocate(
            &existing,
            &self.options.viewport,
            &self.options.layout,
            &mut self.rng,
        );

        let memory = Memory {
            id: MemoryId::generate(),
            title: title.into(),
            image_url: prepared.image_url,
            mood,
            created_at: Utc::now().trunc_subsecs(3),
            position,
            constellation_id: constellation_id.clone(),
        };

        let added = memory.clone();
        self.mutate(&[Key::Memories], move |state| state.memories.push(added))?;

        tracing::info!(
            id = %memory.id,
            constellation = %constellation_id,
            mood = %mood,
            compressed = prepared.compressed,
            "Added memory"
        );
        Ok(memory)
    }

    /// Prepare and commit in one step.
    pub async fn add_memory(
        &mut self,
        title: impl Into<String>,
        image_url: impl Into<String>,
        mood: Mood,
        constellation_id: &ConstellationId,
    ) -> Result<Memory, StoreError> {
        let prepared = self.prepare_memory(image_url).await;
        self.commit_memory(prepared, title, mood, constellation_id)
    }

    /// Remove a memory. Returns false when the id is unknown.
    pub fn remove_memory(&mut self, id: &MemoryId) -> Result<bool, StoreError> {
        let Some(index) = self.state.memories.iter().position(|m| &m.id == id) else {
            tracing::debug!(id = %id, "Removal of unknown memory ignored");
            return Ok(false);
        };

        self.mutate(&[Key::Memories], |state| {
            state.memories.remove(index);
        })?;
        Ok(true)
    }

    // ========================================================================
    // Display settings
    // ========================================================================

    /// Pattern pre-selected for new constellations.
    pub fn set_display_pattern(&mut self, pattern: Pattern) -> Result<(), StoreError> {
        self.mutate(&[Key::Settings], |state| state.settings.pattern = pattern)
    }

    pub fn set_group_by_mood(&mut self, group_by_mood: bool) -> Result<(), StoreError> {
        self.mutate(&[Key::Settings], |state| state.settings.group_by_mood = group_by_mood)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Apply `change` and persist `keys`, handling failures per the quota
    /// policy. `change` must only touch the parts of the state behind `keys`.
    fn mutate<T>(&mut self, keys: &[Key], change: impl FnOnce(&mut State) -> T) -> Result<T, StoreError> {
        let snapshot = match self.options.quota_policy {
            QuotaPolicy::Rollback => Some(Snapshot::take(&self.state, keys)),
            QuotaPolicy::Diverge => None,
        };

        let value = change(&mut self.state);
        let mut failures = self.persist(keys);
        self.warnings
            .retain(|warning| !keys.iter().any(|key| key.as_str() == warning.key()));
        if failures.is_empty() {
            return Ok(value);
        }

        match snapshot {
            Some(previous) => {
                previous.restore(&mut self.state);
                for err in self.persist(keys) {
                    tracing::error!(error = %err, "Failed to restore storage after rollback");
                }
                let err = failures.remove(0);
                tracing::warn!(error = %err, "Write failed, change rolled back");
                Err(err)
            }
            None => {
                for err in failures {
                    tracing::warn!(error = %err, "Write failed, storage now behind in-memory state");
                    self.warnings.push(err);
                }
                Ok(value)
            }
        }
    }

    /// Write every key, collecting failures rather than stopping at the first.
    fn persist(&mut self, keys: &[Key]) -> Vec<StoreError> {
        keys.iter()
            .filter_map(|&key| self.persist_key(key).err())
            .collect()
    }

    fn persist_key(&mut self, key: Key) -> Result<(), StoreError> {
        let name = key.as_str();
        let encoded = match key {
            Key::Constellations => schema::encode_constellations(&self.state.constellations),
            Key::Memories => schema::encode_memories(&self.state.memories),
            Key::Settings => self.state.settings.encode(),
            Key::Active => {
                let result = match &self.state.active_id {
                    Some(id) => self.blobs.set(name, id.as_str()),
                    None => self.blobs.remove(name),
                };
                return result.map_err(|source| StoreError::Persist { key: name, source });
            }
        }
        .map_err(|source| StoreError::Encode { key: name, source })?;

        self.blobs
            .set(name, &encoded)
            .map_err(|source| StoreError::Persist { key: name, source })
    }
}

/// Read and validate one key; corrupt values are cleared from storage.
fn load_key<B, T>(
    blobs: &mut B,
    key: Key,
    decode: impl FnOnce(&str) -> Result<T, SchemaError>,
) -> Option<T>
where
    B: BlobStore,
{
    let name = key.as_str();
    let raw = match blobs.get(name) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) if e.is_corrupt() => {
            tracing::warn!(key = name, error = %e, "Stored data is unreadable, clearing it");
            clear_key(blobs, name);
            return None;
        }
        Err(e) => {
            tracing::error!(key = name, error = %e, "Failed to read stored data");
            return None;
        }
    };

    match decode(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = name, error = %e, "Stored data is corrupt, clearing it");
            clear_key(blobs, name);
            None
        }
    }
}

fn clear_key<B: BlobStore>(blobs: &mut B, name: &str) {
    if let Err(e) = blobs.remove(name) {
        tracing::error!(key = name, error = %e, "Failed to clear corrupt data");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBlobStore;

    fn store() -> ConstellationStore<MemoryBlobStore, StdRng> {
        ConstellationStore::open_with_rng(
            MemoryBlobStore::new(),
            StoreOptions::default(),
            StdRng::seed_from_u64(9),
        )
    }

    fn remote(n: usize) -> PreparedPayload {
        PreparedPayload::original(format!("https://example.com/{}.jpg", n))
    }

    #[test]
    fn test_create_makes_active_and_persists() {
        let mut store = store();
        let trip = store.create_constellation("Trip", Pattern::Auto).unwrap();

        assert_eq!(store.active_constellation(), Some(&trip));
        let blobs = store.blob_store();
        assert_eq!(
            blobs.get(schema::ACTIVE_CONSTELLATION_KEY).unwrap().as_deref(),
            Some(trip.id.as_str())
        );
        assert!(blobs.get(schema::CONSTELLATIONS_KEY).unwrap().unwrap().contains("Trip"));
    }

    #[test]
    fn test_rename_unknown_is_noop() {
        let mut store = store();
        let trip = store.create_constellation("Trip", Pattern::Leo).unwrap();

        assert!(!store.rename_constellation(&ConstellationId::from("nope"), "X").unwrap());
        assert!(store.rename_constellation(&trip.id, "Road Trip").unwrap());
        assert_eq!(store.constellations()[0].name, "Road Trip");
        assert_eq!(store.constellations()[0].pattern, Pattern::Leo);
    }

    #[test]
    fn test_positions_scoped_to_constellation() {
        let mut store = store();
        let a = store.create_constellation("A", Pattern::Auto).unwrap();
        let b = store.create_constellation("B", Pattern::Auto).unwrap();

        for n in 0..4 {
            store.commit_memory(remote(n), "a", Mood::Happy, &a.id).unwrap();
        }
        store.commit_memory(remote(9), "b", Mood::Calm, &b.id).unwrap();

        let layout = LayoutConfig::default();
        let in_a: Vec<&Memory> = store
            .all_memories()
            .iter()
            .filter(|m| m.constellation_id == a.id)
            .collect();
        for (i, m) in in_a.iter().enumerate() {
            for other in &in_a[i + 1..] {
                // 4 stars fit easily in the default viewport
                assert!(m.position.distance(&other.position) >= layout.min_distance);
            }
        }

        // b is active (created last)
        assert_eq!(store.active_memories().len(), 1);
    }

    #[test]
    fn test_memories_by_mood_filters_active() {
        let mut store = store();
        let c = store.create_constellation("C", Pattern::Auto).unwrap();
        store.commit_memory(remote(1), "x", Mood::Happy, &c.id).unwrap();
        store.commit_memory(remote(2), "y", Mood::Calm, &c.id).unwrap();
        store.commit_memory(remote(3), "z", Mood::Happy, &c.id).unwrap();

        assert_eq!(store.memories_by_mood(Mood::Happy).len(), 2);
        assert_eq!(store.memories_by_mood(Mood::Nostalgic).len(), 0);
    }

    #[test]
    fn test_remove_memory() {
        let mut store = store();
        let c = store.create_constellation("C", Pattern::Auto).unwrap();
        let m = store.commit_memory(remote(1), "x", Mood::Happy, &c.id).unwrap();

        assert!(store.remove_memory(&m.id).unwrap());
        assert!(!store.remove_memory(&m.id).unwrap());
        assert!(store.all_memories().is_empty());
        assert_eq!(
            store.blob_store().get(schema::MEMORIES_KEY).unwrap().as_deref(),
            Some("[]")
        );
    }

    #[test]
    fn test_clearing_active_removes_key() {
        let mut store = store();
        store.create_constellation("C", Pattern::Auto).unwrap();
        store.set_active_constellation(None).unwrap();

        assert!(store.active_constellation().is_none());
        assert!(!store.blob_store().contains(schema::ACTIVE_CONSTELLATION_KEY));
    }

    #[test]
    fn test_settings_persist() {
        let mut store = store();
        store.set_display_pattern(Pattern::Orion).unwrap();
        store.set_group_by_mood(false).unwrap();

        let raw = store.blob_store().get(schema::SETTINGS_KEY).unwrap().unwrap();
        assert_eq!(raw, r#"{"pattern":"orion","groupByMood":false}"#);
    }

    #[test]
    fn test_active_connections_follow_constellation_pattern() {
        let mut store = store();
        let c = store.create_constellation("C", Pattern::Auto).unwrap();
        for n in 0..4 {
            store.commit_memory(remote(n), "x", Mood::Happy, &c.id).unwrap();
        }

        assert_eq!(store.active_connections().len(), 3);

        store.set_constellation_pattern(&c.id, Pattern::Libra).unwrap();
        // Libra on four stars: (0,1) (1,2) (2,3) (3,0)
        assert_eq!(store.active_connections().len(), 4);
        assert!(!store
            .set_constellation_pattern(&ConstellationId::from("nope"), Pattern::Leo)
            .unwrap());
    }

    #[test]
    fn test_snapshot_covers_only_written_keys() {
        let mut store = store();
        let c = store.create_constellation("C", Pattern::Auto).unwrap();
        store.commit_memory(remote(1), "x", Mood::Happy, &c.id).unwrap();

        let snapshot = Snapshot::take(&store.state, &[Key::Settings]);
        assert!(snapshot.memories.is_none());
        assert!(snapshot.constellations.is_none());
        assert!(snapshot.active_id.is_none());
        assert_eq!(snapshot.settings, Some(DisplaySettings::default()));

        let snapshot = Snapshot::take(&store.state, &[Key::Memories, Key::Active]);
        store.state.memories.clear();
        store.state.active_id = None;
        store.state.settings.group_by_mood = false;
        snapshot.restore(&mut store.state);

        assert_eq!(store.state.memories.len(), 1);
        assert_eq!(store.state.active_id.as_ref(), Some(&c.id));
        // Not part of the snapshot, so left as changed
        assert!(!store.state.settings.group_by_mood);
    }

    #[test]
    fn test_store_error_names_its_key() {
        let err = StoreError::Persist {
            key: schema::MEMORIES_KEY,
            source: BlobError::InvalidKey("x".to_string()),
        };
        assert_eq!(err.key(), schema::MEMORIES_KEY);
        assert!(!err.is_quota());
    }

    #[tokio::test]
    async fn test_add_memory_passes_remote_url_through() {
        let mut store = store();
        let c = store.create_constellation("C", Pattern::Auto).unwrap();
        let m = store
            .add_memory("Sunset", "https://example.com/sunset.jpg", Mood::Calm, &c.id)
            .await
            .unwrap();

        assert_eq!(m.image_url, "https://example.com/sunset.jpg");
        assert_eq!(store.active_memories(), vec![&m]);
    }
}
