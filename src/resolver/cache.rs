//! Per-batch capability cache.

use dashmap::DashMap;

use crate::backend::TrackCapabilities;

/// Capability records keyed by track id.
///
/// Owned by the caller and scoped to one batch: create it when the batch
/// starts and drop it with the batch. Resolution itself only reads it, and
/// behaves the same whether or not an entry is present.
#[derive(Debug, Default)]
pub struct CapabilityCache {
    entries: DashMap<String, TrackCapabilities>,
}

impl CapabilityCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, track_id: &str) -> Option<TrackCapabilities> {
        self.entries.get(track_id).map(|entry| entry.value().clone())
    }

    pub fn insert(&self, track_id: impl Into<String>, capabilities: TrackCapabilities) {
        self.entries.insert(track_id.into(), capabilities);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
