//! In-memory entity store, keyed by (namespace, label)
//!
//! Records live for the lifetime of the store handle; the host decides
//! how long that is. Entries grow monotonically: new surface variants are
//! added, and the canonical surface widens to longer observed surfaces,
//! but entries are never removed or merged after creation.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One canonical entity and its observed surface variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: Uuid,
    pub label: String,
    /// Longest observed surface; the most specific name for the entity.
    pub canonical_surface: String,
    /// Normalized form of the first observed surface.
    pub normalized: String,
    /// normalized variant → observed surface, as first seen.
    pub surfaces: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl EntityRecord {
    pub fn new(label: &str, surface: &str, normalized: &str) -> Self {
        let mut surfaces = HashMap::new();
        surfaces.insert(normalized.to_string(), surface.to_string());
        Self {
            id: Uuid::new_v4(),
            label: label.to_string(),
            canonical_surface: surface.to_string(),
            normalized: normalized.to_string(),
            surfaces,
            updated_at: Utc::now(),
        }
    }

    /// Record a newly observed variant, widening the canonical surface
    /// when the new one is strictly longer and non-empty.
    pub fn observe(&mut self, surface: &str, normalized: &str) {
        self.surfaces
            .entry(normalized.to_string())
            .or_insert_with(|| surface.to_string());
        if !surface.is_empty() && surface.chars().count() > self.canonical_surface.chars().count()
        {
            self.canonical_surface = surface.to_string();
        }
        self.updated_at = Utc::now();
    }
}

/// Caller-owned store of entity records.
///
/// Insertion order is preserved per (namespace, label) key; the linker
/// scans in that order and first-accept wins. Lives as long as the
/// caller keeps the handle; persistence across restarts is the host's
/// concern.
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    records: HashMap<(String, String), Vec<EntityRecord>>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records under one (namespace, label) key, in insertion order.
    pub fn entries(&self, namespace: &str, label: &str) -> &[EntityRecord] {
        self.records
            .get(&(namespace.to_string(), label.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn entries_mut(&mut self, namespace: &str, label: &str) -> &mut Vec<EntityRecord> {
        self.records
            .entry((namespace.to_string(), label.to_string()))
            .or_default()
    }

    pub fn insert(&mut self, namespace: &str, record: EntityRecord) -> Uuid {
        let id = record.id;
        let label = record.label.clone();
        self.entries_mut(namespace, &label).push(record);
        id
    }

    /// Statistics for debugging.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            key_count: self.records.len(),
            entity_count: self.records.values().map(Vec::len).sum(),
            surface_count: self
                .records
                .values()
                .flat_map(|v| v.iter())
                .map(|r| r.surfaces.len())
                .sum(),
        }
    }
}

/// Store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Distinct (namespace, label) keys.
    pub key_count: usize,
    pub entity_count: usize,
    pub surface_count: usize,
}
