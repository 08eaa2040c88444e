//! In-memory library store for tests and embedded use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use threadmine_core::{
    Error, Item, ItemType, LibraryStore, Result, SourceEvidence,
};

/// In-memory implementation of [`LibraryStore`].
///
/// The single map mutex is the write serialization point: an
/// `increment_hit` reads and writes the item under one lock acquisition, so
/// concurrent runs merging into the same item can never lose an update.
#[derive(Clone, Default)]
pub struct InMemoryLibraryStore {
    items: Arc<Mutex<HashMap<Uuid, Item>>>,
}

impl InMemoryLibraryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with pre-existing items.
    pub fn with_items(items: Vec<Item>) -> Self {
        let store = Self::new();
        {
            let mut map = store.items.lock().unwrap();
            for item in items {
                map.insert(item.id, item);
            }
        }
        store
    }

    /// Total items across all types.
    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl LibraryStore for InMemoryLibraryStore {
    async fn get(&self, item_type: ItemType) -> Result<Vec<Item>> {
        let map = self.items.lock().unwrap();
        let mut items: Vec<Item> = map
            .values()
            .filter(|i| i.item_type == item_type)
            .cloned()
            .collect();
        // Stable listing order matching the Postgres store
        items.sort_by(|a, b| a.first_seen.cmp(&b.first_seen).then(a.id.cmp(&b.id)));
        Ok(items)
    }

    async fn upsert(&self, item: Item) -> Result<Item> {
        let mut map = self.items.lock().unwrap();
        match map.get_mut(&item.id) {
            Some(existing) => {
                // Identity fields stay as first persisted; only the mutable
                // fields move. Idempotent by id.
                existing.hits = item.hits;
                existing.last_seen = item.last_seen;
                existing.source_evidence = item.source_evidence;
                Ok(existing.clone())
            }
            None => {
                map.insert(item.id, item.clone());
                Ok(item)
            }
        }
    }

    async fn increment_hit(
        &self,
        id: Uuid,
        evidence: Vec<SourceEvidence>,
        now: DateTime<Utc>,
    ) -> Result<Item> {
        let mut map = self.items.lock().unwrap();
        let item = map.get_mut(&id).ok_or(Error::ItemNotFound(id))?;
        item.hits += 1;
        item.last_seen = now;
        item.source_evidence.extend(evidence);
        Ok(item.clone())
    }

    async fn count(&self, item_type: ItemType) -> Result<i64> {
        let map = self.items.lock().unwrap();
        Ok(map.values().filter(|i| i.item_type == item_type).count() as i64)
    }
}
