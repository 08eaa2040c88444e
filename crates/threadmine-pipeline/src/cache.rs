//! Clock-injected TTL cache for library slices.
//!
//! An explicit cache object handed into the run controller by reference, in
//! place of any process-wide mutable state: the clock is injected (tests
//! drive a fixed one), expiry is checked on read, and invalidation is
//! explicit. One run's harmonization invalidates the slice so the next run
//! in the burst refetches.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use threadmine_core::{Clock, Item, ItemType};

/// TTL cache of same-type library slices.
pub struct LibraryCache {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: Mutex<HashMap<ItemType, CacheEntry>>,
}

struct CacheEntry {
    stored_at: DateTime<Utc>,
    items: Vec<Item>,
}

impl LibraryCache {
    pub fn new(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            clock,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cache with the default TTL.
    pub fn with_default_ttl(clock: Arc<dyn Clock>) -> Self {
        Self::new(
            clock,
            Duration::seconds(threadmine_core::defaults::CACHE_TTL_SECS),
        )
    }

    /// Cached slice for a type, unless missing or expired.
    pub fn get(&self, item_type: ItemType) -> Option<Vec<Item>> {
        let now = self.clock.now();
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(&item_type)?;
        if now - entry.stored_at >= self.ttl {
            debug!(item_type = %item_type, "Cache entry expired");
            return None;
        }
        Some(entry.items.clone())
    }

    /// Store a slice, stamping it with the injected clock.
    pub fn put(&self, item_type: ItemType, items: Vec<Item>) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            item_type,
            CacheEntry {
                stored_at: self.clock.now(),
                items,
            },
        );
    }

    /// Drop one type's entry; the next read refetches.
    pub fn invalidate(&self, item_type: ItemType) {
        self.entries.lock().unwrap().remove(&item_type);
    }

    /// Drop everything.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}
