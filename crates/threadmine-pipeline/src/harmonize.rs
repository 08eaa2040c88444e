//! Merges ranked candidates into the persistent library.
//!
//! Per item: a candidate tagged as matching an existing item takes the merge
//! path (hits += 1, last_seen moves, evidence appended); a new candidate is
//! re-checked against the current library slice before insert. The re-check
//! is what makes harmonization idempotent per item and what enforces the
//! library's no-duplicate invariant, including under concurrent runs and
//! replays.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use threadmine_core::{
    Clock, DedupTag, Error, HarmonizeDelta, Item, ItemType, LibraryStore, RankedItem, Result,
};
use threadmine_search::dedup::find_library_match;

/// Result of one harmonization pass.
///
/// `delta` always reflects what was actually applied. A mid-batch store
/// failure shows up in `failure` with the applied prefix already counted;
/// applied deltas stay valid.
#[derive(Debug, Default)]
pub struct HarmonizeOutcome {
    pub delta: HarmonizeDelta,
    pub warnings: Vec<String>,
    pub failure: Option<Error>,
}

/// Reconciles ranked items against the persistent library.
pub struct Harmonizer {
    store: Arc<dyn LibraryStore>,
    clock: Arc<dyn Clock>,
}

impl Harmonizer {
    pub fn new(store: Arc<dyn LibraryStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Merge ranked items into the library, one at a time.
    ///
    /// Items are processed in ranked order so that when a later candidate
    /// duplicates an earlier one's fresh insert, the re-check routes it to
    /// the merge path against the item just added.
    #[instrument(skip_all, fields(subsystem = "pipeline", op = "harmonize", item_type = %item_type, input_count = items.len(), threshold))]
    pub async fn harmonize(
        &self,
        item_type: ItemType,
        items: Vec<RankedItem>,
        threshold: f32,
    ) -> HarmonizeOutcome {
        let mut outcome = HarmonizeOutcome::default();

        // Current same-type slice; freshly added items are appended so the
        // re-check sees them too
        let mut library = match self.store.get(item_type).await {
            Ok(items) => items,
            Err(e) => {
                outcome.failure = Some(e);
                return outcome;
            }
        };

        for item in items {
            if let Err(e) = self.apply_one(item, &mut library, threshold, &mut outcome).await {
                warn!(error = %e, "Harmonization stopped mid-batch");
                outcome.failure = Some(e);
                break;
            }
        }

        match self.store.count(item_type).await {
            Ok(count) => outcome.delta.library_size = count,
            Err(e) => {
                // Applied deltas are still valid; fall back to the slice size
                warn!(error = %e, "Library count failed after harmonize");
                outcome.delta.library_size = library.len() as i64;
            }
        }

        info!(
            items_added = outcome.delta.items_added,
            items_merged = outcome.delta.items_merged,
            library_size = outcome.delta.library_size,
            "Harmonization complete"
        );
        outcome
    }

    async fn apply_one(
        &self,
        item: RankedItem,
        library: &mut Vec<Item>,
        threshold: f32,
        outcome: &mut HarmonizeOutcome,
    ) -> Result<()> {
        let now = self.clock.now();
        let candidate = item.candidate;

        match item.tag {
            DedupTag::MatchesExisting(id) => {
                let updated = self
                    .store
                    .increment_hit(id, candidate.evidence.clone(), now)
                    .await?;
                debug!(item_id = %id, hits = updated.hits, "Merged into existing item");
                refresh_slice(library, updated);
                outcome.delta.items_merged += 1;
            }
            DedupTag::New => {
                let Some(embedding) = candidate.embedding.clone() else {
                    // Too short to embed, so it can never be compared again;
                    // persisting it would let invisible duplicates pile up
                    outcome.warnings.push(format!(
                        "Skipped '{}': no embedding available",
                        candidate.title
                    ));
                    return Ok(());
                };

                // Defensive re-check against the live slice. Replays and
                // same-batch near-duplicates resolve to the merge path here.
                if let Some(matched) = find_library_match(&embedding, library, threshold) {
                    let updated = self
                        .store
                        .increment_hit(matched, candidate.evidence.clone(), now)
                        .await?;
                    debug!(item_id = %matched, "New candidate re-resolved to existing item");
                    refresh_slice(library, updated);
                    outcome.delta.items_merged += 1;
                    return Ok(());
                }

                let new_item = Item {
                    id: threadmine_core::new_v7(),
                    item_type: candidate.item_type,
                    title: candidate.title,
                    description: candidate.description,
                    embedding,
                    hits: 1,
                    first_seen: now,
                    last_seen: now,
                    source_evidence: candidate.evidence,
                };
                let persisted = self.store.upsert(new_item).await?;
                debug!(item_id = %persisted.id, "Persisted new item");
                library.push(persisted);
                outcome.delta.items_added += 1;
            }
        }
        Ok(())
    }
}

/// Replace the in-memory copy of an updated item so later re-checks see the
/// current state.
fn refresh_slice(library: &mut [Item], updated: Item) {
    if let Some(slot) = library.iter_mut().find(|i| i.id == updated.id) {
        *slot = updated;
    }
}
