//! Concurrent seed-query fan-out over the similarity index.
//!
//! One query per seed string, per day bucket, all running under a bounded
//! concurrency cap with an individual timeout on every call. A failed seed
//! contributes zero fragments and one warning; the phase itself never fails
//! on partial loss. Total latency is bounded by the slowest single query,
//! not the sum.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, instrument, warn};

use threadmine_core::{
    CancelToken, EmbeddingBackend, Fragment, ItemType, Result, SimilarityIndex, TimeWindow,
};
use threadmine_inference::{retry_with_backoff, RetryPolicy};

/// Seed query strings per item type.
///
/// Each seed probes a semantically distinct angle of the conversation
/// history, so their result sets overlap little and union well.
pub fn seed_queries(item_type: ItemType) -> &'static [&'static str] {
    match item_type {
        ItemType::Idea => &[
            "project ideas worth building",
            "features the user wished existed",
            "tools or automations proposed during discussion",
            "improvements suggested for existing workflows",
            "side projects and experiments mentioned",
        ],
        ItemType::Insight => &[
            "notable decisions and their reasoning",
            "recurring pain points and frustrations",
            "lessons learned from debugging sessions",
            "surprising discoveries about tools or libraries",
            "patterns in how problems were solved",
        ],
        ItemType::UseCase => &[
            "tasks the assistant was asked to perform",
            "workflows delegated to automation",
            "repetitive requests across conversations",
            "problems brought to the assistant repeatedly",
            "ways the assistant saved the user time",
        ],
    }
}

/// Configuration for the search fan-out.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Maximum concurrent similarity-index queries.
    pub concurrency: usize,
    /// Per-query timeout; one slow query cannot stall the phase.
    pub per_query_timeout: Duration,
    /// Fragments requested per query.
    pub top_k: i64,
    /// Minimum similarity for a fragment to count.
    pub min_similarity: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            concurrency: threadmine_core::defaults::SEARCH_CONCURRENCY,
            per_query_timeout: Duration::from_secs(
                threadmine_core::defaults::SEARCH_TIMEOUT_SECS,
            ),
            top_k: threadmine_core::defaults::SEARCH_TOP_K,
            min_similarity: threadmine_core::defaults::SEARCH_MIN_SIMILARITY,
        }
    }
}

/// A fragment annotated with the seed that found it (diagnostics only).
#[derive(Debug, Clone)]
pub struct SeedFragment {
    pub fragment: Fragment,
    pub seed: String,
}

/// Union of fragments found across all seeds, plus per-seed warnings.
#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub fragments: Vec<SeedFragment>,
    pub warnings: Vec<String>,
}

/// Fans seed queries out over the similarity index.
pub struct SearchOrchestrator {
    index: Arc<dyn SimilarityIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    config: SearchConfig,
}

impl SearchOrchestrator {
    pub fn new(
        index: Arc<dyn SimilarityIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
        config: SearchConfig,
    ) -> Self {
        Self {
            index,
            embedder,
            config,
        }
    }

    /// Search one time window for fragments relevant to the item type.
    ///
    /// Multi-day windows are split into day buckets; buckets and seeds share
    /// one concurrency cap. Cancellation is checked before each sub-query.
    /// The embedding of seed strings is the only hard prerequisite; if that
    /// fails (after bounded retries) the phase fails.
    #[instrument(skip(self, cancel), fields(subsystem = "search", op = "orchestrate", item_type = %item_type))]
    pub async fn search_window(
        &self,
        item_type: ItemType,
        window: &TimeWindow,
        cancel: &CancelToken,
    ) -> Result<SearchOutcome> {
        let seeds = seed_queries(item_type);
        let seed_texts: Vec<String> = seeds.iter().map(|s| s.to_string()).collect();

        let embedder = self.embedder.clone();
        let texts = seed_texts.clone();
        let seed_vectors = retry_with_backoff(RetryPolicy::default(), "embed_seeds", || {
            let embedder = embedder.clone();
            let texts = texts.clone();
            async move { embedder.embed_texts(&texts).await }
        })
        .await?;

        let buckets = window.day_buckets();
        debug!(
            seed_count = seeds.len(),
            bucket_count = buckets.len(),
            "Starting search fan-out"
        );

        // One task per (bucket, seed); all share the concurrency cap
        let mut tasks = Vec::new();
        for bucket in &buckets {
            for (seed, vector) in seed_texts.iter().zip(seed_vectors.iter()) {
                tasks.push((*bucket, seed.clone(), vector.clone()));
            }
        }

        let results: Vec<QueryResult> = stream::iter(tasks)
            .map(|(bucket, seed, vector)| {
                let index = self.index.clone();
                let config = self.config.clone();
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return QueryResult::Cancelled;
                    }
                    let search = index.search(
                        &vector,
                        &bucket,
                        config.top_k,
                        config.min_similarity,
                    );
                    match tokio::time::timeout(config.per_query_timeout, search).await {
                        Ok(Ok(fragments)) => QueryResult::Hit { seed, fragments },
                        Ok(Err(e)) => QueryResult::Failed {
                            seed,
                            message: e.to_string(),
                        },
                        Err(_) => QueryResult::Failed {
                            seed,
                            message: format!(
                                "timed out after {}s",
                                config.per_query_timeout.as_secs()
                            ),
                        },
                    }
                }
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut outcome = SearchOutcome::default();
        let mut best: std::collections::HashMap<String, SeedFragment> =
            std::collections::HashMap::new();

        for result in results {
            match result {
                QueryResult::Hit { seed, fragments } => {
                    for fragment in fragments {
                        let entry = best.entry(fragment.source_id.clone());
                        match entry {
                            std::collections::hash_map::Entry::Occupied(mut o) => {
                                if fragment.score > o.get().fragment.score {
                                    o.insert(SeedFragment {
                                        fragment,
                                        seed: seed.clone(),
                                    });
                                }
                            }
                            std::collections::hash_map::Entry::Vacant(v) => {
                                v.insert(SeedFragment {
                                    fragment,
                                    seed: seed.clone(),
                                });
                            }
                        }
                    }
                }
                QueryResult::Failed { seed, message } => {
                    warn!(seed = %seed, error = %message, "Search seed failed");
                    outcome
                        .warnings
                        .push(format!("Search seed '{}' failed: {}", seed, message));
                }
                QueryResult::Cancelled => {}
            }
        }

        let mut fragments: Vec<SeedFragment> = best.into_values().collect();
        // Deterministic output order: best fragments first, id as tiebreak
        fragments.sort_by(|a, b| {
            b.fragment
                .score
                .partial_cmp(&a.fragment.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.fragment.source_id.cmp(&b.fragment.source_id))
        });
        outcome.fragments = fragments;

        debug!(
            result_count = outcome.fragments.len(),
            warning_count = outcome.warnings.len(),
            "Search fan-out complete"
        );
        Ok(outcome)
    }
}

enum QueryResult {
    Hit {
        seed: String,
        fragments: Vec<Fragment>,
    },
    Failed {
        seed: String,
        message: String,
    },
    Cancelled,
}
