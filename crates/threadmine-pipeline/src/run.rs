//! The run controller: one pipeline execution from time window to library
//! delta.
//!
//! Phases run strictly forward (`confirming → searching → generating →
//! deduplicating → ranking → integrating → complete`), each transition
//! emitting a `phase` event plus whatever `stat`/`warning`/`cost` events the
//! phase produces. Cancellation is cooperative, checked between phases and
//! inside the search fan-out; a cancelled run emits `phase{stopped}` as its
//! terminal event and in-flight collaborator calls are left to finish with
//! their results discarded.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use threadmine_core::{
    events, CancelToken, Clock, EmbeddingBackend, Error, EventSender, GenerationBackend,
    GenerationRequest, Item, ItemType, LibraryStore, Result, RunEvent, RunPhase, RunRequest,
    RunStats, SimilarityIndex, SourceEvidence,
};
use threadmine_search::{
    dedup::{deduplicate, DedupConfig},
    orchestrator::{SearchConfig, SearchOrchestrator, SeedFragment},
    rank::{RankConfig, Ranker},
};

use crate::cache::LibraryCache;
use crate::extract::extract_candidates;
use crate::harmonize::Harmonizer;

/// Tuning knobs for the run controller.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub search: SearchConfig,
    pub rank: RankConfig,
    /// Dollars per token for cost events; zero for local models.
    pub cost_per_token: f64,
    /// Fragments fed into the generation prompt.
    pub max_prompt_fragments: usize,
    /// Source back-references attached to each candidate.
    pub max_evidence_per_item: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            rank: RankConfig::default(),
            cost_per_token: threadmine_core::defaults::COST_PER_TOKEN,
            max_prompt_fragments: 30,
            max_evidence_per_item: 5,
        }
    }
}

/// Handle to a started run: its event stream and cancellation.
pub struct RunHandle {
    pub run_id: Uuid,
    pub events: mpsc::UnboundedReceiver<RunEvent>,
    cancel: CancelToken,
}

impl RunHandle {
    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Token for wiring cancellation into an outer scope.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }
}

/// Sequences the pipeline phases and owns their error/cancel policy.
#[derive(Clone)]
pub struct RunController {
    generator: Arc<dyn GenerationBackend>,
    judge: Arc<dyn GenerationBackend>,
    embedder: Arc<dyn EmbeddingBackend>,
    index: Arc<dyn SimilarityIndex>,
    store: Arc<dyn LibraryStore>,
    clock: Arc<dyn Clock>,
    cache: Arc<LibraryCache>,
    config: RunnerConfig,
}

impl RunController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator: Arc<dyn GenerationBackend>,
        judge: Arc<dyn GenerationBackend>,
        embedder: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn SimilarityIndex>,
        store: Arc<dyn LibraryStore>,
        clock: Arc<dyn Clock>,
        cache: Arc<LibraryCache>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            generator,
            judge,
            embedder,
            index,
            store,
            clock,
            cache,
            config,
        }
    }

    /// Spawn a run as its own task and hand back its stream and cancel
    /// handle.
    pub fn start(&self, request: RunRequest) -> RunHandle {
        let run_id = threadmine_core::new_v7();
        let (sender, receiver) = events::channel();
        let cancel = CancelToken::new();

        let controller = self.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            controller.execute(run_id, request, sender, task_cancel).await;
        });

        RunHandle {
            run_id,
            events: receiver,
            cancel,
        }
    }

    /// Run the whole pipeline, emitting events until a terminal one.
    ///
    /// Never returns an error: every failure becomes a terminal `error`
    /// event on the stream, scoped to this run alone.
    #[instrument(skip_all, fields(subsystem = "pipeline", op = "run", run_id = %run_id, item_type = %request.item_type))]
    pub async fn execute(
        &self,
        run_id: Uuid,
        request: RunRequest,
        events: EventSender,
        cancel: CancelToken,
    ) {
        let mut stats = RunStats::default();

        events.phase(RunPhase::Confirming);
        if let Err(e) = request.validate() {
            warn!(error = %e, "Run rejected before any external call");
            events.error(&e);
            return;
        }

        // ------------------------------------------------------------------
        // Searching
        // ------------------------------------------------------------------
        if self.stopped(&cancel, &events) {
            return;
        }
        events.phase(RunPhase::Searching);

        let orchestrator = SearchOrchestrator::new(
            self.index.clone(),
            self.embedder.clone(),
            self.config.search.clone(),
        );
        let search = match orchestrator
            .search_window(request.item_type, &request.time_window, &cancel)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                events.error(&e);
                return;
            }
        };
        for warning in &search.warnings {
            events.warning(warning.clone());
        }
        stats.conversations_found = search.fragments.len();
        events.stat("conversations_found", stats.conversations_found);

        if search.fragments.is_empty() && !cancel.is_cancelled() {
            let e = Error::NoData(format!(
                "No conversation fragments found between {} and {}",
                request.time_window.start, request.time_window.end
            ));
            events.error(&e);
            return;
        }

        // ------------------------------------------------------------------
        // Generating
        // ------------------------------------------------------------------
        if self.stopped(&cancel, &events) {
            return;
        }
        events.phase(RunPhase::Generating);

        let prompt = build_generation_prompt(
            request.item_type,
            request.item_count,
            &search.fragments,
            self.config.max_prompt_fragments,
        );
        let generation = match self
            .generator
            .generate(
                GenerationRequest::new(prompt, request.temperature)
                    .with_item_count(request.item_count),
            )
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, category = %e.category(), "Generation failed");
                events.error(&e);
                return;
            }
        };
        self.track_cost(&mut stats, generation.tokens_in, generation.tokens_out, &events);

        let extraction =
            extract_candidates(&generation.text, request.item_type, request.item_count);
        for warning in &extraction.warnings {
            events.warning(warning.clone());
        }

        let evidence = evidence_from(&search.fragments, self.config.max_evidence_per_item);
        let mut candidates = extraction.candidates;
        for candidate in &mut candidates {
            candidate.evidence = evidence.clone();
        }
        stats.items_generated = candidates.len();
        events.stat("items_generated", stats.items_generated);

        // ------------------------------------------------------------------
        // Deduplicating
        // ------------------------------------------------------------------
        if self.stopped(&cancel, &events) {
            return;
        }
        events.phase(RunPhase::Deduplicating);

        let library = match self.library_slice(request.item_type).await {
            Ok(items) => items,
            Err(e) => {
                events.error(&e);
                return;
            }
        };
        let dedup_config = DedupConfig {
            threshold: request.dedup_threshold,
            ..Default::default()
        };
        let dedup = match deduplicate(candidates, &library, &self.embedder, &dedup_config).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                events.error(&e);
                return;
            }
        };
        stats.items_after_dedup = dedup.candidates.len();
        events.stat("items_after_dedup", stats.items_after_dedup);
        events.stat("duplicates_dropped", dedup.duplicates_dropped);

        // ------------------------------------------------------------------
        // Ranking
        // ------------------------------------------------------------------
        if self.stopped(&cancel, &events) {
            return;
        }
        events.phase(RunPhase::Ranking);

        let ranker = Ranker::new(self.judge.clone(), self.config.rank.clone());
        let ranked = ranker.rank(dedup.candidates).await;
        if let Some(message) = &ranked.degraded {
            events.warning(message.clone());
        }
        if ranked.tokens_in > 0 || ranked.tokens_out > 0 {
            self.track_cost(&mut stats, ranked.tokens_in, ranked.tokens_out, &events);
        }

        // ------------------------------------------------------------------
        // Integrating
        // ------------------------------------------------------------------
        if self.stopped(&cancel, &events) {
            return;
        }
        events.phase(RunPhase::Integrating);

        let harmonizer = Harmonizer::new(self.store.clone(), self.clock.clone());
        let harmonized = harmonizer
            .harmonize(request.item_type, ranked.items, request.dedup_threshold)
            .await;
        for warning in &harmonized.warnings {
            events.warning(warning.clone());
        }
        stats.items_added = harmonized.delta.items_added;
        stats.items_merged = harmonized.delta.items_merged;
        events.stat("items_added", stats.items_added);
        events.stat("items_merged", stats.items_merged);
        events.stat("library_size", harmonized.delta.library_size);

        // The library changed under this cache entry
        self.cache.invalidate(request.item_type);

        if let Some(failure) = harmonized.failure {
            // Applied deltas stand; the stats above already said how far we got
            events.error(&failure);
            return;
        }

        info!(
            items_added = stats.items_added,
            items_merged = stats.items_merged,
            "Run complete"
        );
        events.complete(stats);
    }

    /// Terminal-stop helper: emits `phase{stopped}` when cancelled.
    fn stopped(&self, cancel: &CancelToken, events: &EventSender) -> bool {
        if cancel.is_cancelled() {
            info!("Run cancelled; stopping before next phase");
            events.phase(RunPhase::Stopped);
            true
        } else {
            false
        }
    }

    /// Cached same-type library slice, refetched on miss.
    async fn library_slice(&self, item_type: ItemType) -> Result<Vec<Item>> {
        if let Some(items) = self.cache.get(item_type) {
            return Ok(items);
        }
        let items = self.store.get(item_type).await?;
        self.cache.put(item_type, items.clone());
        Ok(items)
    }

    fn track_cost(
        &self,
        stats: &mut RunStats,
        tokens_in: i64,
        tokens_out: i64,
        events: &EventSender,
    ) {
        stats.tokens_in += tokens_in;
        stats.tokens_out += tokens_out;
        stats.cost = (stats.tokens_in + stats.tokens_out) as f64 * self.config.cost_per_token;
        events.cost(tokens_in, tokens_out, stats.cost);
    }
}

/// Prompt asking the model for numbered item blocks over fragment excerpts.
fn build_generation_prompt(
    item_type: ItemType,
    item_count: usize,
    fragments: &[SeedFragment],
    max_fragments: usize,
) -> String {
    let noun = match item_type {
        ItemType::Idea => "distinct project ideas",
        ItemType::Insight => "distinct insights",
        ItemType::UseCase => "distinct use cases",
    };

    let mut prompt = format!(
        "Below are excerpts from a user's coding-assistant conversations.\n\
         Identify up to {} {} that recur across them.\n\
         Format each as a numbered block:\n\
         ### 1. Short title\n\
         One-paragraph description.\n\
         If the excerpts contain nothing noteworthy, reply with exactly\n\
         {} and nothing else.\n\n",
        item_count,
        noun,
        crate::extract::NO_ITEMS_SENTINEL,
    );

    for seed_fragment in fragments.iter().take(max_fragments) {
        let excerpt: String = seed_fragment.fragment.text.chars().take(700).collect();
        prompt.push_str("---\n");
        prompt.push_str(&excerpt);
        prompt.push('\n');
    }
    prompt
}

/// Source back-references from the best fragments, for item evidence.
fn evidence_from(fragments: &[SeedFragment], limit: usize) -> Vec<SourceEvidence> {
    fragments
        .iter()
        .take(limit)
        .filter_map(|f| {
            f.fragment.occurred_at.map(|occurred_at| SourceEvidence {
                conversation_id: f.fragment.source_id.clone(),
                occurred_at,
            })
        })
        .collect()
}
