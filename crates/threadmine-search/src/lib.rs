//! # threadmine-search
//!
//! The algorithmic middle of the pipeline:
//! - [`orchestrator`]: concurrent seed-query fan-out over the similarity
//!   index with partial-failure tolerance
//! - [`dedup`]: single-linkage clustering of candidates against the library
//!   by embedding similarity
//! - [`rank`]: LLM-judged quality ordering with deterministic tiebreaks and
//!   graceful degradation

pub mod dedup;
pub mod orchestrator;
pub mod rank;

pub use dedup::{deduplicate, find_library_match, DedupConfig, DedupOutcome, DisjointSet};
pub use orchestrator::{
    seed_queries, SearchConfig, SearchOrchestrator, SearchOutcome, SeedFragment,
};
pub use rank::{RankConfig, RankOutcome, Ranker};
