//! Centralized default constants for the threadmine system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. When adding new constants, place them in the appropriate
//! section and document the rationale for the chosen value.

// =============================================================================
// RUN REQUEST
// =============================================================================

/// Default number of items to request per generation run.
pub const ITEM_COUNT: usize = 5;

/// Default duplicate threshold: cosine similarity at or above this makes two
/// items "the same" for dedup and harmonization.
pub const DEDUP_THRESHOLD: f32 = 0.85;

/// Default sampling temperature for item generation.
pub const GEN_TEMPERATURE: f32 = 0.7;

/// Fixed low temperature for ranking/judging calls; kept near-greedy so
/// repeated runs score the same candidates the same way.
pub const JUDGE_TEMPERATURE: f32 = 0.1;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Texts shorter than this are skipped before embedding; the call would be
/// wasted on content that can't carry a meaningful vector.
pub const MIN_EMBED_CHARS: usize = 12;

// =============================================================================
// SEARCH
// =============================================================================

/// Maximum concurrent similarity-index queries (seed fan-out and day
/// buckets share this cap). Kept low to respect external rate limits.
pub const SEARCH_CONCURRENCY: usize = 10;

/// Per-query timeout for a single similarity-index call in seconds.
pub const SEARCH_TIMEOUT_SECS: u64 = 20;

/// Fragments requested per seed query.
pub const SEARCH_TOP_K: i64 = 20;

/// Minimum similarity for a fragment to count as a search hit.
pub const SEARCH_MIN_SIMILARITY: f32 = 0.3;

// =============================================================================
// INFERENCE
// =============================================================================

/// Default Ollama base URL.
pub const OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default generation model name (Ollama).
pub const GEN_MODEL: &str = "gpt-oss:20b";

/// Timeout for embedding requests in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 30;

/// Timeout for generation requests in seconds.
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Maximum attempts for embedding and search calls. Generation and judging
/// calls are never retried; they abort or degrade their phase instead.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base delay for bounded exponential backoff in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 250;

/// Cost per token in dollars. Local models are free; callers pointing at a
/// metered provider override this.
pub const COST_PER_TOKEN: f64 = 0.0;

// =============================================================================
// PROGRESS STREAM
// =============================================================================

/// Inactivity window after which a stream consumer treats the run as
/// stalled. The controller itself has no internal deadline.
pub const STREAM_INACTIVITY_TIMEOUT_SECS: u64 = 90;

// =============================================================================
// SESSION CACHE
// =============================================================================

/// Time-to-live for cached library slices in seconds.
pub const CACHE_TTL_SECS: i64 = 300;
