//! Structured logging schema and field name constants for threadmine.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (run start/finish), phase completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (fragments, edges) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Run UUID propagated across every phase of one pipeline execution.
pub const RUN_ID: &str = "run_id";

/// Subsystem originating the log event.
/// Values: "search", "inference", "store", "pipeline"
pub const SUBSYSTEM: &str = "subsystem";

/// Logical operation name.
/// Examples: "orchestrate", "dedup", "rank", "harmonize", "embed_texts"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Library item UUID being operated on.
pub const ITEM_ID: &str = "item_id";

/// Item type being mined ("idea", "insight", "use_case").
pub const ITEM_TYPE: &str = "item_type";

/// Run phase name.
pub const PHASE: &str = "phase";

/// Seed query string a search result came from.
pub const SEED: &str = "seed";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Number of clusters produced by deduplication.
pub const CLUSTER_COUNT: &str = "cluster_count";

/// Similarity threshold in effect.
pub const THRESHOLD: &str = "threshold";

/// Tokens consumed by a generation call (prompt side).
pub const TOKENS_IN: &str = "tokens_in";

/// Tokens produced by a generation call.
pub const TOKENS_OUT: &str = "tokens_out";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
