//! Core traits for threadmine abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy. The LLM provider, embedding model, and vector index are external
//! collaborators; everything the pipeline needs from them is captured here,
//! which is what makes the whole pipeline testable against mocks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    ///
    /// Callers filter out sub-minimum-length texts before calling; the
    /// backend embeds exactly what it is given.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of returned vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

/// One text-generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Number of items the prompt asks for; None for judging calls.
    pub item_count: Option<usize>,
    pub temperature: f32,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, temperature: f32) -> Self {
        Self {
            prompt: prompt.into(),
            item_count: None,
            temperature,
        }
    }

    pub fn with_item_count(mut self, count: usize) -> Self {
        self.item_count = Some(count);
        self
    }
}

/// Generation output with token accounting for cost events.
#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub tokens_in: i64,
    pub tokens_out: i64,
}

/// Backend for text generation (LLM).
///
/// Failure modes (auth, rate limit, timeout) must surface as the
/// distinguishable [`crate::Error`] variants so the run controller can emit
/// a categorized terminal error.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text for a prompt at the given temperature.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse>;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// SIMILARITY INDEX TRAITS
// =============================================================================

/// Vector index over the user's conversation history.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Nearest fragments to `query` within a time window.
    ///
    /// Returns at most `k` fragments with similarity ≥ `min_similarity`.
    async fn search(
        &self,
        query: &Vector,
        window: &TimeWindow,
        k: i64,
        min_similarity: f32,
    ) -> Result<Vec<Fragment>>;
}

// =============================================================================
// LIBRARY STORE TRAITS
// =============================================================================

/// Durable store for the deduplicated item library.
///
/// `increment_hit` must serialize its read-modify-write per item (atomic
/// UPDATE or per-item lock) so concurrent runs never lose `hits`/`last_seen`
/// updates.
#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// All persisted items of one type.
    async fn get(&self, item_type: ItemType) -> Result<Vec<Item>>;

    /// Insert or replace an item by id. Idempotent by id.
    async fn upsert(&self, item: Item) -> Result<Item>;

    /// Record a merge: hits += 1, last_seen = now, evidence appended.
    /// Title, description, and embedding are never touched.
    async fn increment_hit(
        &self,
        id: Uuid,
        evidence: Vec<SourceEvidence>,
        now: DateTime<Utc>,
    ) -> Result<Item>;

    /// Number of persisted items of one type. Used by the reconciliation
    /// check after a dropped stream.
    async fn count(&self, item_type: ItemType) -> Result<i64>;
}

// =============================================================================
// CLOCK
// =============================================================================

/// Injectable time source.
///
/// Everything that stamps `first_seen`/`last_seen` or expires cache entries
/// reads time through this trait, so tests can drive a fixed clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    now: std::sync::Arc<std::sync::Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: std::sync::Arc::new(std::sync::Mutex::new(now)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock().unwrap();
        *now += delta;
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_request_builder() {
        let req = GenerationRequest::new("find recurring themes", 0.7).with_item_count(5);
        assert_eq!(req.prompt, "find recurring themes");
        assert_eq!(req.item_count, Some(5));
        assert_eq!(req.temperature, 0.7);
    }

    #[test]
    fn test_generation_request_judging_has_no_count() {
        let req = GenerationRequest::new("score these", crate::defaults::JUDGE_TEMPERATURE);
        assert!(req.item_count.is_none());
    }

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_fixed_clock_is_deterministic() {
        let start = chrono::TimeZone::with_ymd_and_hms(&Utc, 2026, 3, 1, 9, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);
        assert_eq!(clock.now(), start);

        clock.advance(chrono::Duration::minutes(5));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(5));
    }

    #[test]
    fn test_traits_are_object_safe() {
        fn assert_dyn(_: Option<&dyn EmbeddingBackend>) {}
        fn assert_dyn_gen(_: Option<&dyn GenerationBackend>) {}
        fn assert_dyn_index(_: Option<&dyn SimilarityIndex>) {}
        fn assert_dyn_store(_: Option<&dyn LibraryStore>) {}
        fn assert_dyn_clock(_: Option<&dyn Clock>) {}

        assert_dyn(None);
        assert_dyn_gen(None);
        assert_dyn_index(None);
        assert_dyn_store(None);
        assert_dyn_clock(None);
    }
}
