//! Mock inference backends for deterministic testing.
//!
//! Provides mock implementations of the embedding, generation, and
//! similarity-index collaborators that produce deterministic output, log
//! their calls for assertion, and can inject failures on demand.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use threadmine_core::{
    EmbeddingBackend, Error, Fragment, GenerationBackend, GenerationRequest, GenerationResponse,
    Result, SimilarityIndex, TimeWindow, Vector,
};

/// Failure kind a mock can inject, mirroring the collaborator error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Auth,
    RateLimit,
    Timeout,
    Generic,
}

impl MockFailure {
    fn to_error(self, op: &str) -> Error {
        match self {
            Self::Auth => Error::Unauthorized(format!("mock {} auth failure", op)),
            Self::RateLimit => Error::RateLimited(format!("mock {} rate limit", op)),
            Self::Timeout => Error::Timeout(format!("mock {} timeout", op)),
            Self::Generic => Error::Generation(format!("mock {} failure", op)),
        }
    }
}

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
    response_queue: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    fixed_responses: HashMap<String, String>,
    default_response: String,
    latency_ms: u64,
    failure_rate: f64,
    generation_failure: Option<MockFailure>,
    embedding_failure: Option<MockFailure>,
}

#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 384,
            fixed_responses: HashMap::new(),
            default_response: "Mock response".to_string(),
            latency_ms: 0,
            failure_rate: 0.0,
            generation_failure: None,
            embedding_failure: None,
        }
    }
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
            response_queue: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set a fixed response for generation requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Add a response mapping for a specific prompt.
    pub fn with_response_mapping(
        mut self,
        prompt: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .fixed_responses
            .insert(prompt.into(), output.into());
        self
    }

    /// Queue responses returned in order, ahead of mappings and the default.
    pub fn with_response_sequence(self, responses: Vec<String>) -> Self {
        {
            let mut queue = self.response_queue.lock().unwrap();
            *queue = responses;
            queue.reverse(); // pop from the back in FIFO order
        }
        self
    }

    /// Set simulated latency for all operations.
    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        Arc::make_mut(&mut self.config).latency_ms = latency_ms;
        self
    }

    /// Set random failure rate (0.0 - 1.0) for soak-style tests.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Make every generation call fail with the given kind.
    pub fn with_generation_failure(mut self, kind: MockFailure) -> Self {
        Arc::make_mut(&mut self.config).generation_failure = Some(kind);
        self
    }

    /// Make every embedding call fail with the given kind.
    pub fn with_embedding_failure(mut self, kind: MockFailure) -> Self {
        Arc::make_mut(&mut self.config).embedding_failure = Some(kind);
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.call_log.lock().unwrap().clear()
    }

    /// Number of embed calls made.
    pub fn embed_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "embed")
            .count()
    }

    /// Number of generation calls made.
    pub fn generate_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "generate")
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    fn should_fail_randomly(&self) -> bool {
        use rand::Rng;
        if self.config.failure_rate > 0.0 {
            rand::thread_rng().gen::<f64>() < self.config.failure_rate
        } else {
            false
        }
    }

    async fn simulate_latency(&self) {
        if self.config.latency_ms > 0 {
            tokio::time::sleep(tokio::time::Duration::from_millis(self.config.latency_ms)).await;
        }
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        self.simulate_latency().await;

        if let Some(kind) = self.config.embedding_failure {
            for text in texts {
                self.log_call("embed_failed", text);
            }
            return Err(kind.to_error("embed"));
        }

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            self.log_call("embed", text);
            if self.should_fail_randomly() {
                return Err(Error::Embedding("simulated failure".to_string()));
            }
            vectors.push(Vector::from(MockEmbeddingGenerator::generate(
                text,
                self.config.dimension,
            )));
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse> {
        self.log_call("generate", &request.prompt);
        self.simulate_latency().await;

        if let Some(kind) = self.config.generation_failure {
            return Err(kind.to_error("generate"));
        }
        if self.should_fail_randomly() {
            return Err(Error::Generation("simulated failure".to_string()));
        }

        let text = if let Some(queued) = self.response_queue.lock().unwrap().pop() {
            queued
        } else if let Some(mapped) = self.config.fixed_responses.get(&request.prompt) {
            mapped.clone()
        } else {
            self.config.default_response.clone()
        };

        // Rough but deterministic token accounting for cost-event tests
        let tokens_in = (request.prompt.len() / 4) as i64;
        let tokens_out = (text.len() / 4) as i64;

        Ok(GenerationResponse {
            text,
            tokens_in,
            tokens_out,
        })
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

// =============================================================================
// Deterministic embedding generator
// =============================================================================

/// Mock embedding generator with deterministic output.
pub struct MockEmbeddingGenerator;

impl MockEmbeddingGenerator {
    /// Generate a deterministic embedding from text.
    ///
    /// Uses character-based hashing for reproducibility: the same text always
    /// produces the same unit vector.
    pub fn generate(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];

        for (i, c) in text.chars().enumerate() {
            let idx = (c as usize + i) % dimension;
            vec[idx] += 0.1;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Generate an embedding from a seed (deterministic pseudo-random vector).
    pub fn generate_with_seed(seed: u64, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0; dimension];
        let mut state = seed;

        // Simple LCG for deterministic pseudo-random values
        for item in vec.iter_mut() {
            state = state.wrapping_mul(1664525).wrapping_add(1013904223);
            *item = ((state % 1000) as f32) / 1000.0 - 0.5;
        }

        Self::normalize(&mut vec);
        vec
    }

    /// Two unit vectors with an exact target cosine similarity.
    ///
    /// Builds the second vector in the plane spanned by the base vector and
    /// an orthogonalized random direction, so the requested similarity is hit
    /// exactly rather than approximately. Essential for threshold-boundary
    /// tests like cosine 0.9 against threshold 0.85.
    pub fn generate_pair_with_similarity(
        base_text: &str,
        dimension: usize,
        similarity: f32,
    ) -> (Vec<f32>, Vec<f32>) {
        let base = Self::generate(base_text, dimension);
        let mut other = Self::generate_with_seed(12345, dimension);

        // Gram-Schmidt: remove the base component to get an orthogonal unit vector
        let dot: f32 = base.iter().zip(other.iter()).map(|(a, b)| a * b).sum();
        for i in 0..dimension {
            other[i] -= dot * base[i];
        }
        Self::normalize(&mut other);

        let sim = similarity.clamp(-1.0, 1.0);
        let ortho_weight = (1.0 - sim * sim).sqrt();
        let mut second = vec![0.0; dimension];
        for i in 0..dimension {
            second[i] = sim * base[i] + ortho_weight * other[i];
        }
        Self::normalize(&mut second);

        (base, second)
    }

    fn normalize(vec: &mut [f32]) {
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
    }
}

// =============================================================================
// Mock similarity index
// =============================================================================

/// In-memory similarity index double.
///
/// Fragments can be registered per query vector (keyed through the
/// deterministic [`MockEmbeddingGenerator`]) or as a default set returned to
/// every query. Specific query vectors can be poisoned to fail, which is how
/// partial-search-tolerance tests knock out one seed of five.
#[derive(Clone, Default)]
pub struct MockSimilarityIndex {
    default_fragments: Arc<Mutex<Vec<Fragment>>>,
    per_query: Arc<Mutex<Vec<(Vec<f32>, Vec<Fragment>)>>>,
    failing_queries: Arc<Mutex<Vec<(Vec<f32>, MockFailure)>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockSimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments returned to any query without a specific registration.
    pub fn with_default_fragments(self, fragments: Vec<Fragment>) -> Self {
        *self.default_fragments.lock().unwrap() = fragments;
        self
    }

    /// Register fragments for one exact query vector.
    pub fn with_fragments_for_query(self, query: Vec<f32>, fragments: Vec<Fragment>) -> Self {
        self.per_query.lock().unwrap().push((query, fragments));
        self
    }

    /// Poison one exact query vector to fail with the given kind.
    pub fn with_failure_for_query(self, query: Vec<f32>, kind: MockFailure) -> Self {
        self.failing_queries.lock().unwrap().push((query, kind));
        self
    }

    /// Total searches performed.
    pub fn search_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    fn vectors_equal(a: &[f32], b: &[f32]) -> bool {
        a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| (x - y).abs() < 1e-6)
    }
}

/// Convenience constructor for test fragments.
pub fn test_fragment(source_id: &str, text: &str, score: f32) -> Fragment {
    Fragment {
        source_id: source_id.to_string(),
        text: text.to_string(),
        score,
        occurred_at: None,
    }
}

#[async_trait]
impl SimilarityIndex for MockSimilarityIndex {
    async fn search(
        &self,
        query: &Vector,
        window: &TimeWindow,
        k: i64,
        min_similarity: f32,
    ) -> Result<Vec<Fragment>> {
        *self.call_count.lock().unwrap() += 1;
        let slice = query.as_slice();

        for (poisoned, kind) in self.failing_queries.lock().unwrap().iter() {
            if Self::vectors_equal(slice, poisoned) {
                return Err(kind.to_error("search"));
            }
        }

        let mut fragments: Vec<Fragment> = {
            let per_query = self.per_query.lock().unwrap();
            per_query
                .iter()
                .find(|(q, _)| Self::vectors_equal(slice, q))
                .map(|(_, f)| f.clone())
                .unwrap_or_else(|| self.default_fragments.lock().unwrap().clone())
        };

        fragments.retain(|f| {
            f.score >= min_similarity && in_window(f.occurred_at, window)
        });
        fragments.truncate(k.max(0) as usize);
        Ok(fragments)
    }
}

fn in_window(occurred_at: Option<DateTime<Utc>>, window: &TimeWindow) -> bool {
    match occurred_at {
        Some(ts) => ts >= window.start && ts < window.end,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use threadmine_core::cosine_similarity;

    fn window() -> TimeWindow {
        TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_mock_backend_embed() {
        let backend = MockInferenceBackend::new().with_dimension(128);
        let vectors = backend
            .embed_texts(&["test".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].as_slice().len(), 128);
    }

    #[tokio::test]
    async fn test_mock_backend_deterministic() {
        let backend = MockInferenceBackend::new();
        let texts = vec!["quantum computing".to_string()];
        let e1 = backend.embed_texts(&texts).await.unwrap();
        let e2 = backend.embed_texts(&texts).await.unwrap();
        assert_eq!(e1[0].as_slice(), e2[0].as_slice());
    }

    #[tokio::test]
    async fn test_mock_backend_generate_fixed() {
        let backend = MockInferenceBackend::new().with_fixed_response("Custom response");
        let resp = backend
            .generate(GenerationRequest::new("test prompt", 0.7))
            .await
            .unwrap();
        assert_eq!(resp.text, "Custom response");
        assert!(resp.tokens_in > 0);
    }

    #[tokio::test]
    async fn test_mock_backend_response_sequence() {
        let backend = MockInferenceBackend::new()
            .with_response_sequence(vec!["first".to_string(), "second".to_string()]);
        let a = backend
            .generate(GenerationRequest::new("p", 0.7))
            .await
            .unwrap();
        let b = backend
            .generate(GenerationRequest::new("p", 0.7))
            .await
            .unwrap();
        assert_eq!(a.text, "first");
        assert_eq!(b.text, "second");
        // Queue exhausted, falls back to default
        let c = backend
            .generate(GenerationRequest::new("p", 0.7))
            .await
            .unwrap();
        assert_eq!(c.text, "Mock response");
    }

    #[tokio::test]
    async fn test_mock_backend_call_logging() {
        let backend = MockInferenceBackend::new();
        backend
            .embed_texts(&["text1".to_string(), "text2".to_string()])
            .await
            .unwrap();
        backend
            .generate(GenerationRequest::new("prompt", 0.7))
            .await
            .unwrap();

        assert_eq!(backend.embed_call_count(), 2);
        assert_eq!(backend.generate_call_count(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_kinds() {
        let backend = MockInferenceBackend::new().with_generation_failure(MockFailure::RateLimit);
        let result = backend.generate(GenerationRequest::new("p", 0.7)).await;
        assert!(matches!(result, Err(Error::RateLimited(_))));
    }

    #[tokio::test]
    async fn test_embedding_failure_kinds() {
        let backend = MockInferenceBackend::new().with_embedding_failure(MockFailure::Timeout);
        let result = backend.embed_texts(&["x".to_string()]).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[test]
    fn test_embedding_generator_normalized() {
        let embedding = MockEmbeddingGenerator::generate("test", 128);
        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((magnitude - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_embedding_generator_with_seed() {
        let e1 = MockEmbeddingGenerator::generate_with_seed(42, 256);
        let e2 = MockEmbeddingGenerator::generate_with_seed(42, 256);
        let e3 = MockEmbeddingGenerator::generate_with_seed(43, 256);
        assert_eq!(e1, e2);
        assert_ne!(e1, e3);
    }

    #[test]
    fn test_pair_with_exact_similarity() {
        for target in [0.5f32, 0.85, 0.9, 0.95] {
            let (a, b) =
                MockEmbeddingGenerator::generate_pair_with_similarity("base item", 384, target);
            let actual = cosine_similarity(&a, &b);
            assert!(
                (actual - target).abs() < 1e-3,
                "target {} got {}",
                target,
                actual
            );
        }
    }

    #[tokio::test]
    async fn test_similarity_index_default_fragments() {
        let index = MockSimilarityIndex::new()
            .with_default_fragments(vec![test_fragment("conv-1", "text", 0.8)]);
        let query = Vector::from(MockEmbeddingGenerator::generate("q", 16));
        let hits = index.search(&query, &window(), 10, 0.3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(index.search_count(), 1);
    }

    #[tokio::test]
    async fn test_similarity_index_min_similarity_filter() {
        let index = MockSimilarityIndex::new().with_default_fragments(vec![
            test_fragment("conv-1", "strong", 0.9),
            test_fragment("conv-2", "weak", 0.1),
        ]);
        let query = Vector::from(MockEmbeddingGenerator::generate("q", 16));
        let hits = index.search(&query, &window(), 10, 0.5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, "conv-1");
    }

    #[tokio::test]
    async fn test_similarity_index_poisoned_query() {
        let poisoned = MockEmbeddingGenerator::generate("bad seed", 16);
        let index = MockSimilarityIndex::new()
            .with_default_fragments(vec![test_fragment("conv-1", "text", 0.8)])
            .with_failure_for_query(poisoned.clone(), MockFailure::Timeout);

        let ok_query = Vector::from(MockEmbeddingGenerator::generate("good seed", 16));
        assert!(index.search(&ok_query, &window(), 10, 0.0).await.is_ok());

        let bad_query = Vector::from(poisoned);
        let result = index.search(&bad_query, &window(), 10, 0.0).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
    }

    #[tokio::test]
    async fn test_similarity_index_k_truncation() {
        let fragments = (0..20)
            .map(|i| test_fragment(&format!("conv-{}", i), "t", 0.9))
            .collect();
        let index = MockSimilarityIndex::new().with_default_fragments(fragments);
        let query = Vector::from(MockEmbeddingGenerator::generate("q", 16));
        let hits = index.search(&query, &window(), 5, 0.0).await.unwrap();
        assert_eq!(hits.len(), 5);
    }

    #[tokio::test]
    async fn test_similarity_index_window_filter() {
        let inside = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let outside = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let mut f1 = test_fragment("conv-1", "in", 0.9);
        f1.occurred_at = Some(inside);
        let mut f2 = test_fragment("conv-2", "out", 0.9);
        f2.occurred_at = Some(outside);

        let index = MockSimilarityIndex::new().with_default_fragments(vec![f1, f2]);
        let query = Vector::from(MockEmbeddingGenerator::generate("q", 16));
        let hits = index.search(&query, &window(), 10, 0.0).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_id, "conv-1");
    }
}
