//! # threadmine-inference
//!
//! LLM inference backend abstraction for threadmine.
//!
//! This crate provides:
//! - Ollama implementation of the embedding and generation backends (default)
//! - Bounded exponential backoff for embedding calls
//! - Deterministic mock backends for testing (feature `mock`)
//!
//! # Feature Flags
//!
//! - `ollama` (default): Enable Ollama backend
//! - `mock`: Enable deterministic mock backends
//!
//! # Example
//!
//! ```rust,no_run
//! use threadmine_inference::OllamaBackend;
//! use threadmine_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod retry;

#[cfg(feature = "ollama")]
pub mod ollama;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

// Re-export core types
pub use threadmine_core::*;

pub use retry::{retry_with_backoff, RetryPolicy};

#[cfg(feature = "ollama")]
pub use ollama::OllamaBackend;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockEmbeddingGenerator, MockInferenceBackend, MockSimilarityIndex};
