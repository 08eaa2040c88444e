//! # threadmine-store
//!
//! Library store and similarity index backends for threadmine.
//!
//! Two families of implementation:
//! - PostgreSQL + pgvector ([`PgLibraryStore`], [`PgSimilarityIndex`]) for
//!   durable deployments
//! - In-memory ([`InMemoryLibraryStore`]) for tests and embedded use
//!
//! Both satisfy the `LibraryStore` / `SimilarityIndex` traits from
//! `threadmine-core`, including the per-item write serialization the
//! harmonizer's concurrency contract requires.

pub mod memory;
pub mod pool;
pub mod postgres;

pub use memory::InMemoryLibraryStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use postgres::{apply_schema, PgLibraryStore, PgSimilarityIndex, SCHEMA_SQL};

// Re-export core types
pub use threadmine_core::*;
