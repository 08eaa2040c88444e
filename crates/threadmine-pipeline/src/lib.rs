//! # threadmine-pipeline
//!
//! The orchestration heart of threadmine: turns a time window of
//! conversation history into ranked, deduplicated items merged into the
//! persistent library, while reporting typed progress events over a
//! cancellable channel.
//!
//! Modules:
//! - [`extract`]: parses generation output into candidate items
//! - [`harmonize`]: merges ranked candidates into the library
//! - [`cache`]: clock-injected TTL cache for library slices
//! - [`run`]: the run controller state machine
//! - [`stream`]: consumer-side helpers (inactivity timeout, reconciliation)

pub mod cache;
pub mod extract;
pub mod harmonize;
pub mod run;
pub mod stream;

pub use cache::LibraryCache;
pub use extract::{extract_candidates, ExtractOutcome, NO_ITEMS_SENTINEL};
pub use harmonize::{Harmonizer, HarmonizeOutcome};
pub use run::{RunController, RunHandle, RunnerConfig};
pub use stream::{reconcile_library_growth, RunResolution, RunStream};

// Re-export core types
pub use threadmine_core::*;
