//! # threadmine-core
//!
//! Core types, traits, and abstractions for the threadmine library.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other threadmine crates depend on.

pub mod cancel;
pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod traits;
pub mod uuid_utils;

// Re-export commonly used types at crate root
pub use cancel::CancelToken;
pub use error::{Error, ErrorCategory, Result};
pub use events::{EventSender, RunEvent};
pub use models::*;
pub use traits::*;
pub use uuid_utils::new_v7;
