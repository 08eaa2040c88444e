//! UUID v7 utilities for time-ordered item identifiers.
//!
//! Persisted items get UUIDv7 ids: the embedded millisecond timestamp keeps
//! ids lexicographically ordered by first persistence, which makes library
//! listings and temporal queries cheap.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

/// Check whether a UUID is version 7.
pub fn is_v7(id: &Uuid) -> bool {
    id.get_version_num() == 7
}
