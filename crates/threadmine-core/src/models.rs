//! Core data model for the item generation and harmonization pipeline.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// VECTOR TYPES
// =============================================================================

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for zero-magnitude or mismatched-dimension inputs rather than
/// panicking; a degenerate embedding should never take down a dedup pass.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if mag_a > 0.0 && mag_b > 0.0 {
        dot / (mag_a * mag_b)
    } else {
        0.0
    }
}

// =============================================================================
// ITEM TYPES
// =============================================================================

/// The closed set of item kinds the pipeline can mine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Idea,
    Insight,
    UseCase,
}

impl ItemType {
    /// Stable string form used in the store and in progress events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idea => "idea",
            Self::Insight => "insight",
            Self::UseCase => "use_case",
        }
    }

    /// All known item types.
    pub fn all() -> [ItemType; 3] {
        [Self::Idea, Self::Insight, Self::UseCase]
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ItemType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idea" => Ok(Self::Idea),
            "insight" => Ok(Self::Insight),
            "use_case" | "use-case" => Ok(Self::UseCase),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown item type: {}",
                other
            ))),
        }
    }
}

/// Back-reference to the conversation a candidate was mined from.
///
/// A non-owning association: evidence is never used to reconstruct ownership,
/// only to let a caller jump back to the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEvidence {
    pub conversation_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// A persisted library item.
///
/// `embedding` is computed once from `title + description` and never changes;
/// `first_seen` is immutable; `hits` and `last_seen` move on every merge.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: Uuid,
    pub item_type: ItemType,
    pub title: String,
    pub description: String,
    pub embedding: Vector,
    pub hits: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub source_evidence: Vec<SourceEvidence>,
}

impl Item {
    /// Lightweight serializable view (no embedding) for events and listings.
    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id,
            item_type: self.item_type,
            title: self.title.clone(),
            description: self.description.clone(),
            hits: self.hits,
            first_seen: self.first_seen,
            last_seen: self.last_seen,
        }
    }
}

/// Serializable item view without the embedding payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: Uuid,
    pub item_type: ItemType,
    pub title: String,
    pub description: String,
    pub hits: i64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

/// A freshly extracted, unpersisted candidate.
///
/// No id yet; the embedding is filled in lazily by the deduplicator.
/// `ordinal` records generation order and is the deterministic tiebreaker
/// throughout the pipeline.
#[derive(Debug, Clone)]
pub struct CandidateItem {
    pub item_type: ItemType,
    pub title: String,
    pub description: String,
    pub ordinal: usize,
    pub embedding: Option<Vector>,
    pub evidence: Vec<SourceEvidence>,
}

impl CandidateItem {
    pub fn new(item_type: ItemType, title: String, description: String, ordinal: usize) -> Self {
        Self {
            item_type,
            title,
            description,
            ordinal,
            embedding: None,
            evidence: Vec::new(),
        }
    }

    /// Text the embedding is computed over.
    pub fn embedding_text(&self) -> String {
        format!("{} {}", self.title, self.description)
    }
}

/// How the deduplicator resolved a candidate against the library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupTag {
    /// Not similar to anything persisted; eligible for the add path.
    New,
    /// Lands in a cluster with the given existing item; takes the merge path.
    MatchesExisting(Uuid),
}

/// A candidate that survived deduplication, tagged for the harmonizer.
#[derive(Debug, Clone)]
pub struct DedupedCandidate {
    pub candidate: CandidateItem,
    pub tag: DedupTag,
}

/// A deduplicated candidate with its ranking score attached.
///
/// `score` is None when ranking was skipped or degraded; ordering then falls
/// back to generation order.
#[derive(Debug, Clone)]
pub struct RankedItem {
    pub candidate: CandidateItem,
    pub tag: DedupTag,
    pub score: Option<f32>,
}

// =============================================================================
// SEARCH TYPES
// =============================================================================

/// A conversation fragment returned by the similarity index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Conversation identifier in the source system.
    pub source_id: String,
    pub text: String,
    pub score: f32,
    pub occurred_at: Option<DateTime<Utc>>,
}

// =============================================================================
// RUN TYPES
// =============================================================================

/// Inclusive-start, exclusive-end UTC time window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Reject inverted or empty windows before any external call is made.
    pub fn validate(&self) -> crate::Result<()> {
        if self.start >= self.end {
            return Err(crate::Error::InvalidInput(format!(
                "Time window start {} is not before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }

    /// Split a multi-day window into per-day buckets for parallel search.
    ///
    /// The final bucket is clamped to the window end, so buckets always tile
    /// the window exactly.
    pub fn day_buckets(&self) -> Vec<TimeWindow> {
        let mut buckets = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = (cursor + Duration::days(1)).min(self.end);
            buckets.push(TimeWindow::new(cursor, next));
            cursor = next;
        }
        buckets
    }
}

/// Configuration for one pipeline run.
///
/// Unspecified options take the documented defaults from
/// [`crate::defaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    pub time_window: TimeWindow,
    pub item_type: ItemType,
    #[serde(default = "default_item_count")]
    pub item_count: usize,
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_item_count() -> usize {
    crate::defaults::ITEM_COUNT
}

fn default_dedup_threshold() -> f32 {
    crate::defaults::DEDUP_THRESHOLD
}

fn default_temperature() -> f32 {
    crate::defaults::GEN_TEMPERATURE
}

impl RunRequest {
    pub fn new(time_window: TimeWindow, item_type: ItemType) -> Self {
        Self {
            time_window,
            item_type,
            item_count: default_item_count(),
            dedup_threshold: default_dedup_threshold(),
            temperature: default_temperature(),
        }
    }

    /// Synchronous input validation; rejected runs never touch a collaborator.
    pub fn validate(&self) -> crate::Result<()> {
        self.time_window.validate()?;
        if self.item_count == 0 {
            return Err(crate::Error::InvalidInput(
                "Requested item count must be at least 1".to_string(),
            ));
        }
        if !(self.dedup_threshold > 0.0 && self.dedup_threshold < 1.0) {
            return Err(crate::Error::InvalidInput(format!(
                "Dedup threshold must be in (0, 1), got {}",
                self.dedup_threshold
            )));
        }
        Ok(())
    }
}

/// Accumulated statistics for one run.
///
/// Snapshot handed to the caller in the terminal `complete` event; nothing
/// else about a run outlives it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub conversations_found: usize,
    pub items_generated: usize,
    pub items_after_dedup: usize,
    pub items_added: usize,
    pub items_merged: usize,
    pub tokens_in: i64,
    pub tokens_out: i64,
    pub cost: f64,
}

/// Phases of the run state machine.
///
/// Transitions are strictly forward through the working phases; `Complete`,
/// `Error`, and `Stopped` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Confirming,
    Searching,
    Generating,
    Deduplicating,
    Ranking,
    Integrating,
    Complete,
    Error,
    Stopped,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirming => "confirming",
            Self::Searching => "searching",
            Self::Generating => "generating",
            Self::Deduplicating => "deduplicating",
            Self::Ranking => "ranking",
            Self::Integrating => "integrating",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Stopped)
    }

    /// Ordinal position in the forward sequence; terminals share the end slot.
    fn order(&self) -> u8 {
        match self {
            Self::Confirming => 0,
            Self::Searching => 1,
            Self::Generating => 2,
            Self::Deduplicating => 3,
            Self::Ranking => 4,
            Self::Integrating => 5,
            Self::Complete | Self::Error | Self::Stopped => 6,
        }
    }

    /// Whether moving to `next` is a legal forward transition.
    ///
    /// Terminal states accept nothing; working phases accept any strictly
    /// later phase (error/stop may skip ahead from anywhere).
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        next.order() > self.order()
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// HARMONIZATION TYPES
// =============================================================================

/// Delta summary returned by the harmonizer.
///
/// Counts reflect what was actually applied; a mid-batch failure reports the
/// applied prefix, never the attempted total.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmonizeDelta {
    pub items_added: usize,
    pub items_merged: usize,
    pub library_size: i64,
}
