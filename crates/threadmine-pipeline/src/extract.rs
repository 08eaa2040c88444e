//! Parses free-text generation output into structured candidate items.
//!
//! The generation prompt asks for numbered blocks (`### 1. Title` followed
//! by description lines). Real model output drifts, so the parser is
//! deliberately forgiving: it takes what it can parse, warns about what it
//! can't, and never fails on a count mismatch.

use regex::Regex;
use tracing::{debug, warn};

use threadmine_core::{CandidateItem, ItemType};

/// Sentinel a well-behaved model emits when the window holds nothing worth
/// extracting. Recognized as zero-item success, not an error.
pub const NO_ITEMS_SENTINEL: &str = "NO_ITEMS_FOUND";

/// Result of one extraction pass.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutcome {
    pub candidates: Vec<CandidateItem>,
    pub warnings: Vec<String>,
}

/// Split generation output into candidate items.
///
/// Tolerates zero, fewer, or more blocks than `requested`; the mismatch is
/// logged, never an error. Content before the first block marker is
/// discarded with a warning. The [`NO_ITEMS_SENTINEL`] yields zero items and
/// no warning.
pub fn extract_candidates(output: &str, item_type: ItemType, requested: usize) -> ExtractOutcome {
    let trimmed = output.trim();
    let mut outcome = ExtractOutcome::default();

    if trimmed.is_empty() {
        outcome
            .warnings
            .push("Generation output was empty".to_string());
        return outcome;
    }

    if trimmed == NO_ITEMS_SENTINEL
        || trimmed
            .lines()
            .all(|l| l.trim().is_empty() || l.trim() == NO_ITEMS_SENTINEL)
    {
        debug!("Model reported no items found");
        return outcome;
    }

    // Block marker: optional markdown heading, a number, `.` or `)`, title
    let marker = Regex::new(r"(?m)^(?:#{1,6}\s*)?(\d+)[.)]\s+(.+)$").expect("valid regex");

    let mut blocks: Vec<(usize, String, usize, usize)> = Vec::new(); // (num, title, body_start, marker_start)
    for captures in marker.captures_iter(trimmed) {
        let whole = captures.get(0).expect("match");
        let number: usize = captures[1].parse().unwrap_or(0);
        let title = strip_emphasis(captures[2].trim());
        blocks.push((number, title, whole.end(), whole.start()));
    }

    if blocks.is_empty() {
        outcome.warnings.push(
            "Generation output had no recognizable item blocks; discarding it".to_string(),
        );
        return outcome;
    }

    // Anything before the first marker is preamble the model wasn't asked for
    let preamble = trimmed[..blocks[0].3].trim();
    if !preamble.is_empty() {
        warn!(discarded_len = preamble.len(), "Discarding unparseable preamble");
        outcome.warnings.push(format!(
            "Discarded {} characters of unparseable content before the first item",
            preamble.len()
        ));
    }

    for (ordinal, window) in blocks.windows(2).enumerate() {
        let (_, ref title, body_start, _) = window[0];
        let (_, _, _, next_marker_start) = window[1];
        let description = trimmed[body_start..next_marker_start].trim().to_string();
        outcome.candidates.push(CandidateItem::new(
            item_type,
            title.clone(),
            description,
            ordinal,
        ));
    }
    // Last block runs to the end of the output
    let (_, ref title, body_start, _) = blocks[blocks.len() - 1];
    let description = trimmed[body_start..].trim().to_string();
    outcome.candidates.push(CandidateItem::new(
        item_type,
        title.clone(),
        description,
        blocks.len() - 1,
    ));

    if outcome.candidates.len() != requested {
        debug!(
            requested,
            extracted = outcome.candidates.len(),
            "Item count differs from request"
        );
    }

    outcome
}

/// Remove markdown emphasis wrappers models like to add to titles.
fn strip_emphasis(title: &str) -> String {
    title
        .trim_matches(|c| c == '*' || c == '_' || c == '`')
        .trim()
        .to_string()
}
