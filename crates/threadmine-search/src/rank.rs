//! LLM-judged quality ranking of deduplicated candidates.
//!
//! One judging call scores every candidate in a single prompt, at a fixed
//! low temperature for determinism. With exactly one candidate ranking is
//! skipped entirely (no call at all). If the judge fails or returns nothing
//! parseable, ranking degrades to generation order; the run never fails
//! here.

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, instrument, warn};

use threadmine_core::{
    DedupedCandidate, GenerationBackend, GenerationRequest, RankedItem,
};

/// Configuration for the ranking phase.
#[derive(Debug, Clone)]
pub struct RankConfig {
    /// Judge temperature; fixed low for reproducible scoring.
    pub temperature: f32,
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            temperature: threadmine_core::defaults::JUDGE_TEMPERATURE,
        }
    }
}

/// Result of one ranking pass.
#[derive(Debug, Clone)]
pub struct RankOutcome {
    /// Candidates in final order, scores attached where judged.
    pub items: Vec<RankedItem>,
    /// Warning when the judge degraded to generation order.
    pub degraded: Option<String>,
    /// Judge call token usage (zero when ranking was skipped).
    pub tokens_in: i64,
    pub tokens_out: i64,
}

/// Scores and orders candidates via an LLM judging call.
pub struct Ranker {
    judge: Arc<dyn GenerationBackend>,
    config: RankConfig,
}

impl Ranker {
    pub fn new(judge: Arc<dyn GenerationBackend>, config: RankConfig) -> Self {
        Self { judge, config }
    }

    /// Rank candidates by judged quality, descending.
    ///
    /// The sort is stable and the input arrives in generation order, so
    /// equal scores preserve generation order.
    #[instrument(skip_all, fields(subsystem = "search", op = "rank", input_count = candidates.len()))]
    pub async fn rank(&self, candidates: Vec<DedupedCandidate>) -> RankOutcome {
        if candidates.len() <= 1 {
            // Nothing to order; do not spend a judging call
            debug!("Ranking skipped: at most one candidate");
            return RankOutcome {
                items: candidates
                    .into_iter()
                    .map(|c| RankedItem {
                        candidate: c.candidate,
                        tag: c.tag,
                        score: None,
                    })
                    .collect(),
                degraded: None,
                tokens_in: 0,
                tokens_out: 0,
            };
        }

        let prompt = build_judge_prompt(&candidates);
        let request = GenerationRequest::new(prompt, self.config.temperature);

        match self.judge.generate(request).await {
            Ok(response) => {
                let scores = parse_scores(&response.text, candidates.len());
                if scores.iter().all(|s| s.is_none()) {
                    let message =
                        "Judge response had no parseable scores; using generation order"
                            .to_string();
                    warn!(%message);
                    return RankOutcome {
                        items: to_unranked(candidates),
                        degraded: Some(message),
                        tokens_in: response.tokens_in,
                        tokens_out: response.tokens_out,
                    };
                }

                let mut items: Vec<RankedItem> = candidates
                    .into_iter()
                    .zip(scores)
                    .map(|(c, score)| RankedItem {
                        candidate: c.candidate,
                        tag: c.tag,
                        score,
                    })
                    .collect();

                // Stable sort: descending score, unscored items sink, ties
                // keep generation order
                items.sort_by(|a, b| {
                    let sa = a.score.unwrap_or(f32::MIN);
                    let sb = b.score.unwrap_or(f32::MIN);
                    sb.partial_cmp(&sa).unwrap_or(std::cmp::Ordering::Equal)
                });

                debug!(result_count = items.len(), "Ranking complete");
                RankOutcome {
                    items,
                    degraded: None,
                    tokens_in: response.tokens_in,
                    tokens_out: response.tokens_out,
                }
            }
            Err(e) => {
                let message = format!("Judge call failed ({}); using generation order", e);
                warn!(error = %e, "Ranking degraded");
                RankOutcome {
                    items: to_unranked(candidates),
                    degraded: Some(message),
                    tokens_in: 0,
                    tokens_out: 0,
                }
            }
        }
    }
}

fn to_unranked(candidates: Vec<DedupedCandidate>) -> Vec<RankedItem> {
    candidates
        .into_iter()
        .map(|c| RankedItem {
            candidate: c.candidate,
            tag: c.tag,
            score: None,
        })
        .collect()
}

/// Prompt listing candidates for scoring, one numbered entry each.
fn build_judge_prompt(candidates: &[DedupedCandidate]) -> String {
    let mut prompt = String::from(
        "Score each entry below for quality and relevance on a 0-10 scale.\n\
         Reply with one line per entry in the form `N: score` and nothing else.\n\n",
    );
    for (i, c) in candidates.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. {} - {}\n",
            i + 1,
            c.candidate.title,
            c.candidate.description
        ));
    }
    prompt
}

/// Parse `N: score` lines; out-of-range or missing entries stay None.
fn parse_scores(text: &str, count: usize) -> Vec<Option<f32>> {
    let mut scores = vec![None; count];
    let re = Regex::new(r"(?m)^\s*(\d+)\s*[:.]\s*(\d+(?:\.\d+)?)\s*$").expect("valid regex");
    for captures in re.captures_iter(text) {
        let index: usize = match captures[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let score: f32 = match captures[2].parse() {
            Ok(s) => s,
            Err(_) => continue,
        };
        if index >= 1 && index <= count {
            scores[index - 1] = Some(score);
        }
    }
    scores
}
