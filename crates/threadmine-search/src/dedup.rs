//! Embedding-similarity deduplication of candidates against the library.
//!
//! Single-linkage clustering: items are nodes in an indexed arena, any pair
//! with cosine similarity at or above the threshold gets an edge, and
//! connected components (via union-find) are the clusters. No centroid
//! iteration, no fixed cluster count.
//!
//! Single-linkage can chain weakly similar items together through
//! intermediates. That is accepted behavior, preserved deliberately;
//! complete-linkage would change which candidates merge across runs.

use std::sync::Arc;

use tracing::{debug, instrument};

use threadmine_core::{
    cosine_similarity, CandidateItem, DedupTag, DedupedCandidate, EmbeddingBackend, Item, Result,
    Vector,
};
use threadmine_inference::{retry_with_backoff, RetryPolicy};

/// Configuration for a dedup pass.
#[derive(Debug, Clone)]
pub struct DedupConfig {
    /// Cosine similarity at or above which two items are the same.
    pub threshold: f32,
    /// Candidates with less text than this are not embedded; the call would
    /// be wasted. They stand alone as their own cluster.
    pub min_embed_chars: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            threshold: threadmine_core::defaults::DEDUP_THRESHOLD,
            min_embed_chars: threadmine_core::defaults::MIN_EMBED_CHARS,
        }
    }
}

impl DedupConfig {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }
}

/// Union-find over arena indices with path compression and union by rank.
#[derive(Debug, Clone)]
pub struct DisjointSet {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl DisjointSet {
    pub fn new(size: usize) -> Self {
        Self {
            parent: (0..size).collect(),
            rank: vec![0; size],
        }
    }

    pub fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            let root = self.find(self.parent[x]);
            self.parent[x] = root;
        }
        self.parent[x]
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }

    pub fn connected(&mut self, a: usize, b: usize) -> bool {
        self.find(a) == self.find(b)
    }
}

/// Result of one dedup pass.
#[derive(Debug, Clone)]
pub struct DedupOutcome {
    /// Surviving candidates in generation order, tagged for the harmonizer.
    pub candidates: Vec<DedupedCandidate>,
    /// Candidate-only duplicates dropped in favor of a representative.
    pub duplicates_dropped: usize,
    /// Connected components containing at least one candidate.
    pub cluster_count: usize,
}

/// Deduplicate candidates against each other and the same-type library slice.
///
/// Candidates lacking embeddings get them here, in one batched call (bounded
/// backoff on transient failure). Components containing an existing library
/// item tag all their candidate members `MatchesExisting`; candidate-only
/// components carry one representative forward (longest description, ties
/// broken by generation order) and drop the rest.
#[instrument(skip_all, fields(subsystem = "search", op = "dedup", threshold = config.threshold, input_count = candidates.len()))]
pub async fn deduplicate(
    mut candidates: Vec<CandidateItem>,
    library: &[Item],
    embedder: &Arc<dyn EmbeddingBackend>,
    config: &DedupConfig,
) -> Result<DedupOutcome> {
    candidates.sort_by_key(|c| c.ordinal);

    embed_missing(&mut candidates, embedder, config).await?;

    let n = candidates.len();
    let total = n + library.len();

    // Arena of embedding slices; index < n is a candidate, >= n is library
    let embeddings: Vec<Option<&[f32]>> = candidates
        .iter()
        .map(|c| c.embedding.as_ref().map(|v| v.as_slice()))
        .chain(library.iter().map(|i| Some(i.embedding.as_slice())))
        .collect();

    let mut set = DisjointSet::new(total);
    let mut degree = vec![0usize; total];

    for i in 0..total {
        let Some(a) = embeddings[i] else { continue };
        for (offset, b_opt) in embeddings[i + 1..].iter().enumerate() {
            let j = i + 1 + offset;
            let Some(b) = b_opt else { continue };
            if cosine_similarity(a, b) >= config.threshold {
                set.union(i, j);
                degree[i] += 1;
                degree[j] += 1;
            }
        }
    }

    // Group arena indices into components
    let mut components: std::collections::HashMap<usize, Vec<usize>> =
        std::collections::HashMap::new();
    for i in 0..total {
        components.entry(set.find(i)).or_default().push(i);
    }

    let mut out: Vec<DedupedCandidate> = Vec::new();
    let mut duplicates_dropped = 0usize;
    let mut cluster_count = 0usize;

    for members in components.into_values() {
        let candidate_members: Vec<usize> =
            members.iter().copied().filter(|&i| i < n).collect();
        if candidate_members.is_empty() {
            continue; // library-only component, nothing to do
        }
        cluster_count += 1;

        let library_members: Vec<usize> =
            members.iter().copied().filter(|&i| i >= n).collect();

        if let Some(target) = pick_existing_target(&library_members, &degree, library, n) {
            // Already known: every candidate member feeds the merge path
            for &i in &candidate_members {
                out.push(DedupedCandidate {
                    candidate: candidates[i].clone(),
                    tag: DedupTag::MatchesExisting(target),
                });
            }
        } else {
            let rep = pick_representative(&candidate_members, &candidates);
            duplicates_dropped += candidate_members.len() - 1;
            out.push(DedupedCandidate {
                candidate: candidates[rep].clone(),
                tag: DedupTag::New,
            });
        }
    }

    // Back to generation order for the ranker's deterministic tiebreak
    out.sort_by_key(|d| d.candidate.ordinal);

    debug!(
        cluster_count,
        duplicates_dropped,
        result_count = out.len(),
        "Dedup complete"
    );

    Ok(DedupOutcome {
        candidates: out,
        duplicates_dropped,
        cluster_count,
    })
}

/// Fill in embeddings for candidates that lack one, batched.
async fn embed_missing(
    candidates: &mut [CandidateItem],
    embedder: &Arc<dyn EmbeddingBackend>,
    config: &DedupConfig,
) -> Result<()> {
    let mut indices = Vec::new();
    let mut texts = Vec::new();
    for (i, candidate) in candidates.iter().enumerate() {
        if candidate.embedding.is_some() {
            continue;
        }
        let text = candidate.embedding_text();
        if text.len() < config.min_embed_chars {
            debug!(ordinal = candidate.ordinal, "Skipping sub-minimum text");
            continue;
        }
        indices.push(i);
        texts.push(text);
    }

    if texts.is_empty() {
        return Ok(());
    }

    let embedder = embedder.clone();
    let batch = texts.clone();
    let vectors = retry_with_backoff(RetryPolicy::default(), "embed_candidates", || {
        let embedder = embedder.clone();
        let batch = batch.clone();
        async move { embedder.embed_texts(&batch).await }
    })
    .await?;

    for (i, vector) in indices.into_iter().zip(vectors.into_iter()) {
        candidates[i].embedding = Some(vector);
    }
    Ok(())
}

/// The existing item a mixed component "matches": most graph links, ties
/// broken by earliest first_seen, then id.
fn pick_existing_target(
    library_members: &[usize],
    degree: &[usize],
    library: &[Item],
    n: usize,
) -> Option<uuid::Uuid> {
    library_members
        .iter()
        .map(|&i| (&library[i - n], degree[i]))
        .max_by(|(a, da), (b, db)| {
            da.cmp(db)
                .then_with(|| b.first_seen.cmp(&a.first_seen))
                .then_with(|| b.id.cmp(&a.id))
        })
        .map(|(item, _)| item.id)
}

/// Representative of a candidate-only component: longest description, ties
/// broken by generation order.
fn pick_representative(candidate_members: &[usize], candidates: &[CandidateItem]) -> usize {
    candidate_members
        .iter()
        .copied()
        .max_by(|&a, &b| {
            candidates[a]
                .description
                .len()
                .cmp(&candidates[b].description.len())
                .then_with(|| candidates[b].ordinal.cmp(&candidates[a].ordinal))
        })
        .expect("component has at least one candidate")
}

/// Re-embed helper exposed for harmonizer reuse: does `candidate` match any
/// library item at the threshold?
pub fn find_library_match(
    embedding: &Vector,
    library: &[Item],
    threshold: f32,
) -> Option<uuid::Uuid> {
    let slice = embedding.as_slice();
    library
        .iter()
        .filter(|item| cosine_similarity(slice, item.embedding.as_slice()) >= threshold)
        .max_by(|a, b| {
            let sa = cosine_similarity(slice, a.embedding.as_slice());
            let sb = cosine_similarity(slice, b.embedding.as_slice());
            sa.partial_cmp(&sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.first_seen.cmp(&a.first_seen))
        })
        .map(|item| item.id)
}
