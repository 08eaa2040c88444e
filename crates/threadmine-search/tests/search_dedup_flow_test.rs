//! Orchestrate-then-deduplicate flow over mock collaborators.

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use threadmine_core::{
    CancelToken, CandidateItem, DedupTag, EmbeddingBackend, Item, ItemType, TimeWindow, Vector,
};
use threadmine_inference::mock::{
    test_fragment, MockEmbeddingGenerator, MockInferenceBackend, MockSimilarityIndex,
};
use threadmine_search::{
    dedup::{deduplicate, DedupConfig},
    orchestrator::{SearchConfig, SearchOrchestrator},
    seed_queries,
};

const DIM: usize = 384;

fn window() -> TimeWindow {
    TimeWindow::new(
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 1, 3, 0, 0, 0).unwrap(),
    )
}

fn candidate_with_vector(title: &str, ordinal: usize, vector: Vec<f32>) -> CandidateItem {
    let mut c = CandidateItem::new(
        ItemType::Insight,
        title.to_string(),
        format!("{} long description text", title),
        ordinal,
    );
    c.embedding = Some(Vector::from(vector));
    c
}

#[tokio::test]
async fn fragments_found_by_search_feed_dedup_against_library() {
    // Stage 1: search a two-day window
    let index = MockSimilarityIndex::new().with_default_fragments(vec![
        test_fragment("conv-a", "we kept rewriting the retry logic", 0.9),
        test_fragment("conv-b", "manual cache invalidation bites again", 0.8),
    ]);
    let embedder: Arc<dyn EmbeddingBackend> =
        Arc::new(MockInferenceBackend::new().with_dimension(DIM));
    let orchestrator = SearchOrchestrator::new(
        Arc::new(index),
        embedder.clone(),
        SearchConfig::default(),
    );

    let outcome = orchestrator
        .search_window(ItemType::Insight, &window(), &CancelToken::new())
        .await
        .unwrap();
    assert_eq!(outcome.fragments.len(), 2);
    assert!(outcome.warnings.is_empty());

    // Stage 2: dedup two candidates, one of which duplicates a library item
    let (lib_vec, cand_vec) =
        MockEmbeddingGenerator::generate_pair_with_similarity("retry insight", DIM, 0.92);
    let existing = Item {
        id: threadmine_core::new_v7(),
        item_type: ItemType::Insight,
        title: "Retries get rewritten".to_string(),
        description: "Teams rebuild retry logic repeatedly".to_string(),
        embedding: Vector::from(lib_vec),
        hits: 4,
        first_seen: Utc.with_ymd_and_hms(2025, 12, 1, 0, 0, 0).unwrap(),
        last_seen: Utc.with_ymd_and_hms(2025, 12, 20, 0, 0, 0).unwrap(),
        source_evidence: vec![],
    };
    let existing_id = existing.id;

    let fresh_vec = MockEmbeddingGenerator::generate_with_seed(9001, DIM);
    let candidates = vec![
        candidate_with_vector("retry rewrite pain", 0, cand_vec),
        candidate_with_vector("cache invalidation pain", 1, fresh_vec),
    ];

    let dedup = deduplicate(
        candidates,
        &[existing],
        &embedder,
        &DedupConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(dedup.candidates.len(), 2);
    assert_eq!(
        dedup.candidates[0].tag,
        DedupTag::MatchesExisting(existing_id)
    );
    assert_eq!(dedup.candidates[1].tag, DedupTag::New);
}

#[tokio::test]
async fn every_item_type_searches_all_its_seeds() {
    for item_type in ItemType::all() {
        let index = MockSimilarityIndex::new()
            .with_default_fragments(vec![test_fragment("conv-1", "text", 0.7)]);
        let handle = index.clone();
        let orchestrator = SearchOrchestrator::new(
            Arc::new(index),
            Arc::new(MockInferenceBackend::new().with_dimension(DIM)),
            SearchConfig::default(),
        );

        let single_day = TimeWindow::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap(),
        );
        orchestrator
            .search_window(item_type, &single_day, &CancelToken::new())
            .await
            .unwrap();

        assert_eq!(handle.search_count(), seed_queries(item_type).len());
    }
}
