//! PostgreSQL implementations of the library store and similarity index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

use threadmine_core::{
    Error, Fragment, Item, ItemType, LibraryStore, Result, SimilarityIndex, SourceEvidence,
    TimeWindow,
};

/// Schema applied by [`apply_schema`].
pub const SCHEMA_SQL: &str = include_str!("../schema.sql");

/// Create the store's tables and indexes if they do not exist.
pub async fn apply_schema(pool: &Pool<Postgres>) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL)
        .execute(pool)
        .await
        .map_err(Error::Database)?;
    Ok(())
}

/// PostgreSQL implementation of [`LibraryStore`].
pub struct PgLibraryStore {
    pool: Pool<Postgres>,
}

impl PgLibraryStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn row_to_item(row: &PgRow) -> Result<Item> {
        let item_type: String = row.get("item_type");
        let evidence_json: serde_json::Value = row.get("source_evidence");
        let source_evidence: Vec<SourceEvidence> = serde_json::from_value(evidence_json)?;

        Ok(Item {
            id: row.get("id"),
            item_type: item_type.parse()?,
            title: row.get("title"),
            description: row.get("description"),
            embedding: row.get("embedding"),
            hits: row.get("hits"),
            first_seen: row.get("first_seen"),
            last_seen: row.get("last_seen"),
            source_evidence,
        })
    }
}

#[async_trait]
impl LibraryStore for PgLibraryStore {
    #[instrument(skip(self), fields(subsystem = "store", op = "get", item_type = %item_type))]
    async fn get(&self, item_type: ItemType) -> Result<Vec<Item>> {
        let rows = sqlx::query(
            "SELECT id, item_type, title, description, embedding, hits,
                    first_seen, last_seen, source_evidence
             FROM item
             WHERE item_type = $1
             ORDER BY first_seen, id",
        )
        .bind(item_type.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(Self::row_to_item)
            .collect::<Result<Vec<_>>>()?;
        debug!(result_count = items.len(), "Fetched library slice");
        Ok(items)
    }

    #[instrument(skip(self, item), fields(subsystem = "store", op = "upsert", item_id = %item.id))]
    async fn upsert(&self, item: Item) -> Result<Item> {
        let evidence_json = serde_json::to_value(&item.source_evidence)?;

        // On conflict only the mutable fields move; identity fields
        // (type, title, description, embedding, first_seen) stay as first
        // persisted, which is what makes upsert idempotent by id.
        let row = sqlx::query(
            "INSERT INTO item
                 (id, item_type, title, description, embedding, hits,
                  first_seen, last_seen, source_evidence)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (id) DO UPDATE SET
                 hits = EXCLUDED.hits,
                 last_seen = EXCLUDED.last_seen,
                 source_evidence = EXCLUDED.source_evidence
             RETURNING id, item_type, title, description, embedding, hits,
                       first_seen, last_seen, source_evidence",
        )
        .bind(item.id)
        .bind(item.item_type.as_str())
        .bind(&item.title)
        .bind(&item.description)
        .bind(&item.embedding)
        .bind(item.hits)
        .bind(item.first_seen)
        .bind(item.last_seen)
        .bind(evidence_json)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Self::row_to_item(&row)
    }

    #[instrument(skip(self, evidence), fields(subsystem = "store", op = "increment_hit", item_id = %id))]
    async fn increment_hit(
        &self,
        id: Uuid,
        evidence: Vec<SourceEvidence>,
        now: DateTime<Utc>,
    ) -> Result<Item> {
        let evidence_json = serde_json::to_value(&evidence)?;

        // Single atomic UPDATE: concurrent runs merging into the same item
        // serialize on the row lock, so no hits/last_seen update is lost.
        let row = sqlx::query(
            "UPDATE item
             SET hits = hits + 1,
                 last_seen = $2,
                 source_evidence = source_evidence || $3::jsonb
             WHERE id = $1
             RETURNING id, item_type, title, description, embedding, hits,
                       first_seen, last_seen, source_evidence",
        )
        .bind(id)
        .bind(now)
        .bind(evidence_json)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?
        .ok_or(Error::ItemNotFound(id))?;

        Self::row_to_item(&row)
    }

    async fn count(&self, item_type: ItemType) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM item WHERE item_type = $1")
            .bind(item_type.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(row.get("n"))
    }
}

/// PostgreSQL + pgvector implementation of [`SimilarityIndex`].
///
/// Searches the `conversation_fragment` table by cosine distance, restricted
/// to the run's time window.
pub struct PgSimilarityIndex {
    pool: Pool<Postgres>,
}

impl PgSimilarityIndex {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SimilarityIndex for PgSimilarityIndex {
    #[instrument(skip(self, query), fields(subsystem = "store", op = "search", k = k))]
    async fn search(
        &self,
        query: &Vector,
        window: &TimeWindow,
        k: i64,
        min_similarity: f32,
    ) -> Result<Vec<Fragment>> {
        let rows = sqlx::query(
            "SELECT conversation_id, content,
                    1.0 - (embedding <=> $1::vector) AS score,
                    occurred_at
             FROM conversation_fragment
             WHERE occurred_at >= $2
               AND occurred_at < $3
               AND 1.0 - (embedding <=> $1::vector) >= $4
             ORDER BY embedding <=> $1::vector
             LIMIT $5",
        )
        .bind(query)
        .bind(window.start)
        .bind(window.end)
        .bind(min_similarity as f64)
        .bind(k)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Search(format!("Fragment search failed: {}", e)))?;

        let fragments = rows
            .into_iter()
            .map(|row| Fragment {
                source_id: row.get("conversation_id"),
                text: row.get("content"),
                score: row.get::<f64, _>("score") as f32,
                occurred_at: Some(row.get("occurred_at")),
            })
            .collect::<Vec<_>>();

        debug!(result_count = fragments.len(), "Fragment search complete");
        Ok(fragments)
    }
}
