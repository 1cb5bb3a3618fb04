use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};
use uuid::Uuid;

use super::source_document::{DocumentMetadata, SourceType};

stored_object!(TextChunk, "text_chunk", {
    document_id: String,
    source_type: SourceType,
    source_id: String,
    chunk_index: u32,
    chunk: String,
    /// Metadata snapshot copied from the owning document at ingest time.
    metadata: DocumentMetadata,
    /// None until the embedding service has produced a vector.
    embedding: Option<Vec<f32>>
});

/// A chunk paired with the raw score a single search signal produced for it.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: TextChunk,
    pub score: f32,
}

/// Structured restriction applied to both vector and keyword chunk queries.
#[derive(Debug, Clone, Default)]
pub struct ChunkFilter {
    pub source_type: Option<SourceType>,
    /// Restrict to chunks whose source id is in this set (relevance pool or
    /// prefilter output). None means no restriction.
    pub source_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ScoreRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct IdRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
}

impl TextChunk {
    pub fn new(
        document_id: String,
        source_type: SourceType,
        source_id: String,
        chunk_index: u32,
        chunk: String,
        metadata: DocumentMetadata,
        embedding: Option<Vec<f32>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            document_id,
            source_type,
            source_id,
            chunk_index,
            chunk,
            metadata,
            embedding,
        }
    }

    pub async fn delete_by_document_id(
        document_id: &str,
        db_client: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db_client
            .query(format!(
                "DELETE {} WHERE document_id = $document_id",
                Self::table_name()
            ))
            .bind(("document_id", document_id.to_owned()))
            .await?;

        Ok(())
    }

    /// Idempotent per-chunk embedding write. Safe to repeat after a crashed
    /// batch; the chunk text is untouched.
    pub async fn upsert_embedding(
        id: &str,
        embedding: Vec<f32>,
        db_client: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db_client
            .query(
                "UPDATE type::thing($table, $id) \
                 SET embedding = $embedding, updated_at = time::now()",
            )
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_owned()))
            .bind(("embedding", embedding))
            .await?;

        Ok(())
    }

    pub async fn all_ids(db_client: &SurrealDbClient) -> Result<Vec<String>, AppError> {
        let mut response = db_client
            .query("SELECT id FROM type::table($table)")
            .bind(("table", Self::table_name()))
            .await?;
        let rows: Vec<IdRow> = response.take(0)?;
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    /// K-nearest-neighbour search over the HNSW index, returning cosine
    /// similarity clamped to [0, 1].
    pub async fn vector_search(
        take: usize,
        embedding: Vec<f32>,
        db_client: &SurrealDbClient,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let filter_clause = filter_conditions(filter);
        let sql = format!(
            "SELECT id, vector::similarity::cosine(embedding, $embedding) AS score \
             FROM {table} \
             WHERE embedding <|{take},40|> $embedding{filter_clause} \
             ORDER BY score DESC",
            table = Self::table_name(),
        );

        let mut query = db_client.query(sql).bind(("embedding", embedding));
        query = bind_filter(query, filter);
        let mut response = query.await?;

        let score_rows: Vec<ScoreRow> = response.take(0)?;
        let clamped: Vec<(String, f32)> = score_rows
            .into_iter()
            .map(|row| (row.id, row.score.unwrap_or(0.0).clamp(0.0, 1.0)))
            .collect();

        Self::fetch_scored(clamped, db_client).await
    }

    /// BM25 ranked lexical search with the same filter shape as
    /// [`Self::vector_search`]. Raw scores are unbounded.
    pub async fn keyword_search(
        take: usize,
        terms: &str,
        db_client: &SurrealDbClient,
        filter: &ChunkFilter,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        let filter_clause = filter_conditions(filter);
        let sql = format!(
            "SELECT id, \
             (IF search::score(0) != NONE THEN search::score(0) ELSE 0 END) AS score \
             FROM {table} \
             WHERE chunk @0@ $terms{filter_clause} \
             ORDER BY score DESC \
             LIMIT $limit",
            table = Self::table_name(),
        );

        let mut query = db_client
            .query(sql)
            .bind(("terms", terms.to_owned()))
            .bind(("limit", take as i64));
        query = bind_filter(query, filter);
        let mut response = query.await?;

        let score_rows: Vec<ScoreRow> = response.take(0)?;
        let scored: Vec<(String, f32)> = score_rows
            .into_iter()
            .map(|row| (row.id, row.score.unwrap_or(0.0)))
            .collect();

        Self::fetch_scored(scored, db_client).await
    }

    /// Resolves scored ids into full chunk rows, preserving score order.
    async fn fetch_scored(
        scored_ids: Vec<(String, f32)>,
        db_client: &SurrealDbClient,
    ) -> Result<Vec<ScoredChunk>, AppError> {
        if scored_ids.is_empty() {
            return Ok(Vec::new());
        }

        let things: Vec<Thing> = scored_ids
            .iter()
            .map(|(id, _)| Thing::from((Self::table_name(), id.as_str())))
            .collect();

        let mut response = db_client
            .query("SELECT * FROM type::table($table) WHERE id IN $things")
            .bind(("table", Self::table_name()))
            .bind(("things", things))
            .await?;
        let chunks: Vec<Self> = response.take(0)?;

        let mut by_id: std::collections::HashMap<String, Self> = chunks
            .into_iter()
            .map(|chunk| (chunk.id.clone(), chunk))
            .collect();

        let mut results = Vec::with_capacity(scored_ids.len());
        for (id, score) in scored_ids {
            if let Some(chunk) = by_id.remove(&id) {
                results.push(ScoredChunk { chunk, score });
            }
        }

        Ok(results)
    }
}

fn filter_conditions(filter: &ChunkFilter) -> String {
    let mut clause = String::new();
    if filter.source_type.is_some() {
        clause.push_str(" AND source_type = $source_type");
    }
    if filter.source_ids.is_some() {
        clause.push_str(" AND source_id IN $source_ids");
    }
    clause
}

fn bind_filter<'a, C>(
    mut query: surrealdb::method::Query<'a, C>,
    filter: &ChunkFilter,
) -> surrealdb::method::Query<'a, C>
where
    C: surrealdb::Connection,
{
    if let Some(source_type) = filter.source_type {
        query = query.bind(("source_type", source_type));
    }
    if let Some(source_ids) = filter.source_ids.clone() {
        query = query.bind(("source_ids", source_ids));
    }
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product_metadata() -> DocumentMetadata {
        DocumentMetadata::Product {
            brand: "Asus".into(),
            category: "notebook".into(),
            price: Some(14_990.0),
            tags: vec!["gaming".into()],
            canonical_url: "https://shop.example/asus-tuf".into(),
            display_name: "Asus TUF Gaming".into(),
        }
    }

    async fn setup_test_db() -> SurrealDbClient {
        let db = SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
            .await
            .expect("Failed to start in-memory surrealdb");
        db.ensure_initialized(3)
            .await
            .expect("Failed to initialize schema");
        db
    }

    fn chunk_with_embedding(source_id: &str, text: &str, embedding: Vec<f32>) -> TextChunk {
        TextChunk::new(
            format!("doc-{source_id}"),
            SourceType::Product,
            source_id.to_owned(),
            0,
            text.to_owned(),
            product_metadata(),
            Some(embedding),
        )
    }

    #[tokio::test]
    async fn vector_search_orders_by_similarity() {
        let db = setup_test_db().await;

        let close = chunk_with_embedding("item-close", "gaming notebook", vec![0.9, 0.1, 0.0]);
        let far = chunk_with_embedding("item-far", "usb cable", vec![0.0, 0.9, 0.1]);
        db.store_item(close.clone()).await.expect("store close");
        db.store_item(far.clone()).await.expect("store far");

        let results = TextChunk::vector_search(
            5,
            vec![1.0, 0.0, 0.0],
            &db,
            &ChunkFilter {
                source_type: Some(SourceType::Product),
                source_ids: None,
            },
        )
        .await
        .expect("vector search failed");

        assert!(!results.is_empty(), "expected vector results");
        assert_eq!(results[0].chunk.id, close.id);
        assert!(results[0].score >= results.last().map_or(0.0, |last| last.score));
        assert!(results.iter().all(|result| (0.0..=1.0).contains(&result.score)));
    }

    #[tokio::test]
    async fn vector_search_respects_source_id_restriction() {
        let db = setup_test_db().await;

        let wanted = chunk_with_embedding("item-a", "gaming notebook", vec![0.9, 0.1, 0.0]);
        let excluded = chunk_with_embedding("item-b", "another notebook", vec![0.95, 0.05, 0.0]);
        db.store_item(wanted.clone()).await.expect("store wanted");
        db.store_item(excluded).await.expect("store excluded");

        let results = TextChunk::vector_search(
            5,
            vec![1.0, 0.0, 0.0],
            &db,
            &ChunkFilter {
                source_type: None,
                source_ids: Some(vec!["item-a".into()]),
            },
        )
        .await
        .expect("vector search failed");

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.source_id, "item-a");
    }

    #[tokio::test]
    async fn keyword_search_finds_literal_terms() {
        let db = setup_test_db().await;

        let chunk = chunk_with_embedding(
            "item-kw",
            "Asus TUF gaming notebook with RTX graphics",
            vec![0.5, 0.5, 0.0],
        );
        db.store_item(chunk.clone()).await.expect("store chunk");
        db.rebuild_indexes().await.expect("rebuild indexes");

        let results = TextChunk::keyword_search(5, "notebook", &db, &ChunkFilter::default())
            .await
            .expect("keyword search failed");

        assert!(!results.is_empty(), "expected keyword results");
        assert_eq!(results[0].chunk.id, chunk.id);
        assert!(results[0].score > 0.0);
    }

    #[tokio::test]
    async fn upsert_embedding_is_idempotent() {
        let db = setup_test_db().await;

        let chunk = TextChunk::new(
            "doc-1".into(),
            SourceType::Comment,
            "comment-1".into(),
            0,
            "great video".into(),
            DocumentMetadata::Comment {
                video_id: "vid-1".into(),
                author: None,
            },
            None,
        );
        db.store_item(chunk.clone()).await.expect("store chunk");

        TextChunk::upsert_embedding(&chunk.id, vec![0.1, 0.2, 0.3], &db)
            .await
            .expect("first upsert failed");
        TextChunk::upsert_embedding(&chunk.id, vec![0.1, 0.2, 0.3], &db)
            .await
            .expect("second upsert failed");

        let stored: Option<TextChunk> = db.get_item::<TextChunk>(&chunk.id).await.expect("fetch");
        assert_eq!(
            stored.expect("chunk should exist").embedding,
            Some(vec![0.1, 0.2, 0.3])
        );
    }

    #[tokio::test]
    async fn delete_by_document_id_leaves_other_documents() {
        let db = setup_test_db().await;

        let first = chunk_with_embedding("item-1", "first", vec![0.1, 0.1, 0.1]);
        let mut second = chunk_with_embedding("item-2", "second", vec![0.2, 0.2, 0.2]);
        second.document_id = "doc-other".into();
        db.store_item(first.clone()).await.expect("store first");
        db.store_item(second.clone()).await.expect("store second");

        TextChunk::delete_by_document_id(&first.document_id, &db)
            .await
            .expect("delete failed");

        assert!(db
            .get_item::<TextChunk>(&first.id)
            .await
            .expect("fetch first")
            .is_none());
        assert!(db
            .get_item::<TextChunk>(&second.id)
            .await
            .expect("fetch second")
            .is_some());
    }
}
