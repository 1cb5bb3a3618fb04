use surrealdb::Error;

use super::db::SurrealDbClient;

/// Defines the analyzers and indexes retrieval depends on. Idempotent; safe
/// to run on every startup.
pub async fn ensure_runtime_indexes(
    db: &SurrealDbClient,
    embedding_dimensions: u32,
) -> Result<(), Error> {
    db.client
        .query(
            "DEFINE ANALYZER IF NOT EXISTS chunk_analyzer \
             TOKENIZERS blank,class FILTERS lowercase",
        )
        .await?
        .check()?;

    db.client
        .query(
            "DEFINE INDEX IF NOT EXISTS idx_chunk_fts ON text_chunk \
             FIELDS chunk SEARCH ANALYZER chunk_analyzer BM25",
        )
        .await?
        .check()?;

    db.client
        .query(format!(
            "DEFINE INDEX IF NOT EXISTS idx_chunk_embedding ON text_chunk \
             FIELDS embedding HNSW DIMENSION {embedding_dimensions}"
        ))
        .await?
        .check()?;

    db.client
        .query(
            "DEFINE INDEX IF NOT EXISTS idx_document_natural_key ON source_document \
             FIELDS source_type, source_id UNIQUE",
        )
        .await?
        .check()?;

    db.client
        .query("DEFINE INDEX IF NOT EXISTS idx_pool_context ON relevance_pool_entry FIELDS context_id")
        .await?
        .check()?;

    db.client
        .query("DEFINE INDEX IF NOT EXISTS idx_catalog_recommendable ON catalog_item FIELDS recommendable")
        .await?
        .check()?;

    Ok(())
}

/// Rebuilds the search-heavy indexes after bulk writes.
pub async fn rebuild_indexes(db: &SurrealDbClient) -> Result<(), Error> {
    db.client
        .query("REBUILD INDEX IF EXISTS idx_chunk_fts ON text_chunk")
        .await?;
    db.client
        .query("REBUILD INDEX IF EXISTS idx_chunk_embedding ON text_chunk")
        .await?;
    Ok(())
}

/// Recreates the HNSW index with a new embedding dimension. Surreal requires
/// the index definition to be recreated when the vector length changes.
pub async fn redefine_hnsw_index(
    db: &SurrealDbClient,
    embedding_dimensions: u32,
) -> Result<(), Error> {
    db.client
        .query(format!(
            "BEGIN TRANSACTION;
             REMOVE INDEX IF EXISTS idx_chunk_embedding ON TABLE text_chunk;
             DEFINE INDEX idx_chunk_embedding ON TABLE text_chunk FIELDS embedding HNSW DIMENSION {embedding_dimensions};
             COMMIT TRANSACTION;"
        ))
        .await?
        .check()?;
    Ok(())
}
