use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        indexes,
        types::{
            source_document::{DocumentMetadata, SourceDocument, SourceType},
            system_settings::SystemSettings,
            text_chunk::TextChunk,
        },
    },
    utils::{batch::BatchReport, embedding::EmbeddingProvider},
};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    chunker::{chunk, ChunkProfile},
    normalizer::{normalize, NormalizeOptions},
};

/// Default number of chunks processed per batch during full re-embedding.
pub const DEFAULT_REEMBED_BATCH_SIZE: usize = 64;

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub document_id: String,
    pub chunk_count: usize,
}

/// Ingest path: text in, embedded chunks out. Re-ingest of the same
/// `(source_type, source_id)` is a full replace.
pub struct IngestionPipeline {
    db: Arc<SurrealDbClient>,
    embeddings: Arc<EmbeddingProvider>,
}

impl IngestionPipeline {
    pub fn new(db: Arc<SurrealDbClient>, embeddings: Arc<EmbeddingProvider>) -> Self {
        Self { db, embeddings }
    }

    #[instrument(skip_all, fields(source_type = %source_type, source_id = %source_id))]
    pub async fn ingest_document(
        &self,
        source_type: SourceType,
        source_id: &str,
        raw_text: &str,
        metadata: DocumentMetadata,
    ) -> Result<IngestOutcome, AppError> {
        if metadata.source_type() != source_type {
            return Err(AppError::Validation(format!(
                "metadata kind does not match source type {source_type}"
            )));
        }

        let normalized = normalize(raw_text, &normalize_options_for(source_type));

        let chunk_texts = match ChunkProfile::for_source_type(source_type) {
            Some(profile) => chunk(&normalized, &profile)?,
            // Comments are always exactly one chunk.
            None => vec![normalized.clone()],
        };

        let settings = SystemSettings::get_current(&self.db).await?;
        let embeddings = self
            .embeddings
            .embed_batch(chunk_texts.clone())
            .await
            .map_err(AppError::from)?;

        if embeddings.len() != chunk_texts.len() {
            return Err(AppError::InternalError(format!(
                "embedding service returned {} vectors for {} chunks",
                embeddings.len(),
                chunk_texts.len()
            )));
        }
        for embedding in &embeddings {
            if embedding.len() != settings.embedding_dimensions as usize {
                return Err(AppError::InternalError(format!(
                    "embedding dimension {} does not match configured {}",
                    embedding.len(),
                    settings.embedding_dimensions
                )));
            }
        }

        // Full replace: drop the previous document and its chunks first.
        if let Some(existing) =
            SourceDocument::find_by_natural_key(source_type, source_id, &self.db).await?
        {
            TextChunk::delete_by_document_id(&existing.id, &self.db).await?;
            self.db.delete_item::<SourceDocument>(&existing.id).await?;
            debug!(document_id = %existing.id, "replaced existing document");
        }

        let document = SourceDocument::new(source_type, source_id.to_owned(), metadata.clone());
        self.db.store_item(document.clone()).await?;

        let chunk_count = chunk_texts.len();
        for (index, (text, embedding)) in chunk_texts.into_iter().zip(embeddings).enumerate() {
            let chunk = TextChunk::new(
                document.id.clone(),
                source_type,
                source_id.to_owned(),
                index as u32,
                text,
                metadata.clone(),
                Some(embedding),
            );
            self.db.store_item(chunk).await?;
        }

        self.db.rebuild_indexes().await?;

        info!(
            document_id = %document.id,
            chunk_count,
            "document ingested"
        );

        Ok(IngestOutcome {
            document_id: document.id,
            chunk_count,
        })
    }

    #[instrument(skip_all, fields(source_type = %source_type, source_id = %source_id))]
    pub async fn delete_document(
        &self,
        source_type: SourceType,
        source_id: &str,
    ) -> Result<(), AppError> {
        if let Some(existing) =
            SourceDocument::find_by_natural_key(source_type, source_id, &self.db).await?
        {
            TextChunk::delete_by_document_id(&existing.id, &self.db).await?;
            self.db.delete_item::<SourceDocument>(&existing.id).await?;
        }
        Ok(())
    }

    /// Recomputes embeddings for every chunk, sequentially in bounded
    /// batches. Individual failures are logged and sampled, never fatal;
    /// each chunk update commits on its own, so a crashed run can simply be
    /// restarted.
    #[instrument(skip_all, fields(batch_size))]
    pub async fn reembed_all_chunks(&self, batch_size: usize) -> Result<BatchReport, AppError> {
        let batch_size = batch_size.max(1);
        let settings = SystemSettings::get_current(&self.db).await?;
        let ids = TextChunk::all_ids(&self.db).await?;
        let total = ids.len();

        if total == 0 {
            info!("no chunks to re-embed");
            return Ok(BatchReport::default());
        }
        info!(total, "starting full re-embedding");

        let mut report = BatchReport::default();
        for batch in ids.chunks(batch_size) {
            for id in batch {
                match self.reembed_single(id, settings.embedding_dimensions).await {
                    Ok(()) => report.record_success(),
                    Err(err) => {
                        warn!(chunk_id = %id, error = %err, "re-embedding chunk failed");
                        report.record_failure(err);
                    }
                }
            }
            debug!(
                processed = report.processed,
                total, "re-embedding batch committed"
            );
        }

        indexes::rebuild_indexes(&self.db).await?;

        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            "re-embedding finished"
        );
        Ok(report)
    }

    async fn reembed_single(&self, chunk_id: &str, dimensions: u32) -> Result<(), AppError> {
        let chunk = self
            .db
            .get_item::<TextChunk>(chunk_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("chunk {chunk_id} disappeared")))?;

        let retry_strategy = ExponentialBackoff::from_millis(100).map(jitter).take(3);
        let embedding = Retry::spawn(retry_strategy, || self.embeddings.embed(&chunk.chunk))
            .await
            .map_err(AppError::from)?;

        if embedding.len() != dimensions as usize {
            return Err(AppError::InternalError(format!(
                "embedding dimension {} does not match configured {dimensions}",
                embedding.len()
            )));
        }

        TextChunk::upsert_embedding(chunk_id, embedding, &self.db).await
    }
}

fn normalize_options_for(_source_type: SourceType) -> NormalizeOptions {
    // All three pools currently share the same cleanup; per-type divergence
    // only affects chunking profiles.
    NormalizeOptions {
        remove_emojis: true,
        clean_urls: true,
        max_length: None,
    }
}
