use std::sync::Arc;

use async_trait::async_trait;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            catalog_item::CatalogItem,
            relevance_pool::RelevancePoolEntry,
            source_document::SourceType,
            text_chunk::{ChunkFilter, ScoredChunk, TextChunk},
            video_context::VideoContext,
        },
    },
};
use tracing::{debug, instrument, warn};

use crate::{
    prefilter::{self, ContextSignals, PrefilterOptions},
    scoring::{clamp_unit, min_max_normalize, sort_by_score_desc},
    SearchResult,
};

pub const DEFAULT_VECTOR_WEIGHT: f32 = 0.7;
pub const DEFAULT_KEYWORD_WEIGHT: f32 = 0.3;

#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub top_k: usize,
    pub source_type: Option<SourceType>,
    /// Context whose relevance pool scopes the first retrieval tier.
    pub context_id: Option<String>,
    pub min_score: f32,
    pub vector_weight: f32,
    pub keyword_weight: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            source_type: None,
            context_id: None,
            min_score: 0.0,
            vector_weight: DEFAULT_VECTOR_WEIGHT,
            keyword_weight: DEFAULT_KEYWORD_WEIGHT,
        }
    }
}

struct TierRequest<'a> {
    db: &'a SurrealDbClient,
    query_text: &'a str,
    query_embedding: &'a [f32],
    options: &'a SearchOptions,
}

/// One candidate-scope strategy. Tiers are tried in order; an error or an
/// empty result moves the coordinator to the next tier.
#[async_trait]
trait RetrievalTier: Send + Sync {
    fn name(&self) -> &'static str;
    async fn run(&self, request: &TierRequest<'_>) -> Result<Vec<SearchResult>, AppError>;
}

/// Tier 1: restrict search to the context's precomputed relevance pool.
struct PoolTier {
    context_id: String,
}

#[async_trait]
impl RetrievalTier for PoolTier {
    fn name(&self) -> &'static str {
        "relevance_pool"
    }

    async fn run(&self, request: &TierRequest<'_>) -> Result<Vec<SearchResult>, AppError> {
        let entries = RelevancePoolEntry::load_for_context(&self.context_id, request.db).await?;
        if entries.is_empty() {
            debug!("no pool entries for context; tier yields nothing");
            return Ok(Vec::new());
        }

        let source_ids: Vec<String> = entries
            .into_iter()
            .map(|entry| entry.candidate_id)
            .collect();
        run_hybrid(request, Some(source_ids)).await
    }
}

/// Tier 2: run the metadata prefilter inline and search that subset.
struct PrefilterTier {
    context_id: String,
}

#[async_trait]
impl RetrievalTier for PrefilterTier {
    fn name(&self) -> &'static str {
        "inline_prefilter"
    }

    async fn run(&self, request: &TierRequest<'_>) -> Result<Vec<SearchResult>, AppError> {
        let Some(context) = request.db.get_item::<VideoContext>(&self.context_id).await? else {
            debug!("context missing; tier yields nothing");
            return Ok(Vec::new());
        };

        let signals = ContextSignals::from(&context);
        if signals.is_empty() {
            debug!("context has no structured signals; tier yields nothing");
            return Ok(Vec::new());
        }

        let universe = CatalogItem::list_recommendable(request.db).await?;
        let scored = prefilter::run(&signals, universe, &PrefilterOptions::default());
        if scored.is_empty() {
            return Ok(Vec::new());
        }

        let source_ids: Vec<String> = scored.into_iter().map(|(item, _)| item.id).collect();
        run_hybrid(request, Some(source_ids)).await
    }
}

/// Tier 3: unrestricted scan over the source-type partition.
struct FullScanTier;

#[async_trait]
impl RetrievalTier for FullScanTier {
    fn name(&self) -> &'static str {
        "full_scan"
    }

    async fn run(&self, request: &TierRequest<'_>) -> Result<Vec<SearchResult>, AppError> {
        run_hybrid(request, None).await
    }
}

/// Hybrid search over the chunk store: vector and keyword sub-searches run
/// concurrently and merge into a single weighted ranking. Candidate scope
/// falls back strictly from relevance pool to inline prefilter to full scan.
pub struct HybridRetriever {
    db: Arc<SurrealDbClient>,
}

impl HybridRetriever {
    pub fn new(db: Arc<SurrealDbClient>) -> Self {
        Self { db }
    }

    #[instrument(skip_all, fields(top_k = options.top_k))]
    pub async fn search(
        &self,
        query_text: &str,
        query_embedding: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchResult>, AppError> {
        let request = TierRequest {
            db: &self.db,
            query_text,
            query_embedding,
            options,
        };

        let mut tiers: Vec<Box<dyn RetrievalTier>> = Vec::new();
        if let Some(context_id) = &options.context_id {
            tiers.push(Box::new(PoolTier {
                context_id: context_id.clone(),
            }));
            tiers.push(Box::new(PrefilterTier {
                context_id: context_id.clone(),
            }));
        }
        tiers.push(Box::new(FullScanTier));

        let tier_count = tiers.len();
        for (index, tier) in tiers.iter().enumerate() {
            let last = index + 1 == tier_count;
            match tier.run(&request).await {
                Ok(results) if !results.is_empty() => {
                    debug!(tier = tier.name(), results = results.len(), "tier satisfied query");
                    return Ok(results);
                }
                Ok(_) => {
                    debug!(tier = tier.name(), "tier empty; falling through");
                }
                Err(err) if !last => {
                    warn!(tier = tier.name(), error = %err, "tier failed; falling through");
                }
                // Only the final tier's error propagates.
                Err(err) => return Err(err),
            }
        }

        Ok(Vec::new())
    }
}

/// Runs the two sub-searches concurrently and merges them. A sub-search's
/// own failure is treated as an empty result for that signal only.
async fn run_hybrid(
    request: &TierRequest<'_>,
    source_ids: Option<Vec<String>>,
) -> Result<Vec<SearchResult>, AppError> {
    let options = request.options;
    let fetch = options.top_k.saturating_mul(2).max(1);
    let filter = ChunkFilter {
        source_type: options.source_type,
        source_ids,
    };

    let (vector_outcome, keyword_outcome) = tokio::join!(
        TextChunk::vector_search(fetch, request.query_embedding.to_vec(), request.db, &filter),
        TextChunk::keyword_search(fetch, request.query_text, request.db, &filter),
    );

    let vector_results = vector_outcome.unwrap_or_else(|err| {
        warn!(error = %err, "vector sub-search failed; continuing with keyword only");
        Vec::new()
    });
    let keyword_results = keyword_outcome.unwrap_or_else(|err| {
        warn!(error = %err, "keyword sub-search failed; continuing with vector only");
        Vec::new()
    });

    Ok(merge_hybrid_scores(
        vector_results,
        keyword_results,
        options,
    ))
}

/// Weighted merge of the two rankings by chunk id: a chunk found by both
/// signals scores `vector·vw + keyword·kw`; a chunk found by one signal
/// contributes only that weighted term. Keyword scores are min-max
/// normalized first since BM25 is unbounded.
pub(crate) fn merge_hybrid_scores(
    vector_results: Vec<ScoredChunk>,
    keyword_results: Vec<ScoredChunk>,
    options: &SearchOptions,
) -> Vec<SearchResult> {
    let keyword_scores: Vec<f32> = keyword_results.iter().map(|entry| entry.score).collect();
    let normalized_keyword = min_max_normalize(&keyword_scores);

    let mut merged: std::collections::HashMap<String, SearchResult> = std::collections::HashMap::new();

    for entry in vector_results {
        let weighted = clamp_unit(entry.score) * options.vector_weight;
        merged.insert(
            entry.chunk.id.clone(),
            SearchResult::from_chunk(entry.chunk, weighted),
        );
    }

    for (entry, normalized) in keyword_results.into_iter().zip(normalized_keyword) {
        let weighted = normalized * options.keyword_weight;
        merged
            .entry(entry.chunk.id.clone())
            .and_modify(|existing| existing.score += weighted)
            .or_insert_with(|| SearchResult::from_chunk(entry.chunk, weighted));
    }

    let mut results: Vec<SearchResult> = merged
        .into_values()
        .filter(|result| result.score >= options.min_score)
        .collect();
    sort_by_score_desc(&mut results);
    results.truncate(options.top_k);
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::source_document::DocumentMetadata;
    use common::utils::embedding::EmbeddingProvider;
    use uuid::Uuid;

    fn product_metadata(external_id: &str, price: f64) -> DocumentMetadata {
        DocumentMetadata::Product {
            brand: "Asus".into(),
            category: "notebook".into(),
            price: Some(price),
            tags: vec!["gaming".into()],
            canonical_url: format!("https://shop.example/{external_id}"),
            display_name: format!("Item {external_id}"),
        }
    }

    fn chunk(source_id: &str, text: &str, embedding: Vec<f32>) -> TextChunk {
        TextChunk::new(
            format!("doc-{source_id}"),
            SourceType::Product,
            source_id.to_owned(),
            0,
            text.to_owned(),
            product_metadata(source_id, 15_000.0),
            Some(embedding),
        )
    }

    fn scored(chunk: TextChunk, score: f32) -> ScoredChunk {
        ScoredChunk { chunk, score }
    }

    #[test]
    fn merge_sums_weighted_scores_for_shared_chunks() {
        let shared = chunk("item-1", "gaming notebook", vec![1.0, 0.0]);
        let vector_only = chunk("item-2", "another notebook", vec![0.9, 0.1]);
        let keyword_only = chunk("item-3", "third notebook", vec![0.1, 0.9]);

        let options = SearchOptions::default();
        let results = merge_hybrid_scores(
            vec![scored(shared.clone(), 0.8), scored(vector_only.clone(), 0.6)],
            vec![scored(shared.clone(), 4.0), scored(keyword_only.clone(), 1.0)],
            &options,
        );

        let find = |id: &str| {
            results
                .iter()
                .find(|result| result.chunk_id == id)
                .expect("result present")
        };

        // Keyword scores [4.0, 1.0] normalize to [1.0, 0.0].
        let shared_score = find(&shared.id).score;
        assert!(
            (shared_score - (0.8 * 0.7 + 1.0 * 0.3)).abs() < 1e-6,
            "shared chunk must sum both weighted signals, got {shared_score}"
        );

        let vector_score = find(&vector_only.id).score;
        assert!((vector_score - 0.6 * 0.7).abs() < 1e-6);

        let keyword_score = find(&keyword_only.id).score;
        assert!(keyword_score.abs() < 1e-6);

        // Sorted descending
        for pair in results.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn merge_filters_by_min_score_and_truncates() {
        let strong = chunk("item-1", "match", vec![1.0, 0.0]);
        let weak = chunk("item-2", "weak", vec![0.0, 1.0]);

        let options = SearchOptions {
            top_k: 1,
            min_score: 0.3,
            ..SearchOptions::default()
        };
        let results = merge_hybrid_scores(
            vec![scored(strong.clone(), 0.9), scored(weak, 0.1)],
            Vec::new(),
            &options,
        );

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk_id, strong.id);
    }

    async fn seeded_db() -> (Arc<SurrealDbClient>, EmbeddingProvider, VideoContext) {
        let db = Arc::new(
            SurrealDbClient::memory("test_ns", &Uuid::new_v4().to_string())
                .await
                .expect("Failed to start in-memory surrealdb"),
        );
        db.ensure_initialized(8)
            .await
            .expect("Failed to initialize schema");

        let provider = EmbeddingProvider::new_hashed(8);

        let context = VideoContext::new(
            "vid-1".into(),
            "Budget notebooks".into(),
            vec!["notebook".into()],
            vec!["asus".into()],
            None,
            vec!["gaming".into()],
        );
        db.store_item(context.clone()).await.expect("store context");

        (db, provider, context)
    }

    async fn seed_product(
        db: &SurrealDbClient,
        provider: &EmbeddingProvider,
        item: &CatalogItem,
        description: &str,
    ) {
        let embedding = provider.embed(description).await.expect("embed");
        let chunk = TextChunk::new(
            format!("doc-{}", item.id),
            SourceType::Product,
            item.id.clone(),
            0,
            description.to_owned(),
            DocumentMetadata::Product {
                brand: item.brand.clone(),
                category: item.category.clone(),
                price: item.price,
                tags: item.tags.clone(),
                canonical_url: item.canonical_url.clone(),
                display_name: item.display_name.clone(),
            },
            Some(embedding),
        );
        db.store_item(item.clone()).await.expect("store item");
        db.store_item(chunk).await.expect("store chunk");
        db.rebuild_indexes().await.expect("rebuild");
    }

    fn catalog_item(external_id: &str) -> CatalogItem {
        CatalogItem::new(
            external_id.to_owned(),
            format!("Item {external_id}"),
            "Asus".into(),
            "notebook".into(),
            Some(15_000.0),
            vec!["gaming".into()],
            format!("https://shop.example/{external_id}"),
            true,
        )
    }

    #[tokio::test]
    async fn pool_tier_restricts_results() {
        let (db, provider, context) = seeded_db().await;

        let in_pool = catalog_item("in-pool");
        let out_of_pool = catalog_item("out-of-pool");
        seed_product(&db, &provider, &in_pool, "asus gaming notebook 15000").await;
        seed_product(&db, &provider, &out_of_pool, "asus gaming notebook 15000 too").await;

        db.store_item(RelevancePoolEntry::new(
            context.id.clone(),
            in_pool.id.clone(),
            0.9,
            true,
            true,
            false,
        ))
        .await
        .expect("store pool entry");

        let retriever = HybridRetriever::new(Arc::clone(&db));
        let embedding = provider.embed("gaming notebook").await.expect("embed");
        let results = retriever
            .search(
                "gaming notebook",
                &embedding,
                &SearchOptions {
                    source_type: Some(SourceType::Product),
                    context_id: Some(context.id.clone()),
                    ..SearchOptions::default()
                },
            )
            .await
            .expect("search failed");

        assert!(!results.is_empty());
        assert!(
            results.iter().all(|result| result.source_id == in_pool.id),
            "pool tier must exclude candidates outside the pool"
        );
    }

    #[tokio::test]
    async fn empty_pool_and_signals_fall_back_to_full_scan() {
        let (db, provider, _) = seeded_db().await;

        // Context without structured metadata and without a pool.
        let bare = VideoContext::new(
            "vid-bare".into(),
            "Untagged upload".into(),
            Vec::new(),
            Vec::new(),
            None,
            Vec::new(),
        );
        db.store_item(bare.clone()).await.expect("store context");

        let item = catalog_item("item-1");
        seed_product(&db, &provider, &item, "asus gaming notebook 15000").await;

        let retriever = HybridRetriever::new(Arc::clone(&db));
        let embedding = provider.embed("gaming notebook").await.expect("embed");
        let results = retriever
            .search(
                "gaming notebook",
                &embedding,
                &SearchOptions {
                    source_type: Some(SourceType::Product),
                    context_id: Some(bare.id.clone()),
                    ..SearchOptions::default()
                },
            )
            .await
            .expect("search failed");

        assert!(
            !results.is_empty(),
            "full-scan tier must serve contexts with no pool and no signals"
        );
        assert_eq!(results[0].source_id, item.id);
    }

    #[tokio::test]
    async fn no_context_goes_straight_to_full_scan() {
        let (db, provider, _) = seeded_db().await;
        let item = catalog_item("item-1");
        seed_product(&db, &provider, &item, "asus gaming notebook").await;

        let retriever = HybridRetriever::new(Arc::clone(&db));
        let embedding = provider.embed("gaming notebook").await.expect("embed");
        let results = retriever
            .search("gaming notebook", &embedding, &SearchOptions::default())
            .await
            .expect("search failed");
        assert!(!results.is_empty());
    }
}
