pub mod generator;
pub mod pool;
pub mod prompt;
pub mod validator;

use std::sync::Arc;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            catalog_item::CatalogItem, relevance_pool::RelevancePoolEntry,
            source_document::SourceType, system_settings::SystemSettings,
        },
    },
    utils::embedding::EmbeddingProvider,
};
use retrieval_pipeline::{
    assembler::{assemble, AssemblerOptions},
    hybrid::{HybridRetriever, SearchOptions},
    intent::extract_intent,
    price::{rerank_by_price, PriceRerankOptions},
    SearchResult,
};
use tracing::{debug, info, instrument};

use crate::{
    generator::{parse_draft, ReplyGenerator},
    pool::{CandidateItem, CandidatePool},
    prompt::create_user_message,
    validator::{validate_reply, ValidatedReply},
};

#[derive(Debug, Clone)]
pub struct AnswerRequest {
    /// Video context scoping retrieval and the candidate pool, when known.
    pub context_id: Option<String>,
    pub comment_text: String,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerOptions {
    pub search: SearchOptions,
    pub assembler: AssemblerOptions,
    pub price: PriceRerankOptions,
}

/// Answers one comment end to end: intent extraction, scoped hybrid
/// retrieval, price re-ranking when a budget was detected, token-budgeted
/// context assembly, generation, and output validation.
#[instrument(skip_all, fields(context_id = ?request.context_id))]
pub async fn answer_comment(
    db: &Arc<SurrealDbClient>,
    embeddings: &EmbeddingProvider,
    generator: &dyn ReplyGenerator,
    request: &AnswerRequest,
    options: &AnswerOptions,
) -> Result<ValidatedReply, AppError> {
    let settings = SystemSettings::get_current(db).await?;

    let known_brands = CatalogItem::distinct_brands(db).await?;
    let intent = extract_intent(&request.comment_text, &known_brands);
    debug!(budget = ?intent.budget(), brands = intent.brands.len(), "query intent extracted");

    // Interactive path: an embedding failure fails the request.
    let query_embedding = embeddings
        .embed(&request.comment_text)
        .await
        .map_err(AppError::from)?;

    let retriever = HybridRetriever::new(Arc::clone(db));
    let search_options = SearchOptions {
        source_type: Some(SourceType::Product),
        context_id: request.context_id.clone(),
        ..options.search.clone()
    };
    let results = retriever
        .search(&request.comment_text, &query_embedding, &search_options)
        .await?;

    let results: Vec<SearchResult> = match intent.budget() {
        Some(budget) => rerank_by_price(results, budget, &options.price)?
            .into_iter()
            .map(|entry| {
                let mut result = entry.result;
                result.score = entry.final_score;
                result
            })
            .collect(),
        None => results,
    };

    let assembled = assemble(&results, &options.assembler)?;
    let pool = candidate_pool_for(db, request.context_id.as_deref(), &results).await?;

    let user_message = create_user_message(&assembled, &pool, &request.comment_text);
    let raw = generator
        .generate(&settings.reply_system_prompt, &user_message)
        .await?;

    let draft = parse_draft(&raw);
    let validated = validate_reply(draft, &pool);

    info!(
        contexts = assembled.blocks.len(),
        candidates = pool.len(),
        products = validated.products.len(),
        "comment answered"
    );
    Ok(validated)
}

/// Builds the generation allow-list: the context's relevance pool when one
/// exists, otherwise the catalog items behind the retrieved product chunks.
async fn candidate_pool_for(
    db: &Arc<SurrealDbClient>,
    context_id: Option<&str>,
    results: &[SearchResult],
) -> Result<CandidatePool, AppError> {
    if let Some(context_id) = context_id {
        let entries = RelevancePoolEntry::load_for_context(context_id, db).await?;
        if !entries.is_empty() {
            return CandidatePool::from_pool_entries(&entries, db).await;
        }
    }

    let retrieved_ids: Vec<String> = results
        .iter()
        .filter(|result| result.source_type == SourceType::Product)
        .map(|result| result.source_id.clone())
        .collect();
    let items = CatalogItem::get_many(&retrieved_ids, db).await?;
    let by_id: std::collections::HashMap<&str, &CatalogItem> = items
        .iter()
        .map(|item| (item.id.as_str(), item))
        .collect();

    let ordered: Vec<CandidateItem> = retrieved_ids
        .iter()
        .filter_map(|id| by_id.get(id.as_str()).map(|item| CandidateItem::from(*item)))
        .collect();
    Ok(CandidatePool::from_items(ordered))
}
