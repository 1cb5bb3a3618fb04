use std::cmp::Ordering;

use common::error::AppError;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::SearchResult;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PriceRerankOptions {
    pub price_weight: f32,
    pub semantic_weight: f32,
    /// Below this price score the item is penalized down to its weighted
    /// semantic component alone.
    pub min_price_score: f32,
}

impl Default for PriceRerankOptions {
    fn default() -> Self {
        Self {
            price_weight: 0.4,
            semantic_weight: 0.6,
            min_price_score: 0.0,
        }
    }
}

/// A search result with its price-adjusted final score. `reranked` is false
/// for items whose price was unknown or non-positive.
#[derive(Debug, Clone)]
pub struct RerankedResult {
    pub result: SearchResult,
    pub final_score: f32,
    pub price_score: Option<f32>,
    pub reranked: bool,
}

/// Proximity between the asked budget and an item price:
/// `max(0, 1 − |q−p| / avg(q,p))`. Zero for non-positive inputs.
pub fn price_score(query_price: f64, item_price: f64) -> f32 {
    if query_price <= 0.0 || item_price <= 0.0 {
        return 0.0;
    }
    let average = (query_price + item_price) / 2.0;
    let score = 1.0 - (query_price - item_price).abs() / average;
    score.max(0.0) as f32
}

/// Re-ranks results by price proximity to a detected budget.
///
/// Weights must sum to 1.0 or the call is rejected. Items whose price score
/// falls below `min_price_score` keep only their weighted semantic
/// component; the discontinuity at the threshold is intentional.
pub fn rerank_by_price(
    results: Vec<SearchResult>,
    query_price: f64,
    options: &PriceRerankOptions,
) -> Result<Vec<RerankedResult>, AppError> {
    if (options.price_weight + options.semantic_weight - 1.0).abs() > 1e-6 {
        return Err(AppError::Validation(format!(
            "price_weight {} and semantic_weight {} must sum to 1.0",
            options.price_weight, options.semantic_weight
        )));
    }

    let mut reranked: Vec<RerankedResult> = results
        .into_iter()
        .map(|result| {
            let item_price = result.metadata.price().filter(|price| *price > 0.0);
            match item_price {
                None => RerankedResult {
                    final_score: result.score,
                    price_score: None,
                    reranked: false,
                    result,
                },
                Some(price) => {
                    let proximity = price_score(query_price, price);
                    let final_score = if proximity < options.min_price_score {
                        // Price mismatch is punished, not ignored.
                        result.score * options.semantic_weight
                    } else {
                        result.score * options.semantic_weight
                            + proximity * options.price_weight
                    };
                    RerankedResult {
                        final_score,
                        price_score: Some(proximity),
                        reranked: true,
                        result,
                    }
                }
            }
        })
        .collect();

    reranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.result.chunk_id.cmp(&b.result.chunk_id))
    });

    debug!(
        query_price,
        result_count = reranked.len(),
        "price re-ranking applied"
    );
    Ok(reranked)
}
