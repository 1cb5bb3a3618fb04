use common::{error::AppError, utils::token_count};
use tracing::debug;

use crate::SearchResult;

/// Default minimum size for a truncated trailing block. Anything smaller is
/// not worth sending to the generator.
pub const DEFAULT_MIN_USEFUL_TOKENS: usize = 50;

#[derive(Debug, Clone, Copy)]
pub struct AssemblerOptions {
    /// Total prompt budget, including the reserved headroom.
    pub token_budget: usize,
    /// Tokens reserved for query, instructions and the model's response.
    pub headroom: usize,
    pub min_useful_tokens: usize,
}

impl Default for AssemblerOptions {
    fn default() -> Self {
        Self {
            token_budget: 4096,
            headroom: 1024,
            min_useful_tokens: DEFAULT_MIN_USEFUL_TOKENS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextBlock {
    pub chunk_id: String,
    pub source_id: String,
    pub text: String,
    pub score: f32,
    pub truncated: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AssembledContext {
    pub blocks: Vec<ContextBlock>,
    pub tokens_used: usize,
    /// True when a block had to be cut to fit the remaining budget.
    pub truncated: bool,
}

/// Greedily packs ranked results into the token budget. The first result
/// that does not fit is included as a truncated prefix when the remaining
/// budget is still useful; afterwards assembly stops outright.
pub fn assemble(
    results: &[SearchResult],
    options: &AssemblerOptions,
) -> Result<AssembledContext, AppError> {
    let available = options.token_budget.saturating_sub(options.headroom);
    let mut assembled = AssembledContext::default();
    let mut remaining = available;

    for result in results {
        let tokens = token_count::count_tokens(&result.text)?;

        if tokens <= remaining {
            remaining -= tokens;
            assembled.tokens_used += tokens;
            assembled.blocks.push(ContextBlock {
                chunk_id: result.chunk_id.clone(),
                source_id: result.source_id.clone(),
                text: result.text.clone(),
                score: result.score,
                truncated: false,
            });
            continue;
        }

        if remaining >= options.min_useful_tokens {
            let prefix = token_count::truncate_to_tokens(&result.text, remaining)?;
            let used = token_count::count_tokens(&prefix)?;
            assembled.tokens_used += used;
            assembled.blocks.push(ContextBlock {
                chunk_id: result.chunk_id.clone(),
                source_id: result.source_id.clone(),
                text: prefix,
                score: result.score,
                truncated: true,
            });
            assembled.truncated = true;
        }

        // Budget exhausted either way; nothing further is considered.
        break;
    }

    debug!(
        blocks = assembled.blocks.len(),
        tokens_used = assembled.tokens_used,
        available,
        "context assembled"
    );
    Ok(assembled)
}
