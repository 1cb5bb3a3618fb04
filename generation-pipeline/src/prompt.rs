use retrieval_pipeline::assembler::AssembledContext;
use serde_json::{json, Value};

use crate::pool::CandidatePool;

/// Builds the user message combining retrieved context, the candidate
/// allow-list and the viewer's comment.
pub fn create_user_message(
    contexts: &AssembledContext,
    pool: &CandidatePool,
    comment: &str,
) -> String {
    format!(
        r"
        Context Information:
        ==================
        {}

        Candidate Products:
        ==================
        {}

        Viewer Comment:
        ==================
        {}
        ",
        contexts_to_json(contexts),
        pool_to_json(pool),
        comment
    )
}

/// Retrieved context blocks as JSON for the generator.
pub fn contexts_to_json(contexts: &AssembledContext) -> Value {
    json!(contexts
        .blocks
        .iter()
        .map(|block| {
            json!({
                "id": block.chunk_id,
                "content": block.text,
                "score": round_score(block.score),
            })
        })
        .collect::<Vec<_>>())
}

/// The allow-list as shown to the generator: id, name, price, url.
pub fn pool_to_json(pool: &CandidatePool) -> Value {
    json!(pool
        .items()
        .iter()
        .map(|item| {
            json!({
                "id": item.id,
                "name": item.display_name,
                "price": item.price,
                "url": item.canonical_url,
            })
        })
        .collect::<Vec<_>>())
}

/// JSON schema for the structured reply, passed to the chat completion's
/// response-format option.
pub fn get_reply_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "reply_text": {
                "type": "string",
                "description": "The reply to post under the comment, in the commenter's language"
            },
            "products": {
                "type": "array",
                "description": "Recommended products, taken from the candidate list only",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "url": { "type": "string" }
                    },
                    "required": ["id", "url"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["reply_text", "products"],
        "additionalProperties": false
    })
}

fn round_score(value: f32) -> f64 {
    (f64::from(value) * 1000.0).round() / 1000.0
}
