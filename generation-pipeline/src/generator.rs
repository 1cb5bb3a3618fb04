use std::sync::Arc;

use async_openai::{
    types::{
        ChatCompletionRequestSystemMessage, ChatCompletionRequestUserMessage,
        CreateChatCompletionRequestArgs, ResponseFormat, ResponseFormatJsonSchema,
    },
    Client,
};
use async_trait::async_trait;
use common::error::AppError;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::prompt::get_reply_schema;

/// A product reference as emitted by the generator, before validation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DraftProduct {
    pub id: String,
    #[serde(default)]
    pub url: String,
}

/// Parsed generator output, before validation.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DraftReply {
    pub reply_text: String,
    #[serde(default)]
    pub products: Vec<DraftProduct>,
}

/// Seam over the generation service so the pipeline can be exercised
/// without network access.
#[async_trait]
pub trait ReplyGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, AppError>;
}

/// Chat-completion backed generator requesting structured JSON output.
pub struct OpenAiReplyGenerator {
    client: Arc<Client<async_openai::config::OpenAIConfig>>,
    model: String,
}

impl OpenAiReplyGenerator {
    pub fn new(client: Arc<Client<async_openai::config::OpenAIConfig>>, model: String) -> Self {
        Self { client, model }
    }
}

#[async_trait]
impl ReplyGenerator for OpenAiReplyGenerator {
    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String, AppError> {
        let response_format = ResponseFormat::JsonSchema {
            json_schema: ResponseFormatJsonSchema {
                description: Some("Comment reply with bounded product recommendations".into()),
                name: "comment_reply".into(),
                schema: Some(get_reply_schema()),
                strict: Some(true),
            },
        };

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages([
                ChatCompletionRequestSystemMessage::from(system_prompt.to_owned()).into(),
                ChatCompletionRequestUserMessage::from(user_message.to_owned()).into(),
            ])
            .response_format(response_format)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or(AppError::LLMParsing(
                "No content found in LLM response".into(),
            ))
    }
}

/// Removes code-fence wrapping some models put around otherwise-valid JSON.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop an optional language tag on the fence line.
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => rest,
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parses raw generator output into a draft reply. On any parse failure the
/// entire raw text becomes the reply with no products; this never errors.
pub fn parse_draft(raw: &str) -> DraftReply {
    let cleaned = strip_code_fences(raw);

    match serde_json::from_str::<DraftReply>(cleaned) {
        Ok(draft) => {
            debug!(
                products = draft.products.len(),
                "generator output parsed as structured reply"
            );
            draft
        }
        Err(err) => {
            warn!(error = %err, "generator output was not valid JSON; using raw text fallback");
            DraftReply {
                reply_text: raw.trim().to_owned(),
                products: Vec::new(),
            }
        }
    }
}
