use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use tokenizers::Tokenizer;

use crate::error::AppError;

/// Encoder used when nothing else has been installed. Matches the model the
/// chunk profiles were tuned against.
const DEFAULT_ENCODER_MODEL: &str = "bert-base-cased";

/// Module-level registry owning the encoder handle. Lazily initialized on
/// first use; [`reset_encoder`] frees it, [`install_encoder`] replaces it
/// (tests install a deterministic whitespace encoder).
static ENCODER_REGISTRY: Lazy<Mutex<Option<Arc<Tokenizer>>>> = Lazy::new(|| Mutex::new(None));

pub fn encoder() -> Result<Arc<Tokenizer>, AppError> {
    let mut guard = ENCODER_REGISTRY
        .lock()
        .map_err(|_| AppError::InternalError("encoder registry lock poisoned".into()))?;

    if let Some(handle) = guard.as_ref() {
        return Ok(Arc::clone(handle));
    }

    let tokenizer = Tokenizer::from_pretrained(DEFAULT_ENCODER_MODEL, None)
        .map_err(|e| AppError::InternalError(format!("failed to initialize encoder: {e}")))?;
    let handle = Arc::new(tokenizer);
    *guard = Some(Arc::clone(&handle));
    Ok(handle)
}

pub fn install_encoder(tokenizer: Tokenizer) {
    if let Ok(mut guard) = ENCODER_REGISTRY.lock() {
        *guard = Some(Arc::new(tokenizer));
    }
}

/// Explicitly frees the encoder handle. The next [`encoder`] call
/// re-initializes it.
pub fn reset_encoder() {
    if let Ok(mut guard) = ENCODER_REGISTRY.lock() {
        *guard = None;
    }
}

pub fn count_tokens(text: &str) -> Result<usize, AppError> {
    if text.is_empty() {
        return Ok(0);
    }
    let encoding = encode(text)?;
    Ok(encoding.get_ids().len())
}

/// Longest prefix of `text` spanning at most `max_tokens` tokens.
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> Result<String, AppError> {
    if max_tokens == 0 {
        return Ok(String::new());
    }
    let encoding = encode(text)?;
    let offsets = encoding.get_offsets();
    if offsets.len() <= max_tokens {
        return Ok(text.to_owned());
    }

    let end = offsets
        .get(max_tokens - 1)
        .map_or(text.len(), |(_, end)| *end);
    Ok(text[..floor_char_boundary(text, end)].to_owned())
}

/// Suffix of `text` spanning at most `tokens` tokens, used to carry chunk
/// overlap.
pub fn token_suffix(text: &str, tokens: usize) -> Result<String, AppError> {
    if tokens == 0 {
        return Ok(String::new());
    }
    let encoding = encode(text)?;
    let offsets = encoding.get_offsets();
    if offsets.len() <= tokens {
        return Ok(text.to_owned());
    }

    let start = offsets
        .get(offsets.len() - tokens)
        .map_or(0, |(start, _)| *start);
    Ok(text[floor_char_boundary(text, start)..].to_owned())
}

fn encode(text: &str) -> Result<tokenizers::Encoding, AppError> {
    let encoder = encoder()?;
    encoder
        .encode(text, false)
        .map_err(|e| AppError::InternalError(format!("failed to encode text: {e}")))
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while index > 0 && !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Builds a deterministic whitespace-word encoder that needs no model
/// download. One token per whitespace-separated word or punctuation run.
#[cfg(any(test, feature = "test-utils"))]
pub fn whitespace_encoder() -> Tokenizer {
    use std::collections::HashMap;
    use tokenizers::models::wordlevel::WordLevel;
    use tokenizers::pre_tokenizers::whitespace::Whitespace;

    let vocab: HashMap<String, u32> = HashMap::from([("[UNK]".to_string(), 0)]);
    let model = WordLevel::builder()
        .vocab(vocab)
        .unk_token("[UNK]".to_string())
        .build()
        .expect("static wordlevel vocab is valid");
    let mut tokenizer = Tokenizer::new(model);
    tokenizer.with_pre_tokenizer(Some(Whitespace {}));
    tokenizer
}
