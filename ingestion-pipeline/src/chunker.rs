use common::{
    error::AppError,
    storage::types::source_document::SourceType,
    utils::token_count::{count_tokens, token_suffix},
};

/// Token bounds for one content type. Comments are never split, so they have
/// no profile.
#[derive(Debug, Clone, Copy)]
pub struct ChunkProfile {
    pub max_tokens: usize,
    pub overlap: usize,
    pub preserve_sentences: bool,
}

impl ChunkProfile {
    pub fn transcript() -> Self {
        Self {
            max_tokens: 400,
            overlap: 60,
            preserve_sentences: true,
        }
    }

    pub fn product() -> Self {
        Self {
            max_tokens: 120,
            overlap: 20,
            preserve_sentences: true,
        }
    }

    /// None means the whole normalized text becomes exactly one chunk.
    pub fn for_source_type(source_type: SourceType) -> Option<Self> {
        match source_type {
            SourceType::Transcript => Some(Self::transcript()),
            SourceType::Product => Some(Self::product()),
            SourceType::Comment => None,
        }
    }
}

/// Splits normalized text into token-bounded chunks.
///
/// Guarantees:
/// - input within budget comes back as exactly one chunk equal to the input;
/// - every chunk stays within `max_tokens`, except pieces of a single
///   oversized atomic segment, which are force-split by character budget
///   preferring word boundaries;
/// - consecutive chunks share up to `overlap` tokens carried from the tail
///   of the previous chunk.
pub fn chunk(text: &str, profile: &ChunkProfile) -> Result<Vec<String>, AppError> {
    if profile.max_tokens == 0 {
        return Err(AppError::Validation(
            "chunk max_tokens must be greater than zero".into(),
        ));
    }
    if profile.overlap >= profile.max_tokens {
        return Err(AppError::Validation(format!(
            "chunk overlap of {} must be smaller than max_tokens of {}",
            profile.overlap, profile.max_tokens
        )));
    }

    if count_tokens(text)? <= profile.max_tokens {
        return Ok(vec![text.to_owned()]);
    }

    let segments = if profile.preserve_sentences {
        split_sentences(text)
    } else {
        split_words(text)
    };

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_tokens = 0usize;
    // Tokens in `current` that were carried over from the previous chunk.
    let mut carried_tokens = 0usize;

    for segment in segments {
        let segment_tokens = count_tokens(segment)?;

        if segment_tokens > profile.max_tokens {
            // Oversized atomic segment; sentence splitting cannot help.
            if current_tokens > carried_tokens {
                chunks.push(std::mem::take(&mut current));
            } else {
                current.clear();
            }
            current_tokens = 0;
            carried_tokens = 0;
            chunks.extend(split_by_char_budget(
                segment,
                segment_tokens,
                profile.max_tokens,
            ));
            continue;
        }

        if !current.is_empty() && current_tokens + segment_tokens > profile.max_tokens {
            if current_tokens == carried_tokens {
                // Only the carried overlap is present; drop it rather than
                // emitting an overlap-only chunk.
                current.clear();
                current_tokens = 0;
                carried_tokens = 0;
            } else {
                let finished = std::mem::take(&mut current);
                let carry = if profile.overlap > 0 {
                    token_suffix(&finished, profile.overlap)?
                } else {
                    String::new()
                };
                chunks.push(finished);

                carried_tokens = count_tokens(&carry)?;
                if carried_tokens + segment_tokens > profile.max_tokens {
                    // Carrying the overlap would overflow; start clean.
                    current = String::new();
                    current_tokens = 0;
                    carried_tokens = 0;
                } else {
                    current = carry;
                    current_tokens = carried_tokens;
                }
            }
        }

        current.push_str(segment);
        current_tokens += segment_tokens;
    }

    if current_tokens > carried_tokens {
        chunks.push(current);
    }

    Ok(chunks)
}

/// Partitions text into sentence slices. Slices are contiguous and keep
/// their trailing whitespace, so concatenating them reproduces the input.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((index, ch)) = chars.next() {
        let terminator = matches!(ch, '.' | '!' | '?');
        if !terminator && ch != '\n' {
            continue;
        }

        let mut end = index + ch.len_utf8();
        while let Some(&(next_index, next)) = chars.peek() {
            let extend = next.is_whitespace() || (terminator && matches!(next, '.' | '!' | '?'));
            if !extend {
                break;
            }
            end = next_index + next.len_utf8();
            chars.next();
        }
        slices.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        slices.push(&text[start..]);
    }
    if slices.is_empty() {
        slices.push(text);
    }
    slices
}

/// Word-level segmentation for content where sentence boundaries carry no
/// meaning. Same contiguity guarantee as [`split_sentences`].
fn split_words(text: &str) -> Vec<&str> {
    let mut slices = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    let mut in_whitespace = false;

    while let Some(&(index, ch)) = chars.peek() {
        if in_whitespace && !ch.is_whitespace() {
            slices.push(&text[start..index]);
            start = index;
        }
        in_whitespace = ch.is_whitespace();
        chars.next();
    }

    if start < text.len() {
        slices.push(&text[start..]);
    }
    if slices.is_empty() {
        slices.push(text);
    }
    slices
}

/// Force-splits one oversized atomic segment by character budget, cutting at
/// the last word boundary inside each window when one exists.
fn split_by_char_budget(segment: &str, segment_tokens: usize, max_tokens: usize) -> Vec<String> {
    let char_count = segment.chars().count();
    let budget = (max_tokens * char_count / segment_tokens.max(1)).max(1);

    let mut pieces = Vec::new();
    let mut rest = segment;
    loop {
        if rest.chars().count() <= budget {
            if !rest.is_empty() {
                pieces.push(rest.to_owned());
            }
            break;
        }

        let mut cut = rest
            .char_indices()
            .nth(budget)
            .map_or(rest.len(), |(index, _)| index);
        if let Some(whitespace) = rest[..cut].rfind(char::is_whitespace) {
            if whitespace > 0 {
                // Cut after the whitespace so no character is lost.
                cut = whitespace + 1;
            }
        }
        pieces.push(rest[..cut].to_owned());
        rest = &rest[cut..];
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::utils::token_count::{install_encoder, whitespace_encoder};

    fn setup() {
        install_encoder(whitespace_encoder());
    }

    fn words(text: &str) -> Vec<&str> {
        text.split_whitespace().collect()
    }

    /// Longest k with previous[len-k..] == next[..k].
    fn shared_overlap(previous: &[&str], next: &[&str]) -> usize {
        (0..=previous.len().min(next.len()))
            .rev()
            .find(|k| previous[previous.len() - k..] == next[..*k])
            .unwrap_or(0)
    }

    #[test]
    fn input_within_budget_is_a_single_chunk() {
        setup();
        let profile = ChunkProfile {
            max_tokens: 10,
            overlap: 2,
            preserve_sentences: true,
        };
        let text = "Short input. Stays whole.";
        let chunks = chunk(text, &profile).expect("chunking failed");
        assert_eq!(chunks, vec![text.to_owned()]);
    }

    #[test]
    fn chunks_respect_token_budget_and_overlap() {
        setup();
        let profile = ChunkProfile {
            max_tokens: 6,
            overlap: 2,
            preserve_sentences: true,
        };
        let text = "one two three. four five six. seven eight nine. ten eleven twelve.";
        let chunks = chunk(text, &profile).expect("chunking failed");
        assert!(chunks.len() > 1, "expected multiple chunks");

        for piece in &chunks {
            assert!(
                count_tokens(piece).expect("count") <= profile.max_tokens,
                "chunk over budget: {piece:?}"
            );
        }

        // Consecutive chunks share the previous chunk's tail.
        for pair in chunks.windows(2) {
            let previous = words(&pair[0]);
            let next = words(&pair[1]);
            // "three." tokenizes as two tokens, so at least one word carries.
            assert!(
                shared_overlap(&previous, &next) >= 1,
                "expected carried overlap between {pair:?}"
            );
        }

        // Coverage: dropping each chunk's carried prefix reproduces the input.
        let mut reconstructed: Vec<&str> = words(&chunks[0]);
        for pair in chunks.windows(2) {
            let previous = words(&pair[0]);
            let next = words(&pair[1]);
            let shared = shared_overlap(&previous, &next);
            reconstructed.extend(next.iter().skip(shared));
        }
        assert_eq!(reconstructed, words(text));
    }

    #[test]
    fn no_overlap_when_configured_to_zero() {
        setup();
        let profile = ChunkProfile {
            max_tokens: 3,
            overlap: 0,
            preserve_sentences: true,
        };
        let text = "a b. c d. e f.";
        let chunks = chunk(text, &profile).expect("chunking failed");
        let total: usize = chunks.iter().map(|piece| words(piece).len()).sum();
        assert_eq!(total, words(text).len(), "no token may be duplicated");
    }

    #[test]
    fn oversized_atomic_sentence_is_char_split() {
        setup();
        let profile = ChunkProfile {
            max_tokens: 4,
            overlap: 1,
            preserve_sentences: true,
        };
        // No sentence terminator: one atomic segment of 10 tokens.
        let text = "one two three four five six seven eight nine ten";
        let chunks = chunk(text, &profile).expect("chunking failed");
        assert!(chunks.len() > 1, "oversized segment must be split");
        // Character cuts lose nothing.
        assert_eq!(chunks.concat(), text);
        // Cuts prefer word boundaries.
        for piece in &chunks {
            assert!(!piece.is_empty());
        }
    }

    #[test]
    fn rejects_invalid_bounds() {
        setup();
        let text = "anything";
        assert!(matches!(
            chunk(
                text,
                &ChunkProfile {
                    max_tokens: 0,
                    overlap: 0,
                    preserve_sentences: true
                }
            ),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            chunk(
                text,
                &ChunkProfile {
                    max_tokens: 5,
                    overlap: 5,
                    preserve_sentences: true
                }
            ),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn profiles_match_content_types() {
        let transcript = ChunkProfile::for_source_type(SourceType::Transcript)
            .expect("transcripts have a profile");
        assert_eq!(transcript.max_tokens, 400);
        assert_eq!(transcript.overlap, 60);

        let product =
            ChunkProfile::for_source_type(SourceType::Product).expect("products have a profile");
        assert_eq!(product.max_tokens, 120);
        assert_eq!(product.overlap, 20);

        assert!(
            ChunkProfile::for_source_type(SourceType::Comment).is_none(),
            "comments are never split"
        );
    }

    #[test]
    fn word_mode_packs_without_sentence_boundaries() {
        setup();
        let profile = ChunkProfile {
            max_tokens: 3,
            overlap: 1,
            preserve_sentences: false,
        };
        let text = "alpha beta gamma delta epsilon zeta";
        let chunks = chunk(text, &profile).expect("chunking failed");
        assert!(chunks.len() > 1);
        for piece in &chunks {
            assert!(count_tokens(piece).expect("count") <= profile.max_tokens);
        }
    }
}
