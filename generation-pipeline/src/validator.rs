use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::{generator::DraftReply, pool::CandidatePool};

/// Hard ceiling on recommendations per reply.
pub const MAX_RECOMMENDATIONS: usize = 2;

static MARKDOWN_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[([^\]]*)\]\((https?://[^)\s]+)\)").expect("static regex compiles"));
static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"')\]]+"#).expect("static regex compiles"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProduct {
    pub id: String,
    /// Always the pool's canonical url, never the generator's own string.
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub dropped_unknown: usize,
    pub dropped_duplicate: usize,
    pub rewritten_urls: usize,
    pub truncated: usize,
    pub stripped_links: usize,
}

#[derive(Debug, Clone)]
pub struct ValidatedReply {
    pub reply_text: String,
    pub products: Vec<ValidatedProduct>,
    pub stats: ValidationStats,
}

/// Enforces the candidate-pool contract on a draft reply, in order: drop
/// unknown product ids, overwrite urls with the pool's canonical ones,
/// truncate to [`MAX_RECOMMENDATIONS`], then strip every embedded link that
/// is not exactly an allowed canonical url (all links when the pool is
/// empty).
pub fn validate_reply(draft: DraftReply, pool: &CandidatePool) -> ValidatedReply {
    let mut stats = ValidationStats::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut products: Vec<ValidatedProduct> = Vec::new();

    for product in draft.products {
        let Some(canonical_url) = pool.canonical_url_for(&product.id) else {
            stats.dropped_unknown += 1;
            continue;
        };
        if !seen.insert(product.id.clone()) {
            stats.dropped_duplicate += 1;
            continue;
        }
        if product.url != canonical_url {
            stats.rewritten_urls += 1;
        }
        products.push(ValidatedProduct {
            id: product.id,
            url: canonical_url.to_owned(),
        });
    }

    if products.len() > MAX_RECOMMENDATIONS {
        stats.truncated = products.len() - MAX_RECOMMENDATIONS;
        products.truncate(MAX_RECOMMENDATIONS);
    }

    let reply_text = strip_disallowed_links(&draft.reply_text, pool, &mut stats);

    debug!(
        products = products.len(),
        dropped_unknown = stats.dropped_unknown,
        stripped_links = stats.stripped_links,
        "reply validated"
    );

    ValidatedReply {
        reply_text,
        products,
        stats,
    }
}

/// Removes embedded links whose url is not exactly one of the allowed
/// canonical urls. Markdown links keep their link text; bare urls are cut
/// out entirely.
fn strip_disallowed_links(
    text: &str,
    pool: &CandidatePool,
    stats: &mut ValidationStats,
) -> String {
    let allowed = pool.allowed_urls();

    // Markdown links first so their urls are not re-matched as bare urls.
    let mut stripped = 0usize;
    let text = MARKDOWN_LINK.replace_all(text, |captures: &regex::Captures<'_>| {
        let label = &captures[1];
        let url = trim_trailing_punctuation(&captures[2]);
        if allowed.contains(url) {
            captures[0].to_owned()
        } else {
            stripped += 1;
            label.to_owned()
        }
    });

    let text = BARE_URL.replace_all(&text, |captures: &regex::Captures<'_>| {
        let matched = &captures[0];
        let url = trim_trailing_punctuation(matched);
        if allowed.contains(url) {
            matched.to_owned()
        } else {
            stripped += 1;
            // Keep any trailing punctuation that was never part of the url.
            matched[url.len()..].to_owned()
        }
    });

    stats.stripped_links += stripped;
    collapse_spaces(&text)
}

fn trim_trailing_punctuation(url: &str) -> &str {
    url.trim_end_matches(['.', ',', '!', '?', ';', ':'])
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut previous_space = false;
    for ch in text.chars() {
        if ch == ' ' {
            if previous_space {
                continue;
            }
            previous_space = true;
        } else {
            previous_space = false;
        }
        out.push(ch);
    }
    out.trim_end().to_owned()
}
