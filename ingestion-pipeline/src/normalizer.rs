use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

/// Options for [`normalize`]. Defaults match the comment profile.
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub remove_emojis: bool,
    pub clean_urls: bool,
    pub max_length: Option<usize>,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            remove_emojis: true,
            clean_urls: true,
            max_length: None,
        }
    }
}

static HTML_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"</?[a-zA-Z][^>]*>").expect("static regex compiles"));
static URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s<>"']+"#).expect("static regex compiles"));
static SPACES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[ \t\x0B\x0C]+").expect("static regex compiles"));
static NEWLINE_PADDING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" *\n *").expect("static regex compiles"));
static NEWLINE_RUNS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("static regex compiles"));

/// Canonicalizes raw text ahead of chunking. Deterministic and idempotent:
/// `normalize(normalize(x)) == normalize(x)` for any input and option set.
pub fn normalize(text: &str, opts: &NormalizeOptions) -> String {
    let mut text: String = text.nfc().collect();

    text = strip_markup(&text);
    text = canonicalize_punctuation(&text);
    text = remove_zero_width(&text);

    if opts.clean_urls {
        text = clean_urls(&text);
    }
    if opts.remove_emojis {
        text = remove_emojis(&text);
    }

    text = collapse_whitespace(&text);

    if let Some(max_length) = opts.max_length {
        text = truncate_chars(&text, max_length);
    }

    text
}

/// Strips tags and decodes entities until stable, so decoded entities that
/// reveal further markup are handled within one call.
fn strip_markup(text: &str) -> String {
    let mut current = text.to_owned();
    for _ in 0..4 {
        let stripped = HTML_TAG.replace_all(&current, "").into_owned();
        let decoded = decode_entities(&stripped);
        if decoded == current {
            break;
        }
        current = decoded;
    }
    current
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

fn canonicalize_punctuation(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{2032}' => out.push('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{2033}' => out.push('"'),
            '\u{2026}' => out.push_str("..."),
            _ => out.push(ch),
        }
    }
    out
}

fn remove_zero_width(text: &str) -> String {
    text.chars()
        .filter(|ch| !matches!(ch, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}'))
        .collect()
}

/// Drops tracking parameters from http(s) URLs, leaving the rest of the URL
/// untouched.
fn clean_urls(text: &str) -> String {
    URL.replace_all(text, |captures: &regex::Captures<'_>| {
        clean_tracking_params(&captures[0])
    })
    .into_owned()
}

fn clean_tracking_params(url: &str) -> String {
    let Some((base, rest)) = url.split_once('?') else {
        return url.to_owned();
    };

    let (query, fragment) = match rest.split_once('#') {
        Some((query, fragment)) => (query, Some(fragment)),
        None => (rest, None),
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|param| !param.is_empty() && !is_tracking_param(param))
        .collect();

    let mut cleaned = base.to_owned();
    if !kept.is_empty() {
        cleaned.push('?');
        cleaned.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        cleaned.push('#');
        cleaned.push_str(fragment);
    }
    cleaned
}

fn is_tracking_param(param: &str) -> bool {
    let key = param.split('=').next().unwrap_or(param);
    key.starts_with("utm_") || matches!(key, "fbclid" | "gclid" | "si")
}

fn remove_emojis(text: &str) -> String {
    text.chars().filter(|ch| !is_emoji(*ch)).collect()
}

fn is_emoji(ch: char) -> bool {
    matches!(u32::from(ch),
        0x1F000..=0x1F02F // mahjong / dominoes
        | 0x1F0A0..=0x1F0FF // playing cards
        | 0x1F300..=0x1F5FF // symbols and pictographs
        | 0x1F600..=0x1F64F // emoticons
        | 0x1F680..=0x1F6FF // transport
        | 0x1F700..=0x1F77F
        | 0x1F900..=0x1F9FF // supplemental symbols
        | 0x1FA00..=0x1FAFF
        | 0x1F1E6..=0x1F1FF // regional indicators
        | 0x1F3FB..=0x1F3FF // skin tone modifiers
        | 0x2600..=0x26FF // miscellaneous symbols
        | 0x2700..=0x27BF // dingbats
        | 0xFE0E..=0xFE0F // variation selectors
        | 0x2B50..=0x2B55
    )
}

fn collapse_whitespace(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let text = SPACES.replace_all(&text, " ");
    let text = NEWLINE_PADDING.replace_all(&text, "\n");
    let text = NEWLINE_RUNS.replace_all(&text, "\n\n");
    text.trim().to_owned()
}

/// Char-boundary truncation preferring the last whitespace inside the
/// window.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }

    let mut end = text
        .char_indices()
        .nth(max_chars)
        .map_or(text.len(), |(index, _)| index);
    if let Some(whitespace) = text[..end].rfind(char::is_whitespace) {
        if whitespace > 0 {
            end = whitespace;
        }
    }
    text[..end].trim_end().to_owned()
}
