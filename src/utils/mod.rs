//! Text and link helpers shared by the adapters
//!
//! Feed bodies, JSON fields and scraped elements all go through the same
//! cleanup before they become [`Item`](crate::models::Item) fields.

pub mod error;
pub mod retry;

use regex::Regex;
use std::sync::OnceLock;
use url::Url;

/// Normalize whitespace in text
pub fn normalize_whitespace(text: &str) -> String {
    static WHITESPACE_RE: OnceLock<Regex> = OnceLock::new();

    let re = WHITESPACE_RE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    re.replace_all(text.trim(), " ").to_string()
}

/// Strip HTML tags, decode entities and collapse whitespace
pub fn clean_text(text: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();

    let re = TAG_RE.get_or_init(|| Regex::new(r"(?is)<[^>]+>").expect("Invalid regex pattern"));

    let stripped = re.replace_all(text, " ");
    let decoded = html_escape::decode_html_entities(&stripped);
    normalize_whitespace(&decoded)
}

/// Resolve a possibly relative link against the page it was found on
pub fn resolve_url(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    match Url::parse(href) {
        Ok(url) => Some(url.to_string()),
        Err(_) => Url::parse(base)
            .ok()
            .and_then(|b| b.join(href).ok())
            .map(|u| u.to_string()),
    }
}

/// Cut `text` to at most `max_len` characters, marking the cut with `...`
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_len.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
