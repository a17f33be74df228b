//! RSS / Atom feed adapter

use async_trait::async_trait;
use feed_rs::model::Entry;

use super::http::HttpFetcher;
use super::SourceAdapter;
use crate::models::Item;
use crate::utils::error::FetchError;
use crate::utils::{clean_text, truncate_text};

const MAX_SUMMARY_CHARS: usize = 500;

/// Adapter for RSS 0.9x/2.0, Atom and JSON Feed documents
pub struct RssAdapter {
    source_id: String,
    url: String,
    http: HttpFetcher,
}

impl RssAdapter {
    pub fn new(source_id: &str, url: &str, http: HttpFetcher) -> Self {
        Self {
            source_id: source_id.to_string(),
            url: url.to_string(),
            http,
        }
    }
}

#[async_trait]
impl SourceAdapter for RssAdapter {
    async fn fetch(&mut self) -> Result<Vec<Item>, FetchError> {
        let body = self.http.get_bytes(&self.url).await?;
        parse_feed(&self.source_id, &body)
    }

    async fn close(&mut self) {
        self.http.release();
    }
}

/// Parse a feed document into items
pub fn parse_feed(source_id: &str, body: &[u8]) -> Result<Vec<Item>, FetchError> {
    let feed = feed_rs::parser::parse(body)
        .map_err(|e| FetchError::parse(format!("invalid feed: {e}")))?;

    Ok(feed
        .entries
        .into_iter()
        .filter_map(|entry| entry_to_item(source_id, entry))
        .collect())
}

fn entry_to_item(source_id: &str, entry: Entry) -> Option<Item> {
    let url = entry.links.first().map(|l| l.href.clone())?;
    let title = entry
        .title
        .as_ref()
        .map(|t| clean_text(&t.content))
        .filter(|t| !t.is_empty())?;

    let original_id = if entry.id.is_empty() {
        url.clone()
    } else {
        entry.id.clone()
    };

    let summary = entry
        .summary
        .as_ref()
        .map(|s| truncate_text(&clean_text(&s.content), MAX_SUMMARY_CHARS));
    let content = entry.content.as_ref().and_then(|c| c.body.clone());
    let image = entry
        .media
        .iter()
        .flat_map(|m| m.thumbnails.iter())
        .map(|t| t.image.uri.clone())
        .next();

    let mut item = Item::new(source_id, &original_id, title, url)
        .with_published_at(entry.published.or(entry.updated))
        .with_summary(summary)
        .with_content(content)
        .with_image_url(image);

    if let Some(author) = entry.authors.first() {
        item = item.with_extra("author", author.name.clone());
    }
    if !entry.categories.is_empty() {
        let categories: Vec<&str> = entry.categories.iter().map(|c| c.term.as_str()).collect();
        item = item.with_extra("categories", categories.join(","));
    }

    Some(item)
}
