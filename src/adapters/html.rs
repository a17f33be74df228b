//! HTML page adapter driven by CSS selectors

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};

use super::http::HttpFetcher;
use super::SourceAdapter;
use crate::models::Item;
use crate::utils::error::FetchError;
use crate::utils::{normalize_whitespace, resolve_url, truncate_text};

/// Maximum summary length kept from a page
const MAX_SUMMARY_CHARS: usize = 500;

/// Selector configuration for an HTML source
///
/// Every selector is evaluated relative to the element matched by
/// `item_selector`. Without `title_selector` the item's own text is the
/// title; without `link_selector` the item's own `href` is the link (or the
/// first `a[href]` inside it).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HtmlSpec {
    pub url: String,
    pub item_selector: String,
    #[serde(default)]
    pub title_selector: Option<String>,
    #[serde(default)]
    pub link_selector: Option<String>,
    #[serde(default)]
    pub summary_selector: Option<String>,
    #[serde(default)]
    pub image_selector: Option<String>,
}

/// Adapter for HTML list pages
pub struct HtmlAdapter {
    source_id: String,
    spec: HtmlSpec,
    http: HttpFetcher,
}

impl HtmlAdapter {
    pub fn new(source_id: &str, spec: HtmlSpec, http: HttpFetcher) -> Self {
        Self {
            source_id: source_id.to_string(),
            spec,
            http,
        }
    }
}

#[async_trait]
impl SourceAdapter for HtmlAdapter {
    async fn fetch(&mut self) -> Result<Vec<Item>, FetchError> {
        let body = self.http.get_text(&self.spec.url).await?;
        parse_html_items(&self.source_id, &self.spec, &body)
    }

    async fn close(&mut self) {
        self.http.release();
    }
}

fn selector(raw: &str) -> Result<Selector, FetchError> {
    Selector::parse(raw).map_err(|e| FetchError::parse(format!("invalid selector '{raw}': {e}")))
}

fn optional_selector(raw: Option<&String>) -> Result<Option<Selector>, FetchError> {
    raw.map(|s| selector(s)).transpose()
}

fn element_text(element: ElementRef<'_>) -> String {
    normalize_whitespace(&element.text().collect::<String>())
}

/// Extract items from an HTML document
pub fn parse_html_items(
    source_id: &str,
    spec: &HtmlSpec,
    html: &str,
) -> Result<Vec<Item>, FetchError> {
    let item_sel = selector(&spec.item_selector)?;
    let title_sel = optional_selector(spec.title_selector.as_ref())?;
    let link_sel = optional_selector(spec.link_selector.as_ref())?;
    let summary_sel = optional_selector(spec.summary_selector.as_ref())?;
    let image_sel = optional_selector(spec.image_selector.as_ref())?;
    let any_link = selector("a[href]")?;

    let document = Html::parse_document(html);
    let mut items = Vec::new();
    let mut skipped = 0usize;

    for element in document.select(&item_sel) {
        let title = match &title_sel {
            Some(sel) => element.select(sel).next().map(element_text),
            None => Some(element_text(element)),
        }
        .filter(|t| !t.is_empty());

        let href = match &link_sel {
            Some(sel) => element
                .select(sel)
                .next()
                .and_then(|a| a.value().attr("href")),
            None => element
                .value()
                .attr("href")
                .or_else(|| element.select(&any_link).next().and_then(|a| a.value().attr("href"))),
        };
        let link = href.and_then(|h| resolve_url(&spec.url, h));

        let (Some(title), Some(link)) = (title, link) else {
            skipped += 1;
            continue;
        };

        let summary = summary_sel
            .as_ref()
            .and_then(|sel| element.select(sel).next())
            .map(element_text)
            .map(|s| truncate_text(&s, MAX_SUMMARY_CHARS));

        let image = image_sel
            .as_ref()
            .and_then(|sel| element.select(sel).next())
            .and_then(|img| img.value().attr("src").or_else(|| img.value().attr("data-src")))
            .and_then(|src| resolve_url(&spec.url, src));

        items.push(
            Item::new(source_id, &link, title, link.clone())
                .with_summary(summary)
                .with_image_url(image),
        );
    }

    if skipped > 0 {
        tracing::debug!(source_id = %source_id, skipped, "Skipped HTML items without title or link");
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"
        <html><body>
          <ul class="list">
            <li class="entry">
              <a class="title" href="/story/1">  First   story </a>
              <p class="desc">Short &amp; sweet</p>
              <img src="/img/1.png">
            </li>
            <li class="entry">
              <a class="title" href="https://other.example.org/2">Second story</a>
            </li>
            <li class="entry"><span>no link here</span></li>
          </ul>
        </body></html>
    "#;

    fn spec() -> HtmlSpec {
        HtmlSpec {
            url: "https://example.com/news/".to_string(),
            item_selector: "li.entry".to_string(),
            title_selector: Some("a.title".to_string()),
            link_selector: Some("a.title".to_string()),
            summary_selector: Some("p.desc".to_string()),
            image_selector: Some("img".to_string()),
        }
    }

    #[test]
    fn test_parse_items_with_selectors() {
        let items = parse_html_items("site", &spec(), PAGE).unwrap();
        assert_eq!(items.len(), 2);

        assert_eq!(items[0].title, "First story");
        assert_eq!(items[0].url, "https://example.com/story/1");
        assert_eq!(items[0].summary.as_deref(), Some("Short & sweet"));
        assert_eq!(items[0].image_url.as_deref(), Some("https://example.com/img/1.png"));

        assert_eq!(items[1].url, "https://other.example.org/2");
        assert!(items[1].summary.is_none());
    }

    #[test]
    fn test_item_as_link() {
        let spec = HtmlSpec {
            url: "https://example.com/".to_string(),
            item_selector: "a.title".to_string(),
            title_selector: None,
            link_selector: None,
            summary_selector: None,
            image_selector: None,
        };
        let items = parse_html_items("site", &spec, PAGE).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "First story");
    }

    #[test]
    fn test_invalid_selector() {
        let mut spec = spec();
        spec.item_selector = "li[[".to_string();
        assert!(matches!(
            parse_html_items("site", &spec, PAGE),
            Err(FetchError::Parse(_))
        ));
    }

    #[test]
    fn test_stable_ids_across_fetches() {
        let first = parse_html_items("site", &spec(), PAGE).unwrap();
        let second = parse_html_items("site", &spec(), PAGE).unwrap();
        assert_eq!(first[0].id, second[0].id);
    }
}
