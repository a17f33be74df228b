//! JSON API adapter
//!
//! Items are located with a JSON pointer and mapped field by field. A field
//! name starting with `/` is itself a JSON pointer relative to the item, so
//! nested values such as `/author/name` can be mapped without code.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::http::HttpFetcher;
use super::SourceAdapter;
use crate::models::Item;
use crate::utils::error::FetchError;
use crate::utils::{clean_text, truncate_text};

const MAX_SUMMARY_CHARS: usize = 500;

fn default_id_field() -> String {
    "id".to_string()
}

fn default_title_field() -> String {
    "title".to_string()
}

fn default_url_field() -> String {
    "url".to_string()
}

/// Field mapping for a JSON source
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonSpec {
    pub url: String,

    /// Pointer to the item array; empty means the document root
    #[serde(default)]
    pub items_pointer: String,

    #[serde(default = "default_id_field")]
    pub id_field: String,

    #[serde(default = "default_title_field")]
    pub title_field: String,

    #[serde(default = "default_url_field")]
    pub url_field: String,

    #[serde(default)]
    pub published_field: Option<String>,

    #[serde(default)]
    pub summary_field: Option<String>,

    #[serde(default)]
    pub image_field: Option<String>,

    /// Prefix for relative item URLs (e.g. `https://site/item/` + id)
    #[serde(default)]
    pub url_prefix: Option<String>,
}

impl JsonSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            items_pointer: String::new(),
            id_field: default_id_field(),
            title_field: default_title_field(),
            url_field: default_url_field(),
            published_field: None,
            summary_field: None,
            image_field: None,
            url_prefix: None,
        }
    }

    fn mapped_fields(&self) -> Vec<&str> {
        let mut fields = vec![
            self.id_field.as_str(),
            self.title_field.as_str(),
            self.url_field.as_str(),
        ];
        fields.extend(
            [&self.published_field, &self.summary_field, &self.image_field]
                .into_iter()
                .flatten()
                .map(String::as_str),
        );
        fields
    }
}

/// Adapter for JSON endpoints
pub struct JsonAdapter {
    source_id: String,
    spec: JsonSpec,
    http: HttpFetcher,
}

impl JsonAdapter {
    pub fn new(source_id: &str, spec: JsonSpec, http: HttpFetcher) -> Self {
        Self {
            source_id: source_id.to_string(),
            spec,
            http,
        }
    }
}

#[async_trait]
impl SourceAdapter for JsonAdapter {
    async fn fetch(&mut self) -> Result<Vec<Item>, FetchError> {
        let body = self.http.get_bytes(&self.spec.url).await?;
        let document: Value = serde_json::from_slice(&body)
            .map_err(|e| FetchError::parse(format!("invalid JSON: {e}")))?;
        parse_json_items(&self.source_id, &self.spec, &document)
    }

    async fn close(&mut self) {
        self.http.release();
    }
}

fn lookup<'a>(item: &'a Value, field: &str) -> Option<&'a Value> {
    if field.starts_with('/') {
        item.pointer(field)
    } else {
        item.get(field)
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse RFC 3339, RFC 2822, or unix seconds/milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .or_else(|_| DateTime::parse_from_rfc2822(s))
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<i64>().ok().and_then(unix_timestamp)),
        Value::Number(n) => n.as_i64().and_then(unix_timestamp),
        _ => None,
    }
}

fn unix_timestamp(raw: i64) -> Option<DateTime<Utc>> {
    // Values this large are milliseconds
    if raw > 100_000_000_000 {
        Utc.timestamp_millis_opt(raw).single()
    } else {
        Utc.timestamp_opt(raw, 0).single()
    }
}

/// Map a JSON document to items
pub fn parse_json_items(
    source_id: &str,
    spec: &JsonSpec,
    document: &Value,
) -> Result<Vec<Item>, FetchError> {
    let list = if spec.items_pointer.is_empty() {
        Some(document)
    } else {
        document.pointer(&spec.items_pointer)
    };

    let Some(Value::Array(entries)) = list else {
        return Err(FetchError::parse(format!(
            "no item array at '{}'",
            spec.items_pointer
        )));
    };

    let mapped = spec.mapped_fields();
    let mut items = Vec::with_capacity(entries.len());

    for entry in entries {
        let title = lookup(entry, &spec.title_field)
            .and_then(scalar_string)
            .map(|t| clean_text(&t));
        let original_id = lookup(entry, &spec.id_field).and_then(scalar_string);
        let url = lookup(entry, &spec.url_field)
            .and_then(scalar_string)
            .or_else(|| {
                let prefix = spec.url_prefix.as_ref()?;
                original_id.as_ref().map(|id| format!("{prefix}{id}"))
            });

        let (Some(title), Some(url)) = (title, url) else {
            continue;
        };
        let original_id = original_id.unwrap_or_else(|| url.clone());

        let published_at = spec
            .published_field
            .as_ref()
            .and_then(|f| lookup(entry, f))
            .and_then(parse_timestamp);
        let summary = spec
            .summary_field
            .as_ref()
            .and_then(|f| lookup(entry, f))
            .and_then(scalar_string)
            .map(|s| truncate_text(&clean_text(&s), MAX_SUMMARY_CHARS));
        let image = spec
            .image_field
            .as_ref()
            .and_then(|f| lookup(entry, f))
            .and_then(scalar_string);

        let mut item = Item::new(source_id, &original_id, title, url)
            .with_published_at(published_at)
            .with_summary(summary)
            .with_image_url(image);

        if let Value::Object(fields) = entry {
            for (key, value) in fields {
                if mapped.contains(&key.as_str()) {
                    continue;
                }
                if let Some(text) = scalar_string(value) {
                    item.extra.insert(key.clone(), text);
                }
            }
        }

        items.push(item);
    }

    Ok(items)
}
