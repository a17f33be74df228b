//! Source adapter contract and adapter families
//!
//! The scheduler never knows how a source is fetched. It asks an
//! [`AdapterFactory`] for a fresh [`SourceAdapter`] per attempt, calls
//! `fetch()` once under a deadline, and always calls `close()` exactly once
//! afterwards through an [`AdapterGuard`].
//!
//! Built-in, configuration-driven families:
//!
//! - [`rss`] - RSS / Atom feeds
//! - [`json`] - JSON REST endpoints mapped by field names or JSON pointers
//! - [`html`] - HTML pages scraped with CSS selectors
//!
//! Anything else (browser automation, signed APIs, ...) is plugged in as a
//! named custom family through [`AdapterProvider::register`].
//!
//! # Example
//!
//! ```rust,ignore
//! let provider = AdapterProvider::new(HttpConfig::default())?
//!     .with_family("browser", Arc::new(BrowserFactory::new(driver_path)));
//! let adapter = provider.create(&source, &Route::Direct)?;
//! ```

pub mod html;
pub mod http;
pub mod json;
pub mod rss;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::HttpConfig;
use crate::models::{Item, SourceConfig};
use crate::utils::error::FetchError;

pub use html::{HtmlAdapter, HtmlSpec};
pub use http::HttpContext;
pub use json::{JsonAdapter, JsonSpec};
pub use rss::RssAdapter;

// ============================================================================
// Contract
// ============================================================================

/// A single fetch/parse strategy bound to one source
///
/// `close()` must be safe to call when `fetch()` never ran or failed, and
/// must release every external resource the adapter holds.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Fetch the current item list of the source
    async fn fetch(&mut self) -> Result<Vec<Item>, FetchError>;

    /// Release sockets, child processes and other resources
    async fn close(&mut self);
}

/// Builds adapters for sources
pub trait AdapterFactory: Send + Sync {
    /// Create a fresh adapter for one fetch attempt over the given route
    fn create(
        &self,
        source: &SourceConfig,
        route: &Route,
    ) -> Result<Box<dyn SourceAdapter>, FetchError>;
}

/// How an attempt reaches the upstream site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Plain outbound connection
    Direct,
    /// Through the given proxy endpoint
    Proxy(String),
}

impl Route {
    pub fn is_proxy(&self) -> bool {
        matches!(self, Self::Proxy(_))
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => write!(f, "direct"),
            Self::Proxy(endpoint) => write!(f, "proxy({endpoint})"),
        }
    }
}

// ============================================================================
// Adapter Spec
// ============================================================================

/// Adapter family and its settings, as found in the source registry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdapterSpec {
    /// RSS or Atom feed
    Rss { url: String },

    /// JSON API endpoint
    Json(JsonSpec),

    /// HTML page with CSS selectors
    Html(HtmlSpec),

    /// Externally provided family, looked up by name
    Custom {
        family: String,
        #[serde(default)]
        options: HashMap<String, String>,
    },
}

impl AdapterSpec {
    /// Family name used in logs and metrics
    pub fn family(&self) -> &str {
        match self {
            Self::Rss { .. } => "rss",
            Self::Json(_) => "json",
            Self::Html(_) => "html",
            Self::Custom { family, .. } => family,
        }
    }

    /// Upstream URL for the built-in families
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Rss { url } => Some(url),
            Self::Json(spec) => Some(&spec.url),
            Self::Html(spec) => Some(&spec.url),
            Self::Custom { .. } => None,
        }
    }
}

// ============================================================================
// Adapter Provider
// ============================================================================

/// Default [`AdapterFactory`]: built-in families plus named custom ones
pub struct AdapterProvider {
    http: Arc<HttpContext>,
    custom: HashMap<String, Arc<dyn AdapterFactory>>,
}

impl AdapterProvider {
    /// Create a provider for the built-in families
    pub fn new(http: HttpConfig) -> Result<Self, FetchError> {
        Ok(Self {
            http: Arc::new(HttpContext::new(http)?),
            custom: HashMap::new(),
        })
    }

    /// Register a custom family, replacing any previous one with that name
    pub fn register(&mut self, family: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        let family = family.into();
        tracing::debug!(family = %family, "Registered adapter family");
        self.custom.insert(family, factory);
    }

    /// Builder-style [`register`](Self::register)
    pub fn with_family(mut self, family: impl Into<String>, factory: Arc<dyn AdapterFactory>) -> Self {
        self.register(family, factory);
        self
    }

    /// Names of registered custom families
    pub fn families(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl AdapterFactory for AdapterProvider {
    fn create(
        &self,
        source: &SourceConfig,
        route: &Route,
    ) -> Result<Box<dyn SourceAdapter>, FetchError> {
        match &source.adapter {
            AdapterSpec::Rss { url } => {
                let fetcher = self.http.fetcher(route)?;
                Ok(Box::new(RssAdapter::new(&source.id, url, fetcher)))
            }
            AdapterSpec::Json(spec) => {
                let fetcher = self.http.fetcher(route)?;
                Ok(Box::new(JsonAdapter::new(&source.id, spec.clone(), fetcher)))
            }
            AdapterSpec::Html(spec) => {
                let fetcher = self.http.fetcher(route)?;
                Ok(Box::new(HtmlAdapter::new(&source.id, spec.clone(), fetcher)))
            }
            AdapterSpec::Custom { family, .. } => match self.custom.get(family) {
                Some(factory) => factory.create(source, route),
                None => Err(FetchError::UnsupportedAdapter(family.clone())),
            },
        }
    }
}

// ============================================================================
// Adapter Guard
// ============================================================================

/// Scoped ownership of an adapter with guaranteed release
///
/// `close()` runs exactly once: either explicitly through
/// [`AdapterGuard::close`], or from `Drop` when the owning future was
/// cancelled mid-fetch. The drop path spawns the close onto the current
/// tokio runtime.
pub struct AdapterGuard {
    adapter: Option<Box<dyn SourceAdapter>>,
    source_id: String,
}

impl AdapterGuard {
    pub fn new(source_id: &str, adapter: Box<dyn SourceAdapter>) -> Self {
        Self {
            adapter: Some(adapter),
            source_id: source_id.to_string(),
        }
    }

    /// Run the adapter's fetch
    pub async fn fetch(&mut self) -> Result<Vec<Item>, FetchError> {
        match self.adapter.as_mut() {
            Some(adapter) => adapter.fetch().await,
            None => Err(FetchError::other("adapter already closed")),
        }
    }

    /// Close the adapter; later calls are no-ops
    pub async fn close(&mut self) {
        if let Some(mut adapter) = self.adapter.take() {
            adapter.close().await;
            tracing::trace!(source_id = %self.source_id, "Adapter closed");
        }
    }
}

impl Drop for AdapterGuard {
    fn drop(&mut self) {
        let Some(mut adapter) = self.adapter.take() else {
            return;
        };

        let source_id = std::mem::take(&mut self.source_id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(source_id = %source_id, "Closing adapter of cancelled attempt");
                handle.spawn(async move {
                    adapter.close().await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    source_id = %source_id,
                    "No runtime available, adapter dropped without close"
                );
            }
        }
    }
}
