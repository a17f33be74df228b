//! Source registry and loaders
//!
//! The registry is the static half of every source: id, timing, priority,
//! proxy flags and adapter settings. It is built once from a
//! [`SourceLoader`] during scheduler initialization and never changes
//! afterwards; health and scheduling state live elsewhere.
//!
//! A sources file lists one `[[sources]]` table per source:
//!
//! ```toml
//! [[sources]]
//! id = "hn"
//! name = "Hacker News"
//! update_interval = 300
//! cache_ttl = 300
//! priority = 10
//!
//! [sources.adapter]
//! type = "rss"
//! url = "https://news.ycombinator.com/rss"
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{SourceConfig, MAX_UPDATE_INTERVAL_SECS};
use crate::scheduler::error::SchedulerError;

// ============================================================================
// Loaders
// ============================================================================

/// Produces the static source list
#[async_trait]
pub trait SourceLoader: Send + Sync {
    async fn load(&self) -> Result<Vec<SourceConfig>>;
}

#[derive(Debug, Deserialize)]
struct SourcesFile {
    #[serde(default)]
    sources: Vec<SourceConfig>,
}

/// Reads sources from a TOML file
#[derive(Debug, Clone)]
pub struct FileSourceLoader {
    path: PathBuf,
}

impl FileSourceLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parse a sources document
    pub fn parse(content: &str) -> Result<Vec<SourceConfig>> {
        let file: SourcesFile = toml::from_str(content).context("Failed to parse sources TOML")?;
        Ok(file.sources)
    }
}

#[async_trait]
impl SourceLoader for FileSourceLoader {
    async fn load(&self) -> Result<Vec<SourceConfig>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read sources file: {}", self.path.display()))?;

        let sources = Self::parse(&content)
            .with_context(|| format!("Invalid sources file: {}", self.path.display()))?;

        tracing::info!(
            path = %self.path.display(),
            count = sources.len(),
            "Loaded source definitions"
        );

        Ok(sources)
    }
}

/// Fixed in-memory source list
#[derive(Debug, Clone, Default)]
pub struct StaticSourceLoader {
    sources: Vec<SourceConfig>,
}

impl StaticSourceLoader {
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl SourceLoader for StaticSourceLoader {
    async fn load(&self) -> Result<Vec<SourceConfig>> {
        Ok(self.sources.clone())
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable set of sources, iterated in dispatch order
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: HashMap<String, Arc<SourceConfig>>,
    /// Ids by priority (desc), then id
    order: Vec<String>,
}

impl SourceRegistry {
    /// Build a registry, rejecting empty or duplicate ids and out-of-range intervals
    pub fn new(sources: Vec<SourceConfig>) -> Result<Self, SchedulerError> {
        let mut map = HashMap::with_capacity(sources.len());

        for source in sources {
            if source.id.trim().is_empty() {
                return Err(SchedulerError::registry("source with empty id"));
            }
            if source.update_interval == 0 || source.update_interval > MAX_UPDATE_INTERVAL_SECS {
                return Err(SchedulerError::registry(format!(
                    "source '{}' has update_interval {} (expected 1..={})",
                    source.id, source.update_interval, MAX_UPDATE_INTERVAL_SECS
                )));
            }
            if map.contains_key(&source.id) {
                return Err(SchedulerError::registry(format!(
                    "duplicate source id '{}'",
                    source.id
                )));
            }
            map.insert(source.id.clone(), Arc::new(source));
        }

        let mut ordered: Vec<&Arc<SourceConfig>> = map.values().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id)));
        let order = ordered.into_iter().map(|s| s.id.clone()).collect();

        Ok(Self {
            sources: map,
            order,
        })
    }

    /// Build a registry from a loader
    pub async fn load(loader: &dyn SourceLoader) -> Result<Self, SchedulerError> {
        let sources = loader
            .load()
            .await
            .map_err(|e| SchedulerError::registry(format!("{e:#}")))?;
        Self::new(sources)
    }

    pub fn get(&self, id: &str) -> Option<&Arc<SourceConfig>> {
        self.sources.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    /// All sources in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<SourceConfig>> {
        self.order.iter().filter_map(|id| self.sources.get(id))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
