//! Proxy routing and fallback policy
//!
//! Sources flagged `need_proxy` are fetched through a proxy endpoint. When
//! the proxy leg fails and the source allows it (`proxy_fallback`), the
//! attempt is repeated once over a direct connection. Otherwise the proxy
//! error is returned as-is.
//!
//! Endpoint selection sits behind [`ProxyProvider`]; [`StaticProxy`] hands
//! out the single endpoint from configuration.

use std::future::Future;
use std::sync::Arc;

use crate::adapters::Route;
use crate::config::ProxyConfig;
use crate::metrics;
use crate::models::SourceConfig;
use crate::utils::error::FetchError;

/// Supplies proxy endpoints
pub trait ProxyProvider: Send + Sync {
    /// Endpoint to use for `source`, `None` if no proxy is available
    fn endpoint(&self, source: &SourceConfig) -> Option<String>;
}

/// One fixed endpoint for every source
#[derive(Debug, Clone, Default)]
pub struct StaticProxy {
    endpoint: Option<String>,
}

impl StaticProxy {
    pub fn new(endpoint: Option<String>) -> Self {
        Self { endpoint }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.endpoint.clone())
    }
}

impl ProxyProvider for StaticProxy {
    fn endpoint(&self, _source: &SourceConfig) -> Option<String> {
        self.endpoint.clone()
    }
}

/// Chooses the route of each attempt and applies direct fallback
#[derive(Clone)]
pub struct ProxyFallback {
    provider: Arc<dyn ProxyProvider>,
}

impl ProxyFallback {
    pub fn new(provider: Arc<dyn ProxyProvider>) -> Self {
        Self { provider }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(Arc::new(StaticProxy::from_config(config)))
    }

    /// Run `attempt` over the route(s) `source` calls for
    ///
    /// `attempt` is invoked at most twice: once over the proxy and, only if
    /// that fails and fallback is enabled, once directly.
    pub async fn execute<T, F, Fut>(&self, source: &SourceConfig, mut attempt: F) -> Result<T, FetchError>
    where
        F: FnMut(Route) -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        if !source.need_proxy {
            return attempt(Route::Direct).await;
        }

        let proxied = match self.provider.endpoint(source) {
            Some(endpoint) => attempt(Route::Proxy(endpoint)).await,
            None => Err(FetchError::ProxyUnavailable),
        };

        match proxied {
            Ok(value) => Ok(value),
            Err(e) if source.proxy_fallback => {
                tracing::warn!(
                    source_id = %source.id,
                    error = %e,
                    "Proxy attempt failed, retrying direct"
                );
                metrics::record_proxy_fallback();
                attempt(Route::Direct).await
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::AdapterSpec;
    use std::sync::Mutex;

    const ENDPOINT: &str = "http://10.0.0.1:3128";

    fn source(need_proxy: bool, fallback: bool) -> SourceConfig {
        let mut source = SourceConfig::new(
            "s",
            AdapterSpec::Rss {
                url: "https://example.com/feed".into(),
            },
        );
        source.need_proxy = need_proxy;
        source.proxy_fallback = fallback;
        source
    }

    /// Runs the policy with an attempt that fails on the proxy route if asked
    async fn run(
        policy: &ProxyFallback,
        source: &SourceConfig,
        proxy_fails: bool,
    ) -> (Result<&'static str, FetchError>, Vec<Route>) {
        let routes = Mutex::new(Vec::new());
        let result = policy
            .execute(source, |route| {
                routes.lock().unwrap().push(route.clone());
                async move {
                    match route {
                        Route::Proxy(_) if proxy_fails => Err(FetchError::Proxy("refused".into())),
                        Route::Proxy(_) => Ok("proxy"),
                        Route::Direct => Ok("direct"),
                    }
                }
            })
            .await;
        (result, routes.into_inner().unwrap())
    }

    #[tokio::test]
    async fn test_direct_when_proxy_not_needed() {
        let policy = ProxyFallback::new(Arc::new(StaticProxy::new(Some(ENDPOINT.into()))));
        let (result, routes) = run(&policy, &source(false, false), false).await;

        assert_eq!(result.unwrap(), "direct");
        assert_eq!(routes, vec![Route::Direct]);
    }

    #[tokio::test]
    async fn test_proxy_success_skips_direct() {
        let policy = ProxyFallback::new(Arc::new(StaticProxy::new(Some(ENDPOINT.into()))));
        let (result, routes) = run(&policy, &source(true, true), false).await;

        assert_eq!(result.unwrap(), "proxy");
        assert_eq!(routes, vec![Route::Proxy(ENDPOINT.into())]);
    }

    #[tokio::test]
    async fn test_fallback_after_proxy_failure() {
        let policy = ProxyFallback::new(Arc::new(StaticProxy::new(Some(ENDPOINT.into()))));
        let (result, routes) = run(&policy, &source(true, true), true).await;

        assert_eq!(result.unwrap(), "direct");
        assert_eq!(routes, vec![Route::Proxy(ENDPOINT.into()), Route::Direct]);
    }

    #[tokio::test]
    async fn test_proxy_error_surfaces_without_fallback() {
        let policy = ProxyFallback::new(Arc::new(StaticProxy::new(Some(ENDPOINT.into()))));
        let (result, routes) = run(&policy, &source(true, false), true).await;

        assert!(matches!(result, Err(FetchError::Proxy(msg)) if msg == "refused"));
        assert_eq!(routes.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_endpoint() {
        let policy = ProxyFallback::from_config(&ProxyConfig::default());

        let (result, routes) = run(&policy, &source(true, false), false).await;
        assert!(matches!(result, Err(FetchError::ProxyUnavailable)));
        assert!(routes.is_empty());

        let (result, routes) = run(&policy, &source(true, true), false).await;
        assert_eq!(result.unwrap(), "direct");
        assert_eq!(routes, vec![Route::Direct]);
    }
}
