//! Shared HTTP plumbing for the built-in adapter families
//!
//! Features:
//! - One direct client reused across attempts, proxy clients built per route
//! - Global rate limiting with governor
//! - Retry with exponential backoff for transient failures
//! - Proxy-leg failures reported as [`FetchError::Proxy`]

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client, Proxy,
};
use std::num::NonZeroU32;
use std::sync::Arc;

use super::Route;
use crate::config::HttpConfig;
use crate::utils::error::FetchError;
use crate::utils::retry::retry_transient;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// HTTP state shared by every adapter the provider creates
pub struct HttpContext {
    config: HttpConfig,
    direct: Client,
    rate_limiter: Arc<DirectRateLimiter>,
}

impl HttpContext {
    /// Build the shared context
    ///
    /// # Errors
    ///
    /// Returns `FetchError::Http` if the HTTP client cannot be created
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let direct = build_client(&config, None)?;

        let rate = NonZeroU32::new(config.rate_limit).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(rate)));

        Ok(Self {
            config,
            direct,
            rate_limiter,
        })
    }

    /// Create a fetcher bound to one route
    pub fn fetcher(&self, route: &Route) -> Result<HttpFetcher, FetchError> {
        let client = match route {
            Route::Direct => self.direct.clone(),
            Route::Proxy(endpoint) => build_client(&self.config, Some(endpoint))?,
        };

        Ok(HttpFetcher {
            client: Some(client),
            rate_limiter: Arc::clone(&self.rate_limiter),
            config: self.config.clone(),
            via_proxy: route.is_proxy(),
        })
    }
}

fn build_client(config: &HttpConfig, proxy: Option<&str>) -> Result<Client, FetchError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "application/rss+xml, application/atom+xml, application/json, text/html;q=0.9, */*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

    let mut builder = Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.request_timeout())
        .default_headers(headers)
        .gzip(true)
        .cookie_store(true);

    if let Some(endpoint) = proxy {
        let proxy = Proxy::all(endpoint).map_err(|e| FetchError::Proxy(e.to_string()))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// HTTP fetcher owned by a single adapter instance
pub struct HttpFetcher {
    client: Option<Client>,
    rate_limiter: Arc<DirectRateLimiter>,
    config: HttpConfig,
    via_proxy: bool,
}

impl HttpFetcher {
    /// GET a URL and return the body as text
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// GET a URL and return the raw body
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::other("HTTP fetcher already released"))?;

        reqwest::Url::parse(url).map_err(|_| FetchError::InvalidUrl(url.to_string()))?;

        retry_transient(&self.config.retry, url, || async move {
            self.rate_limiter.until_ready().await;
            self.request_once(client, url).await
        })
        .await
    }

    async fn request_once(&self, client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!(url = %url, via_proxy = self.via_proxy, "Fetching URL");

        let response = client.get(url).send().await.map_err(|e| self.classify(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| self.classify(e))?;
        Ok(body.to_vec())
    }

    /// Connection-level failures on a proxied route are proxy failures
    fn classify(&self, err: reqwest::Error) -> FetchError {
        if self.via_proxy && (err.is_connect() || err.is_timeout()) {
            FetchError::Proxy(err.to_string())
        } else {
            FetchError::Http(err)
        }
    }

    /// Drop the client and its connection pool
    pub fn release(&mut self) {
        self.client = None;
    }

    pub fn is_released(&self) -> bool {
        self.client.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> HttpConfig {
        HttpConfig {
            rate_limit: 100,
            retry: crate::utils::retry::RetryConfig::with_delays(2, 1, 5),
            ..HttpConfig::default()
        }
    }

    #[tokio::test]
    async fn test_get_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
            .mount(&server)
            .await;

        let ctx = HttpContext::new(test_config()).unwrap();
        let fetcher = ctx.fetcher(&Route::Direct).unwrap();
        let body = fetcher
            .get_text(&format!("{}/feed", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "hello");
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let ctx = HttpContext::new(test_config()).unwrap();
        let fetcher = ctx.fetcher(&Route::Direct).unwrap();
        let result = fetcher.get_text(&format!("{}/flaky", server.uri())).await;
        assert!(matches!(result, Err(FetchError::Status(503))));
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let ctx = HttpContext::new(test_config()).unwrap();
        let fetcher = ctx.fetcher(&Route::Direct).unwrap();
        let result = fetcher.get_text(&format!("{}/missing", server.uri())).await;
        assert!(matches!(result, Err(FetchError::Status(404))));
    }

    #[tokio::test]
    async fn test_released_fetcher_fails() {
        let ctx = HttpContext::new(test_config()).unwrap();
        let mut fetcher = ctx.fetcher(&Route::Direct).unwrap();
        fetcher.release();
        assert!(fetcher.is_released());
        assert!(fetcher.get_text("http://localhost/").await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let ctx = HttpContext::new(test_config()).unwrap();
        let fetcher = ctx.fetcher(&Route::Direct).unwrap();
        let result = fetcher.get_text("not a url").await;
        assert!(matches!(result, Err(FetchError::InvalidUrl(_))));
    }
}
