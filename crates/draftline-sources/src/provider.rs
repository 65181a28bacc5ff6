//! Shared request plumbing for provider clients.
//!
//! Every provider funnels its HTTP calls through [`ProviderCore`]:
//! response cache first, then rate-limit admission, then auth headers,
//! then the transport. The cache is keyed by a hash of the url and
//! query, so an identical call inside the TTL never reaches the wire
//! and never consumes a rate-limit slot.

use std::sync::Arc;
use std::time::Duration;

use draftline_core::cache::{TtlCache, TtlCacheConfig};
use draftline_core::error::AppError;
use draftline_core::models::SourceConfig;
use draftline_core::rate_limit::RateLimiter;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::auth::AuthProvider;
use crate::transport::{Transport, TransportRequest};

/// Default TTL for provider responses.
const RESPONSE_TTL: Duration = Duration::from_secs(300);
const RESPONSE_CACHE_CAPACITY: usize = 64;

/// SHA-256 over the url, rendered query, and content-shaping request
/// headers, as 64-char hex.
pub fn cache_key(url: &str, query: &[(String, String)], headers: &[(String, String)]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    for (name, value) in query.iter().chain(headers) {
        hasher.update(b"&");
        hasher.update(name.as_bytes());
        hasher.update(b"=");
        hasher.update(value.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

pub struct ProviderCore {
    name: String,
    base_url: String,
    limiter: RateLimiter,
    cache: TtlCache<String, String>,
    transport: Arc<dyn Transport>,
    auth: Arc<dyn AuthProvider>,
}

impl ProviderCore {
    pub fn new(
        config: &SourceConfig,
        transport: Arc<dyn Transport>,
        auth: Arc<dyn AuthProvider>,
    ) -> Self {
        Self {
            name: config.name.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            limiter: RateLimiter::new(config.name.clone(), config.rate_limit),
            cache: TtlCache::new(TtlCacheConfig {
                capacity: RESPONSE_CACHE_CAPACITY,
                default_ttl: RESPONSE_TTL,
            }),
            transport,
            auth,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute url for a provider path.
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn authenticate(&self) -> Result<(), AppError> {
        self.auth.refresh().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth.is_authenticated()
    }

    /// GET with the default response TTL.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        self.request_json(path, query, &[], None).await
    }

    /// GET with an explicit response TTL.
    pub async fn get_json_with_ttl<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<T, AppError> {
        self.request_json(path, query, &[], ttl).await
    }

    /// Full request form: extra headers shape the response on some
    /// providers, so they are part of the cache key.
    ///
    /// The body is cached only after it parses, so a malformed payload
    /// is never served from cache on the next call.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        extra_headers: &[(&str, String)],
        ttl: Option<Duration>,
    ) -> Result<T, AppError> {
        let url = self.url(path);
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        let extra: Vec<(String, String)> = extra_headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
        let key = cache_key(&url, &query, &extra);

        if let Some(body) = self.cache.get(&key) {
            debug!(source = %self.name, %url, "provider cache hit");
            return Ok(serde_json::from_str(&body)?);
        }

        self.limiter.acquire().await;
        let mut headers = self.auth.headers().await?;
        headers.extend(extra);
        let request = TransportRequest::get(&self.name, url)
            .with_query(query)
            .with_headers(headers);
        let response = self.transport.execute(request).await?;

        let value: T = serde_json::from_str(&response.body)?;
        self.cache.set(key, response.body, ttl);
        Ok(value)
    }
}
