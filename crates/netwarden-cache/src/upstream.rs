use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use netwarden_core::config::UpstreamConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::error::{CacheError, Result};
use crate::key::{resource_root, CacheKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Idempotent reads are the only cacheable calls.
    pub fn is_read(&self) -> bool {
        matches!(self, Method::Get)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(m: Method) -> Self {
        match m {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A monitoring backend that answers JSON.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn call(&self, endpoint: &str, method: Method, payload: Option<&Value>) -> Result<Value>;
}

/// Read-through cache in front of an [`Upstream`].
///
/// Every call, cached or not, is bounded by `timeout`.
pub struct CachedUpstream<U> {
    inner: U,
    cache: ResponseCache,
    timeout: Duration,
}

impl<U: Upstream> CachedUpstream<U> {
    pub fn new(inner: U, cache: ResponseCache, timeout: Duration) -> Self {
        Self {
            inner,
            cache,
            timeout,
        }
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Call the backend, serving reads from the cache when `use_cache` is set.
    ///
    /// A successful write invalidates cached reads under the endpoint's
    /// resource root. Failed calls are never cached.
    pub async fn call(
        &self,
        endpoint: &str,
        method: Method,
        payload: Option<&Value>,
        use_cache: bool,
    ) -> Result<Value> {
        if method.is_read() && use_cache && self.cache.is_enabled() {
            let key = CacheKey::for_call(method, endpoint);
            if let Some(hit) = self.cache.get(&key)? {
                debug!(endpoint, "cache hit");
                return Ok(hit);
            }
            debug!(endpoint, "cache miss");
            let value = self.call_inner(endpoint, method, payload).await?;
            if let Err(e) = self.cache.put(&key, &value, self.cache.default_ttl()) {
                warn!(endpoint, error = %e, "failed to cache upstream response");
            }
            return Ok(value);
        }

        let value = self.call_inner(endpoint, method, payload).await?;
        if !method.is_read() {
            self.cache.invalidate_prefix(resource_root(endpoint))?;
        }
        Ok(value)
    }

    async fn call_inner(
        &self,
        endpoint: &str,
        method: Method,
        payload: Option<&Value>,
    ) -> Result<Value> {
        tokio::time::timeout(self.timeout, self.inner.call(endpoint, method, payload))
            .await
            .map_err(|_| CacheError::Timeout {
                secs: self.timeout.as_secs(),
            })?
    }
}

/// LibreNMS-style REST client authenticating with `X-Auth-Token`.
pub struct HttpUpstream {
    client: reqwest::Client,
    base_url: String,
    token: String,
    timeout_secs: u64,
}

impl HttpUpstream {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(concat!("netwarden/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Upstream for HttpUpstream {
    async fn call(&self, endpoint: &str, method: Method, payload: Option<&Value>) -> Result<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let started = Instant::now();

        let mut req = self
            .client
            .request(method.into(), &url)
            .header("X-Auth-Token", &self.token)
            .header("Accept", "application/json");
        if let Some(body) = payload {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                CacheError::Timeout {
                    secs: self.timeout_secs,
                }
            } else {
                CacheError::Http(e)
            }
        })?;

        let status = resp.status().as_u16();
        debug!(
            %method,
            endpoint,
            status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "upstream call"
        );
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, endpoint, body = %text, "upstream API error");
            return Err(CacheError::Api {
                status,
                message: text,
            });
        }

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| CacheError::Parse(e.to_string()))
    }
}
