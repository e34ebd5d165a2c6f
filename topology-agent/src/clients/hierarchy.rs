//! Hierarchy REST client with optional redis response caching.
//!
//! Points at an internal DCIM/OSS service exposing
//! `GET /hierarchy/site/{name}` and `GET /hierarchy/circuit/{id}`.
//! Responses are cached under `hierarchy:<kind>:<key>` for the configured TTL;
//! cache faults degrade to a direct fetch.

use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::error::AgentError;

pub struct HierarchyClient {
    base_url: String,
    http: reqwest::Client,
    cache: Option<redis::aio::ConnectionManager>,
    cache_ttl_secs: u64,
}

impl HierarchyClient {
    pub fn new(
        base_url: impl Into<String>,
        cache: Option<redis::aio::ConnectionManager>,
        cache_ttl_secs: u64,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
            cache,
            cache_ttl_secs,
        }
    }

    /// Parent/child relations for one site.
    pub async fn site_hierarchy(&self, site: &str) -> Result<serde_json::Value, AgentError> {
        self.fetch("site", site).await
    }

    /// Parent/child relations for one circuit.
    pub async fn circuit_hierarchy(
        &self,
        circuit_id: &str,
    ) -> Result<serde_json::Value, AgentError> {
        self.fetch("circuit", circuit_id).await
    }

    async fn fetch(&self, kind: &str, key: &str) -> Result<serde_json::Value, AgentError> {
        let cache_key = format!("hierarchy:{}:{}", kind, key);

        if let Some(cache) = &self.cache {
            let mut conn = cache.clone();
            match conn.get::<_, Option<String>>(&cache_key).await {
                Ok(Some(cached)) => {
                    if let Ok(value) = serde_json::from_str(&cached) {
                        debug!(key = %cache_key, "hierarchy cache hit");
                        return Ok(value);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(error = %e, "hierarchy cache read failed"),
            }
        }

        let url = format!("{}/hierarchy/{}/{}", self.base_url, kind, key);
        let response = self.http.get(&url).send().await?;
        let response = response
            .error_for_status()
            .map_err(|e| AgentError::Http(format!("hierarchy API: {}", e)))?;
        let value: serde_json::Value = response.json().await?;

        if let Some(cache) = &self.cache {
            let mut conn = cache.clone();
            if let Ok(serialized) = serde_json::to_string(&value) {
                if let Err(e) = conn
                    .set_ex::<_, _, ()>(&cache_key, serialized, self.cache_ttl_secs)
                    .await
                {
                    warn!(error = %e, "hierarchy cache write failed");
                }
            }
        }

        Ok(value)
    }
}
