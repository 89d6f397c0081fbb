//! In-memory recommendation cache
//!
//! Process-local stand-in for the remote cache endpoint, selected with
//! `CACHE=memory`. Filled by this process's own successful runs.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CacheGateway, CacheRequest};
use crate::pipeline::error::GatewayResult;
use crate::pipeline::types::Recommendation;

pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Recommendation>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn key(request: &CacheRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.place.as_bytes());
        hasher.update(request.this_year.to_le_bytes());
        hasher.update(request.past_span.to_le_bytes());
        hasher.update(request.day_span.to_le_bytes());
        hex::encode(hasher.finalize())
    }

    pub async fn insert(&self, request: &CacheRequest, recommendation: Recommendation) {
        let mut entries = self.entries.write().await;
        entries.insert(Self::key(request), recommendation);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheGateway for MemoryCache {
    async fn lookup(&self, request: &CacheRequest) -> GatewayResult<Option<Recommendation>> {
        let entries = self.entries.read().await;
        let hit = entries.get(&Self::key(request)).cloned();
        if hit.is_some() {
            tracing::debug!("Cache hit for {} ({} days)", request.place, request.day_span);
        }
        Ok(hit)
    }

    async fn store(&self, request: &CacheRequest, recommendation: &Recommendation) -> GatewayResult<()> {
        self.insert(request, recommendation.clone()).await;
        Ok(())
    }
}
