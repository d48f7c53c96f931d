use async_trait::async_trait;
use dashmap::DashMap;

use super::CacheStore;
use crate::analysis::ProductAnalysis;

/// Process-local cache used when no database is configured.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, ProductAnalysis>,
    searches: DashMap<String, u64>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Logged analyze requests for one URL hash.
    pub fn search_count(&self, url_hash: &str) -> u64 {
        self.searches.get(url_hash).map_or(0, |count| *count)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, url_hash: &str) -> Option<ProductAnalysis> {
        self.entries.get(url_hash).map(|entry| entry.value().clone())
    }

    async fn put(&self, url_hash: &str, analysis: &ProductAnalysis) -> bool {
        self.entries.insert(url_hash.to_string(), analysis.clone());
        true
    }

    async fn log_search(&self, _product_url: &str, url_hash: &str, _cached: bool) -> bool {
        *self.searches.entry(url_hash.to_string()).or_insert(0) += 1;
        true
    }

    async fn ping(&self) -> bool {
        true
    }
}
