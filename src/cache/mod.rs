//! Analysis cache keyed by URL hash, plus read-only knowledge-base lookups.
//!
//! Entries are permanent and last-write-wins. Read failures are reported as a
//! miss and write failures as `false`; neither stops a request. Every analyze
//! request is also appended to a search log under the same rule.

pub mod knowledge;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::analysis::ProductAnalysis;

pub use knowledge::{EmptyKnowledgeBase, KnowledgeBase, PgKnowledgeBase};
pub use memory::MemoryCacheStore;
pub use postgres::PgCacheStore;

#[cfg(test)]
pub use knowledge::MockKnowledgeBase;

/// Lowercase hex SHA-256 of the raw URL bytes. No normalization is applied.
pub fn url_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{digest:x}")
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, url_hash: &str) -> Option<ProductAnalysis>;

    /// Upsert; `false` when the write did not happen.
    async fn put(&self, url_hash: &str, analysis: &ProductAnalysis) -> bool;

    /// Record one analyze request; `false` when the row was not written.
    async fn log_search(&self, product_url: &str, url_hash: &str, cached: bool) -> bool;

    /// Backing store reachability, for the health endpoint.
    async fn ping(&self) -> bool;
}
