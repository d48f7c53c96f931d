use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, error, warn};

use super::CacheStore;
use crate::analysis::ProductAnalysis;

/// Cache backed by the `product_analyses` table.
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn try_get(&self, url_hash: &str) -> Result<Option<ProductAnalysis>, sqlx::Error> {
        let row = sqlx::query("SELECT analysis FROM product_analyses WHERE product_url_hash = $1")
            .bind(url_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row.try_get::<Json<ProductAnalysis>, _>("analysis"))
            .transpose()
            .map(|analysis| analysis.map(|Json(analysis)| analysis))
    }

    async fn try_put(&self, url_hash: &str, analysis: &ProductAnalysis) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO product_analyses
                  (product_url_hash, product_url, product_name, harm_score, analysis, analyzed_at)
            VALUES ($1,               $2,          $3,           $4,         $5,       $6)
            ON CONFLICT (product_url_hash) DO UPDATE
              SET product_url  = EXCLUDED.product_url,
                  product_name = EXCLUDED.product_name,
                  harm_score   = EXCLUDED.harm_score,
                  analysis     = EXCLUDED.analysis,
                  analyzed_at  = EXCLUDED.analyzed_at,
                  updated_at   = now()
            "#,
        )
        .bind(url_hash)
        .bind(&analysis.product_url)
        .bind(&analysis.product_name)
        .bind(i16::from(analysis.harm_score))
        .bind(Json(analysis))
        .bind(analysis.analyzed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn try_log_search(
        &self,
        product_url: &str,
        url_hash: &str,
        cached: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO user_searches (product_url, product_url_hash, cached) VALUES ($1, $2, $3)",
        )
        .bind(product_url)
        .bind(url_hash)
        .bind(cached)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, url_hash: &str) -> Option<ProductAnalysis> {
        match self.try_get(url_hash).await {
            Ok(found) => found,
            Err(e) => {
                warn!(url_hash = %url_hash, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    async fn put(&self, url_hash: &str, analysis: &ProductAnalysis) -> bool {
        match self.try_put(url_hash, analysis).await {
            Ok(()) => {
                debug!(url_hash = %url_hash, "Cached analysis");
                true
            }
            Err(e) => {
                error!(url_hash = %url_hash, error = %e, "Cache write failed");
                false
            }
        }
    }

    async fn log_search(&self, product_url: &str, url_hash: &str, cached: bool) -> bool {
        match self.try_log_search(product_url, url_hash, cached).await {
            Ok(()) => true,
            Err(e) => {
                warn!(url_hash = %url_hash, error = %e, "Search log write failed");
                false
            }
        }
    }

    async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
