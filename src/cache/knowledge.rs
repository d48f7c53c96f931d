use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::warn;

use crate::analysis::{AllergenReference, KnowledgeSnapshot, PfasReference};

/// Read-only allergen and PFAS reference data.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Up to `sample` rows of each table plus the table sizes. Never fails;
    /// lookup errors degrade to an empty snapshot.
    async fn snapshot(&self, sample: usize) -> KnowledgeSnapshot;
}

pub struct EmptyKnowledgeBase;

#[async_trait]
impl KnowledgeBase for EmptyKnowledgeBase {
    async fn snapshot(&self, _sample: usize) -> KnowledgeSnapshot {
        KnowledgeSnapshot::default()
    }
}

#[derive(Clone)]
pub struct PgKnowledgeBase {
    pool: PgPool,
}

impl PgKnowledgeBase {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn allergens(&self, sample: i64) -> Result<(Vec<AllergenReference>, usize), sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM allergens")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query("SELECT name, synonyms FROM allergens ORDER BY id LIMIT $1")
            .bind(sample)
            .fetch_all(&self.pool)
            .await?;

        let allergens = rows
            .iter()
            .map(|row| {
                Ok(AllergenReference {
                    name: row.try_get("name")?,
                    synonyms: row.try_get("synonyms")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok((allergens, total as usize))
    }

    async fn pfas(&self, sample: i64) -> Result<(Vec<PfasReference>, usize), sqlx::Error> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pfas_compounds")
            .fetch_one(&self.pool)
            .await?;
        let rows = sqlx::query(
            "SELECT name, cas_number, body_effects FROM pfas_compounds ORDER BY id LIMIT $1",
        )
        .bind(sample)
        .fetch_all(&self.pool)
        .await?;

        let compounds = rows
            .iter()
            .map(|row| {
                Ok(PfasReference {
                    name: row.try_get("name")?,
                    cas_number: row.try_get("cas_number")?,
                    body_effects: row.try_get("body_effects")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()?;
        Ok((compounds, total as usize))
    }
}

#[async_trait]
impl KnowledgeBase for PgKnowledgeBase {
    async fn snapshot(&self, sample: usize) -> KnowledgeSnapshot {
        let sample = i64::try_from(sample).unwrap_or(i64::MAX);
        let mut snapshot = KnowledgeSnapshot::default();

        match self.allergens(sample).await {
            Ok((allergens, total)) => {
                snapshot.allergens = allergens;
                snapshot.allergen_total = total;
            }
            Err(e) => warn!(error = %e, "Allergen lookup failed"),
        }
        match self.pfas(sample).await {
            Ok((pfas, total)) => {
                snapshot.pfas = pfas;
                snapshot.pfas_total = total;
            }
            Err(e) => warn!(error = %e, "PFAS lookup failed"),
        }

        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_knowledge_base() {
        assert!(EmptyKnowledgeBase.snapshot(10).await.is_empty());
    }

    #[tokio::test]
    async fn test_pg_snapshot_respects_sample_size() {
        let Ok(database_url) = std::env::var("TEST_DATABASE_URL") else {
            eprintln!("Skipping database tests: TEST_DATABASE_URL not set");
            return;
        };
        let pool = PgPool::connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        for name in ["Peanut", "Milk", "Soy"] {
            sqlx::query(
                "INSERT INTO allergens (name, synonyms) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING",
            )
            .bind(name)
            .bind(vec![name.to_lowercase()])
            .execute(&pool)
            .await
            .expect("Failed to seed allergen");
        }

        let snapshot = PgKnowledgeBase::new(pool).snapshot(2).await;
        assert_eq!(snapshot.allergens.len(), 2);
        assert!(snapshot.allergen_total >= 3);
    }
}
