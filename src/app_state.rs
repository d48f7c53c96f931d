use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::agent::{ExtractionCall, ToolLoopAnalyst};
use crate::cache::{
    CacheStore, EmptyKnowledgeBase, KnowledgeBase, MemoryCacheStore, PgCacheStore,
    PgKnowledgeBase,
};
use crate::config::Config;
use crate::fetcher::{AddressPolicy, HttpFetcher};
use crate::llm::{AnthropicClient, LlmProvider};
use crate::pipeline::{AnalysisPipeline, PipelineSettings};
use crate::scrapers::ScraperSelector;
use crate::tools::{BraveSearchClient, WebTools};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<AnalysisPipeline>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config, pipeline: AnalysisPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            config: Arc::new(config),
        }
    }

    /// Wire the live components. Without a pool the cache is in-memory and
    /// the knowledge base is empty.
    pub fn from_config(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        let fetcher = HttpFetcher::with_policy(
            config.scrape_timeout(),
            AddressPolicy::allowing(config.fetch_allowed_hosts()),
        )
        .context("Failed to build page fetcher")?;

        let provider: Arc<dyn LlmProvider> = Arc::new(
            AnthropicClient::new(
                config.anthropic_api_key(),
                config.anthropic_base_url(),
                config.provider_timeout(),
            )
            .context("Failed to build provider client")?,
        );

        let search = match config.brave_api_key() {
            Some(key) => Some(
                BraveSearchClient::new(key, config.brave_search_url(), config.scrape_timeout())
                    .context("Failed to build search client")?,
            ),
            None => {
                warn!("BRAVE_API_KEY not set, web_search calls will return an error to the model");
                None
            }
        };
        let tools = Arc::new(WebTools::new(search, fetcher.clone()));

        let (cache, knowledge): (Arc<dyn CacheStore>, Arc<dyn KnowledgeBase>) = match pool {
            Some(pool) => {
                info!("Using Postgres cache store");
                (
                    Arc::new(PgCacheStore::new(pool.clone())),
                    Arc::new(PgKnowledgeBase::new(pool)),
                )
            }
            None => {
                warn!("DATABASE_URL not set, analyses are cached in memory only");
                (Arc::new(MemoryCacheStore::new()), Arc::new(EmptyKnowledgeBase))
            }
        };

        let pipeline = AnalysisPipeline::new(
            cache,
            Arc::new(ScraperSelector::with_default_scrapers(fetcher)),
            Arc::new(ExtractionCall::new(provider.clone(), config.anthropic_model())),
            Arc::new(ToolLoopAnalyst::new(
                provider,
                tools,
                config.anthropic_model(),
                config.max_tool_iterations(),
            )),
            knowledge,
            PipelineSettings::from(&config),
        );

        Ok(Self::new(config, pipeline))
    }

    /// State whose collaborators panic if used; for handler-level tests.
    #[cfg(test)]
    pub fn for_tests(config: Config) -> Self {
        use crate::agent::{MockHazardAnalyst, MockProductExtractor};
        use crate::cache::MockKnowledgeBase;
        use crate::scrapers::MockProductScraper;

        let pipeline = AnalysisPipeline::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(MockProductScraper::new()),
            Arc::new(MockProductExtractor::new()),
            Arc::new(MockHazardAnalyst::new()),
            Arc::new(MockKnowledgeBase::new()),
            PipelineSettings::from(&config),
        );
        Self::new(config, pipeline)
    }
}
