//! Pipeline orchestrator: cache lookup, scrape, confidence gate, extraction,
//! analysis, scoring and persistence for one product URL.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::agent::{
    AnalysisContext, AnalysisError, AnalysisSubject, ExtractionError, HazardAnalyst,
    ProductExtractor,
};
use crate::analysis::{AnalysisRequest, ExtractedProduct, HazardReport, ProductAnalysis};
use crate::cache::{CacheStore, KnowledgeBase, url_hash};
use crate::config::Config;
use crate::scoring;
use crate::scrapers::ProductScraper;

/// Reference rows of each knowledge-base table embedded in the analysis prompt.
pub const KNOWLEDGE_SAMPLE: usize = 10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutcome {
    pub analysis: ProductAnalysis,
    pub cached: bool,
    /// Seconds since the cached analysis was produced; `None` for fresh results.
    pub cache_age_seconds: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Scrapes must score strictly above this to take the extraction path.
    pub confidence_threshold: f64,
    /// Share one run between concurrent requests for the same URL hash.
    pub dedupe_inflight: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.3,
            dedupe_inflight: false,
        }
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold(),
            dedupe_inflight: config.dedupe_inflight(),
        }
    }
}

type InflightRun = Arc<OnceCell<Result<AnalysisOutcome, PipelineError>>>;

pub struct AnalysisPipeline {
    cache: Arc<dyn CacheStore>,
    scraper: Arc<dyn ProductScraper>,
    extractor: Arc<dyn ProductExtractor>,
    analyst: Arc<dyn HazardAnalyst>,
    knowledge: Arc<dyn KnowledgeBase>,
    settings: PipelineSettings,
    inflight: DashMap<String, InflightRun>,
}

impl AnalysisPipeline {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        scraper: Arc<dyn ProductScraper>,
        extractor: Arc<dyn ProductExtractor>,
        analyst: Arc<dyn HazardAnalyst>,
        knowledge: Arc<dyn KnowledgeBase>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            cache,
            scraper,
            extractor,
            analyst,
            knowledge,
            settings,
            inflight: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    #[instrument(skip_all, fields(url = %request.product_url, force_refresh = request.force_refresh))]
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome, PipelineError> {
        request.validate().map_err(PipelineError::InvalidRequest)?;
        let hash = url_hash(&request.product_url);

        let outcome = match self.cached(request, &hash).await {
            Some(hit) => hit,
            None if self.settings.dedupe_inflight => self.run_single_flight(request, &hash).await?,
            None => self.run_fresh(request, &hash).await?,
        };

        if !self
            .cache
            .log_search(&request.product_url, &hash, outcome.cached)
            .await
        {
            warn!(url_hash = %hash, "Search not logged");
        }
        Ok(outcome)
    }

    async fn cached(&self, request: &AnalysisRequest, hash: &str) -> Option<AnalysisOutcome> {
        if request.force_refresh {
            return None;
        }
        let analysis = self.cache.get(hash).await?;
        let age = (Utc::now() - analysis.analyzed_at).num_seconds().max(0);
        info!(url_hash = %hash, age_seconds = age, "Cache hit");
        Some(AnalysisOutcome {
            analysis,
            cached: true,
            cache_age_seconds: Some(age),
        })
    }

    /// Concurrent callers for one hash await the first caller's run.
    async fn run_single_flight(
        &self,
        request: &AnalysisRequest,
        hash: &str,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let cell = self
            .inflight
            .entry(hash.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let outcome = cell
            .get_or_init(|| self.run_fresh(request, hash))
            .await
            .clone();

        self.inflight
            .remove_if(hash, |_, running| Arc::ptr_eq(running, &cell));
        outcome
    }

    async fn run_fresh(
        &self,
        request: &AnalysisRequest,
        hash: &str,
    ) -> Result<AnalysisOutcome, PipelineError> {
        let url = request.product_url.as_str();
        let scraped = self.scraper.try_scrape(url).await;
        let retailer = scraped.as_ref().map(|s| s.retailer.clone());

        let (subject, extracted) = match scraped {
            Some(scraped) if scraped.confidence > self.settings.confidence_threshold => {
                info!(confidence = scraped.confidence, "Taking extraction path");
                let product = self.extractor.extract(&scraped).await?;
                let subject = AnalysisSubject::Extracted {
                    url: url.to_string(),
                    product: product.clone(),
                };
                (subject, Some(product))
            }
            scraped => {
                info!(
                    confidence = scraped.as_ref().map(|s| s.confidence),
                    "Taking fallback path"
                );
                (AnalysisSubject::Url(url.to_string()), None)
            }
        };

        let context = AnalysisContext {
            allergen_profile: request.allergen_profile.clone(),
            knowledge: self.knowledge.snapshot(KNOWLEDGE_SAMPLE).await,
        };
        let report = self.analyst.analyze(&subject, &context).await?;

        let analysis = assemble(url, hash, retailer, extracted, report);
        info!(
            url_hash = %hash,
            harm_score = analysis.harm_score,
            risk_level = %analysis.risk_level,
            "Analysis scored"
        );

        if !self.cache.put(hash, &analysis).await {
            warn!(url_hash = %hash, "Analysis not cached, returning it anyway");
        }

        Ok(AnalysisOutcome {
            analysis,
            cached: false,
            cache_age_seconds: None,
        })
    }
}

/// Merge the hazard report with the extracted record and score it. Report
/// fields win; the extracted record fills gaps.
fn assemble(
    url: &str,
    hash: &str,
    retailer: Option<String>,
    extracted: Option<ExtractedProduct>,
    report: HazardReport,
) -> ProductAnalysis {
    let extracted = extracted.unwrap_or_default();
    let category = non_blank(report.product_category.clone()).or(non_blank(extracted.category));
    let score = scoring::calculate(&report, category.as_deref());

    let ingredients = if report.ingredients.is_empty() {
        extracted.ingredients
    } else {
        report.ingredients
    };

    ProductAnalysis {
        product_url: url.to_string(),
        url_hash: hash.to_string(),
        product_name: non_blank(report.product_name).unwrap_or(extracted.product_name),
        brand: non_blank(report.brand).unwrap_or(extracted.brand),
        retailer,
        category,
        ingredients,
        allergens_detected: report.allergens_detected,
        pfas_detected: report.pfas_detected,
        other_concerns: report.other_concerns,
        harm_score: score.harm,
        overall_score: score.safety,
        risk_level: score.risk_level(),
        confidence: report.confidence,
        analyzed_at: Utc::now(),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{MockHazardAnalyst, MockProductExtractor};
    use crate::analysis::{DetectedAllergen, DetectedPfas, ScrapedProduct, Severity};
    use crate::cache::{MemoryCacheStore, MockCacheStore, MockKnowledgeBase};
    use crate::llm::LlmError;
    use crate::scoring::RiskLevel;
    use crate::scrapers::MockProductScraper;
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const URL: &str = "https://www.amazon.com/dp/B000TEST";

    fn scraped(confidence: f64) -> ScrapedProduct {
        ScrapedProduct {
            url: URL.into(),
            retailer: "Amazon.com".into(),
            raw_text: "Title: Frying Pan".into(),
            confidence,
            scraper: "amazon",
        }
    }

    fn pfas_report() -> HazardReport {
        HazardReport {
            product_name: Some("Frying Pan".into()),
            brand: Some("Acme".into()),
            product_category: Some("organic food spray".into()),
            ingredients: vec![],
            allergens_detected: vec![],
            pfas_detected: vec![DetectedPfas {
                name: "PTFE".into(),
                cas_number: Some("9002-84-0".into()),
                body_effects: "persistent".into(),
                source: "coating".into(),
            }],
            other_concerns: vec![],
            confidence: 0.8,
        }
    }

    fn quiet_knowledge() -> Arc<MockKnowledgeBase> {
        let mut knowledge = MockKnowledgeBase::new();
        knowledge
            .expect_snapshot()
            .returning(|_| Default::default());
        Arc::new(knowledge)
    }

    fn pipeline(
        cache: Arc<dyn CacheStore>,
        scraper: MockProductScraper,
        extractor: MockProductExtractor,
        analyst: MockHazardAnalyst,
    ) -> AnalysisPipeline {
        AnalysisPipeline::new(
            cache,
            Arc::new(scraper),
            Arc::new(extractor),
            Arc::new(analyst),
            quiet_knowledge(),
            PipelineSettings::default(),
        )
    }

    fn cached_analysis() -> ProductAnalysis {
        ProductAnalysis {
            product_url: URL.into(),
            url_hash: url_hash(URL),
            product_name: "Frying Pan".into(),
            brand: "Acme".into(),
            retailer: Some("Amazon.com".into()),
            category: None,
            ingredients: vec![],
            allergens_detected: vec![],
            pfas_detected: vec![],
            other_concerns: vec![],
            harm_score: 40,
            overall_score: 60,
            risk_level: RiskLevel::LowRisk,
            confidence: 0.9,
            analyzed_at: Utc::now() - TimeDelta::seconds(120),
        }
    }

    #[tokio::test]
    async fn cache_hit_short_circuits() {
        let stored = cached_analysis();
        let returned = stored.clone();
        let mut cache = MockCacheStore::new();
        cache
            .expect_get()
            .withf(|hash| hash == url_hash(URL))
            .times(1)
            .returning(move |_| Some(returned.clone()));
        cache.expect_put().never();
        cache
            .expect_log_search()
            .withf(|url, hash, cached| url == URL && hash == url_hash(URL) && *cached)
            .times(1)
            .returning(|_, _, _| true);

        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().never();
        let mut extractor = MockProductExtractor::new();
        extractor.expect_extract().never();
        let mut analyst = MockHazardAnalyst::new();
        analyst.expect_analyze().never();

        let outcome = pipeline(Arc::new(cache), scraper, extractor, analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap();

        assert!(outcome.cached);
        assert_eq!(outcome.analysis, stored);
        assert!(outcome.cache_age_seconds.unwrap() >= 120);
    }

    #[tokio::test]
    async fn confident_scrape_takes_extraction_path() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mut scraper = MockProductScraper::new();
        scraper
            .expect_try_scrape()
            .times(1)
            .returning(|_| Some(scraped(1.0)));
        let mut extractor = MockProductExtractor::new();
        extractor.expect_extract().times(1).returning(|_| {
            Ok(ExtractedProduct {
                product_name: "Frying Pan".into(),
                ingredients: vec!["aluminum".into(), "PTFE".into()],
                ..Default::default()
            })
        });
        let mut analyst = MockHazardAnalyst::new();
        analyst
            .expect_analyze()
            .withf(|subject, _| {
                matches!(subject, AnalysisSubject::Extracted { product, .. } if product.product_name == "Frying Pan")
                    && !subject.tool_set().contains(crate::tools::ToolKind::WebFetch)
            })
            .times(1)
            .returning(|_, _| Ok(pfas_report()));

        let outcome = pipeline(cache.clone(), scraper, extractor, analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap();

        // scenario B numbers: 40 * 1.2
        assert_eq!(outcome.analysis.harm_score, 48);
        assert_eq!(outcome.analysis.overall_score, 52);
        assert_eq!(outcome.analysis.risk_level, RiskLevel::ModerateRisk);
        assert_eq!(outcome.analysis.retailer.as_deref(), Some("Amazon.com"));
        assert_eq!(outcome.analysis.ingredients, vec!["aluminum", "PTFE"]);
        assert!(!outcome.cached);
        assert_eq!(outcome.cache_age_seconds, None);
        assert_eq!(cache.get(&url_hash(URL)).await, Some(outcome.analysis));
    }

    #[tokio::test]
    async fn low_confidence_scrape_falls_back_to_url() {
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| Some(scraped(0.1)));
        let mut extractor = MockProductExtractor::new();
        extractor.expect_extract().never();
        let mut analyst = MockHazardAnalyst::new();
        analyst
            .expect_analyze()
            .withf(|subject, _| {
                *subject == AnalysisSubject::Url(URL.into())
                    && subject.tool_set().contains(crate::tools::ToolKind::WebFetch)
            })
            .times(1)
            .returning(|_, _| Ok(pfas_report()));

        pipeline(Arc::new(MemoryCacheStore::new()), scraper, extractor, analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn threshold_confidence_is_not_enough() {
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| Some(scraped(0.3)));
        let mut extractor = MockProductExtractor::new();
        extractor.expect_extract().never();
        let mut analyst = MockHazardAnalyst::new();
        analyst
            .expect_analyze()
            .withf(|subject, _| matches!(subject, AnalysisSubject::Url(_)))
            .times(1)
            .returning(|_, _| Ok(pfas_report()));

        pipeline(Arc::new(MemoryCacheStore::new()), scraper, extractor, analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn no_scraper_falls_back_without_retailer() {
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| None);
        let mut analyst = MockHazardAnalyst::new();
        analyst
            .expect_analyze()
            .returning(|_, _| Ok(HazardReport::default()));

        let outcome = pipeline(
            Arc::new(MemoryCacheStore::new()),
            scraper,
            MockProductExtractor::new(),
            analyst,
        )
        .analyze(&AnalysisRequest::new("https://shop.example/p/1"))
        .await
        .unwrap();

        assert_eq!(outcome.analysis.retailer, None);
        assert_eq!(outcome.analysis.harm_score, 0);
        assert_eq!(outcome.analysis.overall_score, 100);
        assert_eq!(outcome.analysis.risk_level, RiskLevel::Safe);
    }

    #[tokio::test]
    async fn persistence_failure_is_swallowed() {
        let mut cache = MockCacheStore::new();
        cache.expect_get().returning(|_| None);
        cache.expect_put().times(1).returning(|_, _| false);
        cache.expect_log_search().times(1).returning(|_, _, _| false);
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| None);
        let mut analyst = MockHazardAnalyst::new();
        analyst.expect_analyze().returning(|_, _| {
            let mut report = HazardReport::default();
            report.allergens_detected.push(DetectedAllergen {
                name: "peanut".into(),
                severity: Severity::High,
                source: "ingredients".into(),
            });
            Ok(report)
        });

        let outcome = pipeline(Arc::new(cache), scraper, MockProductExtractor::new(), analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap();
        assert_eq!(outcome.analysis.harm_score, 30);
        assert_eq!(outcome.analysis.overall_score, 70);
    }

    #[tokio::test]
    async fn extraction_parse_failure_is_fatal() {
        let mut cache = MockCacheStore::new();
        cache.expect_get().returning(|_| None);
        cache.expect_put().never();
        cache.expect_log_search().never();
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| Some(scraped(0.8)));
        let mut extractor = MockProductExtractor::new();
        extractor
            .expect_extract()
            .returning(|_| Err(ExtractionError::Parse("no JSON object".into())));
        let mut analyst = MockHazardAnalyst::new();
        analyst.expect_analyze().never();

        let err = pipeline(Arc::new(cache), scraper, extractor, analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(ExtractionError::Parse(_))));
    }

    #[tokio::test]
    async fn analysis_failure_is_fatal_and_not_cached() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| None);
        let mut analyst = MockHazardAnalyst::new();
        analyst.expect_analyze().returning(|_, _| {
            Err(AnalysisError::Upstream(LlmError::Http {
                status: 529,
                body: "overloaded".into(),
            }))
        });

        let err = pipeline(cache.clone(), scraper, MockProductExtractor::new(), analyst)
            .analyze(&AnalysisRequest::new(URL))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Analysis(AnalysisError::Upstream(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.search_count(&url_hash(URL)), 0);
    }

    #[tokio::test]
    async fn every_answered_request_is_logged() {
        let cache = Arc::new(MemoryCacheStore::new());
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().times(1).returning(|_| None);
        let mut analyst = MockHazardAnalyst::new();
        analyst
            .expect_analyze()
            .times(1)
            .returning(|_, _| Ok(pfas_report()));
        let pipeline = pipeline(cache.clone(), scraper, MockProductExtractor::new(), analyst);

        let fresh = pipeline.analyze(&AnalysisRequest::new(URL)).await.unwrap();
        assert_eq!(cache.search_count(&url_hash(URL)), 1);

        let hit = pipeline.analyze(&AnalysisRequest::new(URL)).await.unwrap();
        assert!(!fresh.cached && hit.cached);
        assert_eq!(cache.search_count(&url_hash(URL)), 2);
    }

    #[tokio::test]
    async fn force_refresh_skips_lookup_and_overwrites() {
        let mut cache = MockCacheStore::new();
        cache.expect_get().never();
        cache
            .expect_put()
            .withf(|hash, analysis| hash == url_hash(URL) && analysis.harm_score == 48)
            .times(1)
            .returning(|_, _| true);
        cache
            .expect_log_search()
            .withf(|_, _, cached| !*cached)
            .times(1)
            .returning(|_, _, _| true);
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| None);
        let mut analyst = MockHazardAnalyst::new();
        analyst.expect_analyze().returning(|_, _| Ok(pfas_report()));

        let mut request = AnalysisRequest::new(URL);
        request.force_refresh = true;
        let outcome = pipeline(Arc::new(cache), scraper, MockProductExtractor::new(), analyst)
            .analyze(&request)
            .await
            .unwrap();
        assert!(!outcome.cached);
    }

    #[tokio::test]
    async fn allergen_profile_and_knowledge_reach_the_analyst() {
        let mut knowledge = MockKnowledgeBase::new();
        knowledge
            .expect_snapshot()
            .withf(|sample| *sample == KNOWLEDGE_SAMPLE)
            .times(1)
            .returning(|_| crate::analysis::KnowledgeSnapshot {
                allergen_total: 7,
                ..Default::default()
            });
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| None);
        let mut analyst = MockHazardAnalyst::new();
        analyst
            .expect_analyze()
            .withf(|_, context| {
                context.allergen_profile == ["peanut"] && context.knowledge.allergen_total == 7
            })
            .times(1)
            .returning(|_, _| Ok(HazardReport::default()));

        let pipeline = AnalysisPipeline::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(scraper),
            Arc::new(MockProductExtractor::new()),
            Arc::new(analyst),
            Arc::new(knowledge),
            PipelineSettings::default(),
        );
        let mut request = AnalysisRequest::new(URL);
        request.allergen_profile = vec!["peanut".into()];
        pipeline.analyze(&request).await.unwrap();
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_any_work() {
        let mut cache = MockCacheStore::new();
        cache.expect_get().never();
        cache.expect_log_search().never();
        let err = pipeline(
            Arc::new(cache),
            MockProductScraper::new(),
            MockProductExtractor::new(),
            MockHazardAnalyst::new(),
        )
        .analyze(&AnalysisRequest::new("ftp://files.example/x"))
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
    }

    /// Analyst that counts calls and takes long enough for requests to overlap.
    struct SlowAnalyst {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl HazardAnalyst for SlowAnalyst {
        async fn analyze(
            &self,
            _subject: &AnalysisSubject,
            _context: &AnalysisContext,
        ) -> Result<HazardReport, AnalysisError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(pfas_report())
        }
    }

    fn concurrent_pipeline(dedupe: bool, calls: Arc<AtomicUsize>) -> Arc<AnalysisPipeline> {
        let mut scraper = MockProductScraper::new();
        scraper.expect_try_scrape().returning(|_| None);
        Arc::new(AnalysisPipeline::new(
            Arc::new(MemoryCacheStore::new()),
            Arc::new(scraper),
            Arc::new(MockProductExtractor::new()),
            Arc::new(SlowAnalyst { calls }),
            quiet_knowledge(),
            PipelineSettings {
                dedupe_inflight: dedupe,
                ..Default::default()
            },
        ))
    }

    async fn run_pair(pipeline: Arc<AnalysisPipeline>) {
        let request = AnalysisRequest::new(URL);
        let (a, b) = tokio::join!(pipeline.analyze(&request), pipeline.analyze(&request));
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn concurrent_requests_run_independently_by_default() {
        let calls = Arc::new(AtomicUsize::new(0));
        run_pair(concurrent_pipeline(false, calls.clone())).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn single_flight_shares_one_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipeline = concurrent_pipeline(true, calls.clone());
        run_pair(pipeline.clone()).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(pipeline.inflight.is_empty());
    }
}
