//! Retailer-specific scrapers and the selector that picks one for a URL.
//!
//! Scrapers never fail: network and parsing problems come back as a
//! `ScrapedProduct` with confidence 0 so the pipeline can fall back to letting
//! the model fetch the page itself.

pub mod amazon;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

use crate::analysis::ScrapedProduct;
use crate::fetcher::HttpFetcher;

pub use amazon::AmazonScraper;

const TITLE_WEIGHT: f64 = 0.3;
const BRAND_WEIGHT: f64 = 0.2;
const INGREDIENT_WEIGHT: f64 = 0.5;

/// Phrases that mark a feature bullet or detail row as ingredient/material bearing.
pub const INGREDIENT_KEYWORDS: [&str; 5] = [
    "ingredient",
    "material",
    "composition",
    "contains",
    "made from",
];

/// How much usable signal a scrape produced: title 0.3, brand 0.2, any
/// ingredient/material fragment 0.5, capped at 1.0.
pub fn confidence_score(has_title: bool, has_brand: bool, has_ingredients: bool) -> f64 {
    let mut score = 0.0;
    if has_title {
        score += TITLE_WEIGHT;
    }
    if has_brand {
        score += BRAND_WEIGHT;
    }
    if has_ingredients {
        score += INGREDIENT_WEIGHT;
    }
    f64::min(score, 1.0)
}

pub fn mentions_ingredients(text: &str) -> bool {
    let lower = text.to_lowercase();
    INGREDIENT_KEYWORDS.iter().any(|k| lower.contains(k))
}

#[async_trait]
pub trait Scraper: Send + Sync {
    fn name(&self) -> &'static str;

    /// Host containment match against the retailer domains this scraper knows.
    fn can_scrape(&self, host: &str) -> bool;

    async fn scrape(&self, url: &str) -> ScrapedProduct;
}

/// Pipeline-facing seam: scrape a URL if any scraper applies.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProductScraper: Send + Sync {
    async fn try_scrape(&self, url: &str) -> Option<ScrapedProduct>;
}

pub struct ScraperSelector {
    scrapers: Vec<Arc<dyn Scraper>>,
}

impl ScraperSelector {
    pub fn new(scrapers: Vec<Arc<dyn Scraper>>) -> Self {
        Self { scrapers }
    }

    /// Selector with every retailer scraper this crate ships.
    pub fn with_default_scrapers(fetcher: HttpFetcher) -> Self {
        Self::new(vec![Arc::new(AmazonScraper::new(fetcher))])
    }

    pub fn select(&self, url: &str) -> Option<Arc<dyn Scraper>> {
        let host = Url::parse(url).ok()?.host_str()?.to_ascii_lowercase();
        self.scrapers
            .iter()
            .find(|scraper| scraper.can_scrape(&host))
            .cloned()
    }
}

#[async_trait]
impl ProductScraper for ScraperSelector {
    async fn try_scrape(&self, url: &str) -> Option<ScrapedProduct> {
        let Some(scraper) = self.select(url) else {
            info!(url = %url, "No scraper for host, model will fetch the page");
            return None;
        };

        let scraped = scraper.scrape(url).await;
        if scraped.confidence == 0.0 {
            warn!(scraper = scraper.name(), url = %url, "Scrape produced no usable signal");
        } else {
            info!(
                scraper = scraper.name(),
                confidence = scraped.confidence,
                "Scraped product page"
            );
        }
        Some(scraped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn selector() -> ScraperSelector {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        ScraperSelector::with_default_scrapers(fetcher)
    }

    #[test]
    fn confidence_weights() {
        assert_eq!(confidence_score(false, false, false), 0.0);
        assert_eq!(confidence_score(true, false, false), 0.3);
        assert_eq!(confidence_score(true, true, false), 0.5);
        assert_eq!(confidence_score(false, false, true), 0.5);
        assert_eq!(confidence_score(true, true, true), 1.0);
    }

    #[test]
    fn keyword_scan_is_case_insensitive() {
        assert!(mentions_ingredients("INGREDIENTS: water, glycerin"));
        assert!(mentions_ingredients("Made From recycled polyester"));
        assert!(mentions_ingredients("Contains tree nuts"));
        assert!(!mentions_ingredients("Dishwasher safe"));
    }

    #[test]
    fn selects_amazon_by_host() {
        let selector = selector();
        let scraper = selector.select("https://www.amazon.com/dp/B000TEST").unwrap();
        assert_eq!(scraper.name(), "amazon");
        assert!(selector.select("https://www.amazon.co.uk/dp/B000TEST").is_some());
        assert!(selector.select("https://smile.amazon.de/dp/B000TEST").is_some());
    }

    #[test]
    fn no_scraper_for_unknown_hosts() {
        let selector = selector();
        assert!(selector.select("https://www.target.com/p/item").is_none());
        // domain appearing only in the path does not count
        assert!(selector.select("https://example.com/amazon.com/dp/X").is_none());
        assert!(selector.select("not a url").is_none());
    }

    #[tokio::test]
    async fn try_scrape_returns_none_without_scraper() {
        let selector = selector();
        assert!(selector.try_scrape("https://shop.example.org/p/1").await.is_none());
    }
}
