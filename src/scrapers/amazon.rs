use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use tracing::{error, instrument};

use crate::analysis::ScrapedProduct;
use crate::fetcher::HttpFetcher;
use crate::scrapers::{Scraper, confidence_score, mentions_ingredients};

const SCRAPER_NAME: &str = "amazon";

/// Longest suffix first so `amazon.com.au` is not reported as `amazon.com`.
const RETAILERS: [(&str, &str); 9] = [
    ("amazon.com.au", "Amazon.com.au"),
    ("amazon.co.uk", "Amazon.co.uk"),
    ("amazon.co.jp", "Amazon.co.jp"),
    ("amazon.com", "Amazon.com"),
    ("amazon.ca", "Amazon.ca"),
    ("amazon.de", "Amazon.de"),
    ("amazon.fr", "Amazon.fr"),
    ("amazon.it", "Amazon.it"),
    ("amazon.es", "Amazon.es"),
];

static TITLE: LazyLock<Selector> = LazyLock::new(|| selector("#productTitle"));
static BYLINE: LazyLock<Selector> = LazyLock::new(|| selector("#bylineInfo"));
static FEATURE_BULLETS: LazyLock<Selector> = LazyLock::new(|| {
    selector("#feature-bullets li, #featurebullets_feature_div li, #feature-bullets-btf li")
});
static DETAIL_ROWS: LazyLock<Selector> = LazyLock::new(|| {
    selector(
        "#productDetails_techSpec_section_1 tr, #productDetails_detailBullets_sections1 tr, \
         .a-section.a-spacing-small.a-spacing-top-small tr",
    )
});
static DETAIL_BULLETS: LazyLock<Selector> =
    LazyLock::new(|| selector("#detailBullets_feature_div li"));
static ROW_LABEL: LazyLock<Selector> = LazyLock::new(|| selector("th, td.a-span3, td.a-span4"));
static ROW_VALUE: LazyLock<Selector> = LazyLock::new(|| selector("td"));
static DESCRIPTION: LazyLock<Selector> = LazyLock::new(|| selector("#productDescription"));

static BRAND_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(visit the\s+|brand:\s*)").unwrap());
static BRAND_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\s+store$").unwrap());

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector must parse")
}

pub struct AmazonScraper {
    fetcher: HttpFetcher,
}

impl AmazonScraper {
    pub fn new(fetcher: HttpFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Scraper for AmazonScraper {
    fn name(&self) -> &'static str {
        SCRAPER_NAME
    }

    fn can_scrape(&self, host: &str) -> bool {
        RETAILERS.iter().any(|(domain, _)| host.contains(domain))
    }

    #[instrument(skip(self))]
    async fn scrape(&self, url: &str) -> ScrapedProduct {
        match self.fetcher.fetch(url).await {
            Ok(page) => parse_product_page(url, &page.body_utf8),
            Err(e) => {
                error!(error = %e, transient = e.is_transient(), "Amazon fetch failed");
                ScrapedProduct {
                    url: url.to_string(),
                    retailer: retailer_name(url).to_string(),
                    raw_text: String::new(),
                    confidence: 0.0,
                    scraper: SCRAPER_NAME,
                }
            }
        }
    }
}

pub fn retailer_name(url: &str) -> &'static str {
    let lower = url.to_ascii_lowercase();
    RETAILERS
        .iter()
        .find(|(domain, _)| lower.contains(domain))
        .map(|(_, name)| *name)
        .unwrap_or("Amazon")
}

/// Parse a product page into raw text plus a confidence score.
pub fn parse_product_page(url: &str, html: &str) -> ScrapedProduct {
    let document = Html::parse_document(html);

    let title = first_text(&document, &TITLE);
    let brand = first_text(&document, &BYLINE).map(|b| clean_brand(&b)).filter(|b| !b.is_empty());
    let description = first_text(&document, &DESCRIPTION);

    let features = document.select(&FEATURE_BULLETS).filter_map(element_text);
    let details = document
        .select(&DETAIL_ROWS)
        .filter_map(detail_row)
        .chain(document.select(&DETAIL_BULLETS).filter_map(element_text));

    let mut fragments: Vec<String> = Vec::new();
    for fragment in features.chain(details) {
        if mentions_ingredients(&fragment) && !fragments.contains(&fragment) {
            fragments.push(fragment);
        }
    }

    let confidence = confidence_score(title.is_some(), brand.is_some(), !fragments.is_empty());

    let mut parts: Vec<String> = Vec::new();
    if let Some(title) = &title {
        parts.push(format!("Title: {title}"));
    }
    if let Some(brand) = &brand {
        parts.push(format!("Brand: {brand}"));
    }
    parts.extend(fragments);
    if let Some(description) = description {
        parts.push(format!("Description: {description}"));
    }

    ScrapedProduct {
        url: url.to_string(),
        retailer: retailer_name(url).to_string(),
        raw_text: parts.join("\n"),
        confidence,
        scraper: SCRAPER_NAME,
    }
}

fn first_text(document: &Html, selector: &Selector) -> Option<String> {
    document.select(selector).find_map(element_text)
}

fn element_text(element: ElementRef<'_>) -> Option<String> {
    let text = element.text().collect::<Vec<_>>().join(" ");
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

/// `Label: value` for a details-table row.
fn detail_row(row: ElementRef<'_>) -> Option<String> {
    let label = row.select(&ROW_LABEL).next().and_then(element_text)?;
    let value = row
        .select(&ROW_VALUE)
        .filter_map(element_text)
        .find(|v| *v != label)?;
    let value = value.replace("See more", "");
    Some(format!("{}: {}", label.trim_end_matches(':'), value.trim()))
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace()
        .filter(|w| *w != "\u{200e}" && *w != "\u{200f}")
        .collect::<Vec<_>>()
        .join(" ")
}

/// "Visit the Acme Store" and "Brand: Acme" both become "Acme".
fn clean_brand(byline: &str) -> String {
    let stripped = BRAND_PREFIX.replace(byline.trim(), "");
    BRAND_SUFFIX.replace(stripped.trim(), "").trim().to_string()
}
