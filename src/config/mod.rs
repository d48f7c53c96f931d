//! Configuration handling for the application.
//!
//! Every component receives the values it needs through its constructor;
//! nothing reads the environment after start-up. `Config::from_env` performs
//! the loading with development defaults for everything except the provider
//! key, and tests build a value with `Config::default()` plus `with_*` setters.

use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable names.
pub const ENV_BIND_ADDR: &str = "BIND_ADDR";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_API_KEY: &str = "API_KEY";
pub const ENV_ANTHROPIC_API_KEY: &str = "ANTHROPIC_API_KEY";
pub const ENV_ANTHROPIC_BASE_URL: &str = "ANTHROPIC_BASE_URL";
pub const ENV_ANTHROPIC_MODEL: &str = "ANTHROPIC_MODEL";
pub const ENV_BRAVE_API_KEY: &str = "BRAVE_API_KEY";
pub const ENV_BRAVE_SEARCH_URL: &str = "BRAVE_SEARCH_URL";
pub const ENV_SCRAPE_TIMEOUT_SECS: &str = "SCRAPE_TIMEOUT_SECS";
pub const ENV_PROVIDER_TIMEOUT_SECS: &str = "PROVIDER_TIMEOUT_SECS";
pub const ENV_MAX_TOOL_ITERATIONS: &str = "MAX_TOOL_ITERATIONS";
pub const ENV_CONFIDENCE_THRESHOLD: &str = "CONFIDENCE_THRESHOLD";
pub const ENV_DEDUPE_INFLIGHT: &str = "DEDUPE_INFLIGHT";
pub const ENV_ALLOWED_ORIGINS: &str = "ALLOWED_ORIGINS";
pub const ENV_FETCH_ALLOWED_HOSTS: &str = "FETCH_ALLOWED_HOSTS";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_API_KEY: &str = "dev-api-key-change-me";
const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-sonnet-4-5-20250929";
const DEFAULT_BRAVE_SEARCH_URL: &str = "https://api.search.brave.com/res/v1/web/search";
const DEFAULT_SCRAPE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 120;
const DEFAULT_MAX_TOOL_ITERATIONS: usize = 10;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.3;
const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000";

/// Application runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    bind_addr: String,
    database_url: Option<String>,
    api_key: String,
    anthropic_api_key: String,
    anthropic_base_url: String,
    anthropic_model: String,
    brave_api_key: Option<String>,
    brave_search_url: String,
    scrape_timeout: Duration,
    provider_timeout: Duration,
    max_tool_iterations: usize,
    confidence_threshold: f64,
    dedupe_inflight: bool,
    allowed_origins: Vec<String>,
    fetch_allowed_hosts: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            database_url: None,
            api_key: DEFAULT_API_KEY.to_string(),
            anthropic_api_key: String::new(),
            anthropic_base_url: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            anthropic_model: DEFAULT_ANTHROPIC_MODEL.to_string(),
            brave_api_key: None,
            brave_search_url: DEFAULT_BRAVE_SEARCH_URL.to_string(),
            scrape_timeout: Duration::from_secs(DEFAULT_SCRAPE_TIMEOUT_SECS),
            provider_timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
            max_tool_iterations: DEFAULT_MAX_TOOL_ITERATIONS,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            dedupe_inflight: false,
            allowed_origins: split_list(DEFAULT_ALLOWED_ORIGINS),
            fetch_allowed_hosts: Vec::new(),
        }
    }
}

impl Config {
    /// Load from environment variables, falling back to development defaults.
    ///
    /// Fails when the provider key is missing or a numeric/boolean variable
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let anthropic_api_key = non_empty(ENV_ANTHROPIC_API_KEY).ok_or(ConfigError::Missing {
            field: ENV_ANTHROPIC_API_KEY,
        })?;

        let confidence_threshold: f64 =
            parsed(ENV_CONFIDENCE_THRESHOLD)?.unwrap_or(defaults.confidence_threshold);
        if !(0.0..=1.0).contains(&confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: ENV_CONFIDENCE_THRESHOLD,
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        let max_tool_iterations: usize =
            parsed(ENV_MAX_TOOL_ITERATIONS)?.unwrap_or(defaults.max_tool_iterations);
        if max_tool_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                field: ENV_MAX_TOOL_ITERATIONS,
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            bind_addr: non_empty(ENV_BIND_ADDR).unwrap_or(defaults.bind_addr),
            database_url: non_empty(ENV_DATABASE_URL),
            api_key: non_empty(ENV_API_KEY).unwrap_or(defaults.api_key),
            anthropic_api_key,
            anthropic_base_url: non_empty(ENV_ANTHROPIC_BASE_URL)
                .unwrap_or(defaults.anthropic_base_url),
            anthropic_model: non_empty(ENV_ANTHROPIC_MODEL).unwrap_or(defaults.anthropic_model),
            brave_api_key: non_empty(ENV_BRAVE_API_KEY),
            brave_search_url: non_empty(ENV_BRAVE_SEARCH_URL)
                .unwrap_or(defaults.brave_search_url),
            scrape_timeout: parsed(ENV_SCRAPE_TIMEOUT_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.scrape_timeout),
            provider_timeout: parsed(ENV_PROVIDER_TIMEOUT_SECS)?
                .map(Duration::from_secs)
                .unwrap_or(defaults.provider_timeout),
            max_tool_iterations,
            confidence_threshold,
            dedupe_inflight: parsed(ENV_DEDUPE_INFLIGHT)?.unwrap_or(defaults.dedupe_inflight),
            allowed_origins: non_empty(ENV_ALLOWED_ORIGINS)
                .map(|v| split_list(&v))
                .unwrap_or(defaults.allowed_origins),
            fetch_allowed_hosts: non_empty(ENV_FETCH_ALLOWED_HOSTS)
                .map(|v| split_list(&v))
                .unwrap_or(defaults.fetch_allowed_hosts),
        })
    }

    /// TCP bind address (host:port) for the HTTP server.
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }
    /// PostgreSQL URL; `None` selects the in-memory cache store.
    pub fn database_url(&self) -> Option<&str> {
        self.database_url.as_deref()
    }
    /// Static bearer token expected on protected routes.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
    /// True while the bearer token is still the built-in development value.
    pub fn uses_default_api_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
    pub fn anthropic_api_key(&self) -> &str {
        &self.anthropic_api_key
    }
    pub fn anthropic_base_url(&self) -> &str {
        &self.anthropic_base_url
    }
    pub fn anthropic_model(&self) -> &str {
        &self.anthropic_model
    }
    pub fn brave_api_key(&self) -> Option<&str> {
        self.brave_api_key.as_deref()
    }
    pub fn brave_search_url(&self) -> &str {
        &self.brave_search_url
    }
    /// Timeout for retailer scrapes and the fetch tool.
    pub fn scrape_timeout(&self) -> Duration {
        self.scrape_timeout
    }
    pub fn provider_timeout(&self) -> Duration {
        self.provider_timeout
    }
    /// Upper bound on model turns in one analysis conversation.
    pub fn max_tool_iterations(&self) -> usize {
        self.max_tool_iterations
    }
    /// Scrapes must score strictly above this to take the extraction path.
    pub fn confidence_threshold(&self) -> f64 {
        self.confidence_threshold
    }
    pub fn dedupe_inflight(&self) -> bool {
        self.dedupe_inflight
    }
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed_origins
    }
    /// Hosts the page fetcher may reach even when they resolve to
    /// loopback or private addresses.
    pub fn fetch_allowed_hosts(&self) -> &[String] {
        &self.fetch_allowed_hosts
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }
    pub fn with_anthropic(mut self, api_key: impl Into<String>, base_url: impl Into<String>) -> Self {
        self.anthropic_api_key = api_key.into();
        self.anthropic_base_url = base_url.into();
        self
    }
    pub fn with_brave(mut self, api_key: impl Into<String>, search_url: impl Into<String>) -> Self {
        self.brave_api_key = Some(api_key.into());
        self.brave_search_url = search_url.into();
        self
    }
    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }
    pub fn with_dedupe_inflight(mut self, enabled: bool) -> Self {
        self.dedupe_inflight = enabled;
        self
    }
    pub fn with_fetch_allowed_hosts<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fetch_allowed_hosts = hosts.into_iter().map(Into::into).collect();
        self
    }
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match non_empty(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                field: key,
                reason: e.to_string(),
            }),
        None => Ok(None),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(str::to_string)
        .collect()
}

/// Errors that can occur while building a configuration.
#[derive(Debug)]
pub enum ConfigError {
    Missing { field: &'static str },
    InvalidValue { field: &'static str, reason: String },
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Missing { field } => write!(f, "missing required variable '{}'", field),
            ConfigError::InvalidValue { field, reason } => {
                write!(f, "invalid value for '{}': {}", field, reason)
            }
        }
    }
}

impl Error for ConfigError {}
