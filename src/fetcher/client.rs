use crate::fetcher::{
    decode::process_response,
    errors::FetchError,
    guard::{AddressPolicy, GuardedResolver},
    types::PageResponse,
};
use reqwest::{
    Client, ClientBuilder,
    header::{ACCEPT, ACCEPT_LANGUAGE, CONTENT_TYPE, HeaderMap, HeaderValue},
    redirect,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const MAX_BODY_SIZE: u64 = 5 * 1024 * 1024; // 5MB
const MAX_REDIRECTS: usize = 10;

/// Desktop browser user agent; retailer pages serve bot-check interstitials otherwise.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// HTTP GET with browser headers, a fixed timeout and charset decoding.
///
/// Shared by the retailer scrapers and the `web_fetch` tool. Only public
/// addresses are reachable unless the host is on the policy's allow-list.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: AddressPolicy,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        Self::with_policy(timeout, AddressPolicy::default())
    }

    pub fn with_policy(timeout: Duration, policy: AddressPolicy) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let redirect_policy = policy.clone();
        let client = ClientBuilder::new()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(BROWSER_USER_AGENT)
            .redirect(redirect::Policy::custom(move |attempt| {
                if attempt.previous().len() >= MAX_REDIRECTS {
                    attempt.error("too many redirects")
                } else if let Err(blocked) = redirect_policy.check_url(attempt.url()) {
                    attempt.error(blocked)
                } else {
                    attempt.follow()
                }
            }))
            // a proxy would resolve names itself and bypass the resolver
            .no_proxy()
            .dns_resolver(Arc::new(GuardedResolver::new(policy.clone())))
            .default_headers(headers)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self { client, policy })
    }

    #[instrument(skip_all, fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<PageResponse, FetchError> {
        let parsed_url = url::Url::parse(url)?;
        if !matches!(parsed_url.scheme(), "http" | "https") {
            return Err(FetchError::UnsupportedScheme(parsed_url.scheme().to_string()));
        }
        self.policy.check_url(&parsed_url)?;

        let mut response = self
            .client
            .get(parsed_url)
            .send()
            .await
            .map_err(FetchError::from_reqwest_error)?;

        if let Some(content_length) = response.content_length()
            && content_length > MAX_BODY_SIZE
        {
            return Err(FetchError::BodyTooLarge(content_length));
        }

        let final_url = response.url().clone();
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http(status));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .unwrap_or("text/html")
            .to_ascii_lowercase();

        if !is_textual(&content_type) {
            return Err(FetchError::UnsupportedContentType(content_type));
        }

        // Content-Length can be absent on chunked responses
        let mut body_bytes = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| FetchError::Io(e.to_string()))?
        {
            push_capped(&mut body_bytes, &chunk, MAX_BODY_SIZE)?;
        }

        debug!(status = %status, bytes = body_bytes.len(), "Fetched page");
        process_response(final_url, status, content_type, &body_bytes)
    }
}

fn push_capped(body: &mut Vec<u8>, chunk: &[u8], limit: u64) -> Result<(), FetchError> {
    let total = (body.len() + chunk.len()) as u64;
    if total > limit {
        return Err(FetchError::BodyTooLarge(total));
    }
    body.extend_from_slice(chunk);
    Ok(())
}

fn is_textual(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || content_type.contains("xhtml")
        || content_type.contains("xml")
        || content_type.contains("json")
}
