//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the session client (cookie jar, user agent, timeouts)
//! - GET requests for forum pages
//! - Form submission for the login handshake
//! - Error classification into `HarvestError`

use crate::config::{CrawlerConfig, UserAgentConfig};
use crate::HarvestError;
use reqwest::{redirect::Policy, Client, RequestBuilder, StatusCode};
use std::time::{Duration, Instant};
use url::Url;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// A fetched page
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    /// Page body content
    pub body: String,

    /// Time from sending the request until the body was read
    pub latency: Duration,
}

impl Page {
    /// Returns the page if its status is a success, or a `Status` error otherwise
    pub fn into_success(self) -> Result<Self, HarvestError> {
        if StatusCode::from_u16(self.status).map_or(false, |s| s.is_success()) {
            Ok(self)
        } else {
            Err(HarvestError::Status {
                url: self.url.to_string(),
                status: self.status,
            })
        }
    }
}

/// Formats the user agent string
///
/// Format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn user_agent_string(config: &UserAgentConfig) -> String {
    format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    )
}

/// Builds an HTTP client for one authenticated crawl session
///
/// The client keeps a cookie jar, so every request made through it after a
/// successful login carries the forum session cookie.
///
/// # Arguments
///
/// * `crawler` - Timeout settings
/// * `user_agent` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent_string(user_agent))
        .timeout(Duration::from_secs(crawler.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .cookie_store(true)
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches a URL with GET
///
/// Any HTTP response, successful or not, is returned as a `Page` so the
/// caller can feed its status and latency to the throttle before deciding
/// what to do with it. Only transport failures are errors here.
pub async fn fetch_page(client: &Client, url: &Url) -> Result<Page, HarvestError> {
    send(client.get(url.clone()), url).await
}

/// Submits a URL-encoded form with POST
pub async fn submit_form(
    client: &Client,
    url: &Url,
    fields: &[(String, String)],
) -> Result<Page, HarvestError> {
    send(client.post(url.clone()).form(fields), url).await
}

async fn send(request: RequestBuilder, url: &Url) -> Result<Page, HarvestError> {
    let started = Instant::now();

    let response = request.send().await.map_err(|e| classify(url, e))?;
    let status = response.status().as_u16();
    let final_url = response.url().clone();
    let body = response.text().await.map_err(|e| classify(url, e))?;

    Ok(Page {
        url: final_url,
        status,
        body,
        latency: started.elapsed(),
    })
}

fn classify(url: &Url, error: reqwest::Error) -> HarvestError {
    if error.is_timeout() {
        tracing::debug!("Request timeout for {}", url);
    } else if error.is_connect() {
        tracing::debug!("Connection refused for {}", url);
    } else if error.is_redirect() {
        tracing::debug!("Redirect chain too long for {}", url);
    }

    HarvestError::Http {
        url: url.to_string(),
        source: error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> UserAgentConfig {
        UserAgentConfig {
            crawler_name: "TestHarvester".to_string(),
            crawler_version: "1.0".to_string(),
            contact_url: "https://example.com/about".to_string(),
            contact_email: "admin@example.com".to_string(),
        }
    }

    fn page(status: u16) -> Page {
        Page {
            url: Url::parse("https://forum.example/index.php").unwrap(),
            status,
            body: String::new(),
            latency: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_build_http_client() {
        let client = build_http_client(&CrawlerConfig::default(), &create_test_config());
        assert!(client.is_ok());
    }

    #[test]
    fn test_user_agent_format() {
        assert_eq!(
            user_agent_string(&create_test_config()),
            "TestHarvester/1.0 (+https://example.com/about; admin@example.com)"
        );
    }

    #[test]
    fn test_into_success_passes_2xx() {
        assert!(page(200).into_success().is_ok());
    }

    #[test]
    fn test_into_success_rejects_error_status() {
        match page(503).into_success() {
            Err(HarvestError::Status { status, url }) => {
                assert_eq!(status, 503);
                assert!(url.ends_with("index.php"));
            }
            other => panic!("expected status error, got {:?}", other),
        }
    }
}
