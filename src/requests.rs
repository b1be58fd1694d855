use std::time::Duration;

use anyhow::Context;
use log::debug;
use reqwest::{
    Client, ClientBuilder, Response,
    header::{ACCEPT, HeaderMap, HeaderValue, REFERER},
};

use crate::ratelimit::RateLimiter;

/// Rate-limited client for requests made outside the browser session:
/// replaying captured API calls and downloading judgment documents.
pub struct RequestClient {
    client: Client,
    rate_limiter: RateLimiter,
}

impl RequestClient {
    pub fn new(timeout: Duration, referer: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/json, text/html, */*"),
        );
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));
        headers.insert(
            REFERER,
            HeaderValue::from_str(referer).context("referer is not a valid header value")?,
        );
        let client = ClientBuilder::new()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        let rate_limiter = RateLimiter::new()?;
        Ok(Self {
            client,
            rate_limiter,
        })
    }

    pub async fn fetch_url_response(&self, url: &str) -> anyhow::Result<Response> {
        // Wait (non-blocking) until the rate limiter lets this one through.
        self.rate_limiter.wait_until_ready().await;

        let response = self.client.get(url).send().await?;
        Ok(response)
    }

    /// The body of a 200 response, or `None` for any other status.
    pub async fn fetch_text(&self, url: &str) -> anyhow::Result<Option<String>> {
        let response = self.fetch_url_response(url).await?;
        if response.status() != reqwest::StatusCode::OK {
            debug!("{} answered {}", url, response.status());
            return Ok(None);
        }
        Ok(Some(response.text().await?))
    }

    pub async fn fetch_bytes(&self, url: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let response = self.fetch_url_response(url).await?;
        if !response.status().is_success() {
            debug!("{} answered {}", url, response.status());
            return Ok(None);
        }
        Ok(Some(response.bytes().await?.to_vec()))
    }
}
