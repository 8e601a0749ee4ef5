//! HTTP access to the signal provider.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, COOKIE, USER_AGENT};
use thiserror::Error;

const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("invalid auth cookie")]
    BadCookie(#[source] reqwest::header::InvalidHeaderValue),
}

/// Fetches one page of HTML. Implemented by [`SignalClient`] in
/// production and by in-memory fakes in tests.
pub trait PageFetcher {
    fn fetch_page(
        &self,
        url: &str,
    ) -> impl std::future::Future<Output = Result<String, FetchError>> + Send;
}

pub struct SignalClient {
    http: reqwest::Client,
    base_url: String,
}

impl SignalClient {
    /// The cookie, when present, authenticates subscription-only pages.
    /// Public stats pages work without it.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        cookie: Option<&str>,
    ) -> Result<Self, FetchError> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(UA));
        if let Some(cookie) = cookie {
            let mut value = HeaderValue::from_str(cookie).map_err(FetchError::BadCookie)?;
            value.set_sensitive(true);
            headers.insert(COOKIE, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn subscriptions_url(&self) -> String {
        format!("{}/en/signals/subscriptions", self.base_url)
    }

    /// True when the stored cookie still grants access: the request must
    /// come back 200 without being redirected off the subscriptions page.
    pub async fn check_auth(&self) -> Result<bool, FetchError> {
        let response = self.http.get(self.subscriptions_url()).send().await?;
        let landed = response.url().path().contains("/signals/subscriptions");
        Ok(response.status().is_success() && landed)
    }
}

impl PageFetcher for SignalClient {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let started = std::time::Instant::now();
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            metrics::counter!("collector_fetch_errors_total", "status" => status.as_str().to_string())
                .increment(1);
            return Err(FetchError::Status {
                status,
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        metrics::histogram!("collector_fetch_latency_ms")
            .record(started.elapsed().as_millis() as f64);
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriptions_url_strips_trailing_slash() {
        let client = SignalClient::new("https://example.test/", Duration::from_secs(5), None)
            .expect("client");
        assert_eq!(
            client.subscriptions_url(),
            "https://example.test/en/signals/subscriptions"
        );
    }

    #[test]
    fn test_rejects_cookie_with_control_chars() {
        let err = SignalClient::new(
            "https://example.test",
            Duration::from_secs(5),
            Some("sid=a\nb"),
        );
        assert!(matches!(err, Err(FetchError::BadCookie(_))));
    }
}
