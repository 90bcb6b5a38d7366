//! HTTP client for the external markdown-conversion service (§6).
//!
//! The service itself is out of scope; this is the request/response
//! contract the rest of the extractor consumes.

use std::time::Duration;

use crate::error::{ExtractionError, Result};

/// Category-landing title fragments that indicate a homepage-redirect
/// rather than the requested product page.
const HOMEPAGE_REDIRECT_SIGNATURES: &[&str] = &[
    "shop all",
    "new arrivals",
    "welcome to",
    "page not found",
];

pub struct MarkdownServiceClient {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl MarkdownServiceClient {
    pub fn new(base_url: impl Into<String>, bearer_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            bearer_token,
        }
    }

    /// GET the markdown conversion of `url`, with exponential backoff and
    /// jitter up to three attempts (§4.3 failure semantics). Base timeout
    /// 45s, growing 20s per retry, scaled by a 0.7-1.3 jitter factor (§5).
    pub async fn fetch_markdown(&self, target_url: &str) -> Result<String> {
        let mut last_err = None;
        for attempt in 0..3u32 {
            let timeout_secs = 45.0 + 20.0 * attempt as f64;
            let jitter = 0.7 + 0.6 * pseudo_random(attempt);
            let timeout = Duration::from_secs_f64(timeout_secs * jitter);

            match self.try_fetch(target_url, timeout).await {
                Ok(markdown) => return self.validate_response(target_url, markdown),
                Err(e) => {
                    tracing::warn!(attempt, target_url, error = %e, "markdown fetch attempt failed");
                    last_err = Some(e);
                    if attempt < 2 {
                        let backoff = Duration::from_secs_f64(2f64.powi(attempt as i32) * jitter);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ExtractionError::FetchFailed("exhausted retries".into())))
    }

    async fn try_fetch(&self, target_url: &str, timeout: Duration) -> Result<String> {
        let mut request = self
            .client
            .get(&self.base_url)
            .query(&[("url", target_url)])
            .header("Accept", "text/plain")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header(
                "User-Agent",
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            )
            .timeout(timeout);

        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ExtractionError::FetchFailed(e.to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(ExtractionError::FetchFailed(format!(
                "markdown service returned {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| ExtractionError::FetchFailed(e.to_string()))
    }

    fn validate_response(&self, target_url: &str, markdown: String) -> Result<String> {
        let head = markdown.chars().take(300).collect::<String>().to_lowercase();
        let looks_like_homepage = HOMEPAGE_REDIRECT_SIGNATURES.iter().any(|sig| head.contains(sig));
        if looks_like_homepage {
            tracing::warn!(target_url, "markdown service response matched a homepage-redirect signature");
            return Err(ExtractionError::Delisted);
        }
        Ok(markdown)
    }

    /// Delisting probe: a short-timeout HEAD request, markdown-path only
    /// (§4.3) since the browser path must preserve session continuity.
    pub async fn probe_delisted(&self, target_url: &str) -> bool {
        let result = self
            .client
            .head(target_url)
            .timeout(Duration::from_secs(5))
            .send()
            .await;
        matches!(result, Ok(resp) if resp.status() == 404 || resp.status() == 410)
    }
}

/// Deterministic pseudo-jitter derived from the attempt index, avoiding a
/// dependency on a random-number source for the retry backoff.
fn pseudo_random(seed: u32) -> f64 {
    let x = (seed.wrapping_mul(2654435761) ^ 0x9E3779B9) as f64;
    (x / u32::MAX as f64).fract().abs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pseudo_random_stays_in_unit_interval() {
        for seed in 0..10 {
            let v = pseudo_random(seed);
            assert!((0.0..=1.0).contains(&v));
        }
    }
}
