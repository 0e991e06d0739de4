//! Page fetching with user-facing failure classification.
//!
//! No automatic retry — retry policy belongs to the caller. Batch fetches
//! fan out concurrently and gather every outcome, so one failing URL never
//! cancels its siblings.

use std::time::Duration;

use reqwest::Client;
use tokio::task::JoinSet;

const FETCH_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_PAGE_SIZE: usize = 5 * 1024 * 1024;

/// A realistic browser UA — many storefronts reject obvious bot agents.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("the site is blocking automated access (HTTP {0})")]
    Blocked(u16),
    #[error("page not found (HTTP 404) — the site may have restructured")]
    NotFound,
    #[error("the site is rate-limiting requests (HTTP 429) — retry later")]
    RateLimited,
    #[error("the site is experiencing technical difficulty (HTTP {0})")]
    ServerError(u16),
    #[error("request failed with HTTP {0}")]
    Status(u16),
    #[error("the site did not respond in time")]
    TimedOut,
    #[error("could not reach the site: {0}")]
    Network(String),
    #[error("response was not an HTML page ({0})")]
    NotHtml(String),
    #[error("page too large ({0} bytes)")]
    TooLarge(usize),
}

impl FetchError {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => FetchError::Blocked(status),
            404 => FetchError::NotFound,
            429 => FetchError::RateLimited,
            500..=599 => FetchError::ServerError(status),
            other => FetchError::Status(other),
        }
    }

    pub fn is_blocked(&self) -> bool {
        matches!(self, FetchError::Blocked(_))
    }
}

// ---------------------------------------------------------------------------
// Single fetch
// ---------------------------------------------------------------------------

/// GET one page and return its body as text.
pub async fn fetch_page(client: &Client, url: &str) -> Result<String, FetchError> {
    let resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, BROWSER_USER_AGENT)
        .header(
            reqwest::header::ACCEPT,
            "text/html,application/xhtml+xml,*/*;q=0.8",
        )
        .header(reqwest::header::ACCEPT_LANGUAGE, "en-US,en;q=0.9")
        .timeout(FETCH_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                FetchError::TimedOut
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

    let status = resp.status();
    if !status.is_success() {
        return Err(FetchError::from_status(status.as_u16()));
    }

    let ct = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if !ct.is_empty() && !ct.contains("text/") && !ct.contains("html") && !ct.contains("xml") {
        return Err(FetchError::NotHtml(ct.to_string()));
    }

    if let Some(len) = resp.content_length() {
        if len as usize > MAX_PAGE_SIZE {
            return Err(FetchError::TooLarge(len as usize));
        }
    }

    let bytes = resp
        .bytes()
        .await
        .map_err(|e| FetchError::Network(e.to_string()))?;
    if bytes.len() > MAX_PAGE_SIZE {
        return Err(FetchError::TooLarge(bytes.len()));
    }

    Ok(String::from_utf8_lossy(&bytes).to_string())
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Fetch every URL concurrently and gather all outcomes, re-ordered back to
/// the input order. Completion order inside the batch is unconstrained.
pub async fn fetch_all(
    client: &Client,
    urls: &[String],
) -> Vec<(String, Result<String, FetchError>)> {
    let mut set = JoinSet::new();
    for (idx, url) in urls.iter().enumerate() {
        let client = client.clone();
        let url = url.clone();
        set.spawn(async move {
            let result = fetch_page(&client, &url).await;
            (idx, url, result)
        });
    }

    let mut slots: Vec<Option<(String, Result<String, FetchError>)>> =
        (0..urls.len()).map(|_| None).collect();
    while let Some(joined) = set.join_next().await {
        if let Ok((idx, url, result)) = joined {
            slots[idx] = Some((url, result));
        }
    }
    slots.into_iter().flatten().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_distinguishes_block_kinds() {
        assert!(matches!(FetchError::from_status(401), FetchError::Blocked(401)));
        assert!(matches!(FetchError::from_status(403), FetchError::Blocked(403)));
        assert!(matches!(FetchError::from_status(404), FetchError::NotFound));
        assert!(matches!(FetchError::from_status(429), FetchError::RateLimited));
        assert!(matches!(
            FetchError::from_status(503),
            FetchError::ServerError(503)
        ));
        assert!(matches!(FetchError::from_status(418), FetchError::Status(418)));
    }

    #[test]
    fn blocked_predicate_only_matches_auth_failures() {
        assert!(FetchError::from_status(403).is_blocked());
        assert!(!FetchError::from_status(429).is_blocked());
        assert!(!FetchError::TimedOut.is_blocked());
    }

    #[test]
    fn messages_are_user_facing() {
        let msg = FetchError::from_status(404).to_string();
        assert!(msg.contains("restructured"));
        let msg = FetchError::from_status(500).to_string();
        assert!(msg.contains("technical difficulty"));
    }
}
