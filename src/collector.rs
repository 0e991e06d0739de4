//! Content collection for the selected product pages.
//!
//! Tolerant of partial failure: a page that cannot be fetched is logged and
//! dropped, never aborting the batch. Pages with identical extracted content
//! are deduplicated by hash so boilerplate duplicates don't skew scoring.

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use sha2::{Digest, Sha256};

use crate::extract::page_text;
use crate::fetch::{fetch_all, fetch_page};
use crate::models::{PageContent, PageKind, SelectedProduct};

/// Spacing between requests in polite mode — a soft rate-limit courtesy that
/// reduces block risk.
const POLITE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// All pages at once; favors latency.
    Parallel,
    /// One page per second; favors not getting blocked.
    Polite,
}

fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

fn to_page_content(url: String, html: &str) -> PageContent {
    let text = page_text(html);
    PageContent {
        url,
        page_type: PageKind::Product,
        // Image-heavy product pages can render to almost no text; keep the
        // raw markup in that case so scoring still has something to read.
        content: if text.is_empty() {
            html.to_string()
        } else {
            text
        },
    }
}

/// Fetch the selected product pages, dropping failures and duplicate content.
/// An empty result is the caller's terminal "nothing to analyze" condition.
pub async fn collect_pages(
    client: &Client,
    selected: &[SelectedProduct],
    mode: FetchMode,
) -> Vec<PageContent> {
    let mut pages = Vec::new();
    let mut seen_hashes: HashSet<String> = HashSet::new();

    match mode {
        FetchMode::Parallel => {
            let urls: Vec<String> = selected.iter().map(|s| s.url.clone()).collect();
            for (url, outcome) in fetch_all(client, &urls).await {
                match outcome {
                    Ok(html) => {
                        let page = to_page_content(url, &html);
                        if seen_hashes.insert(content_hash(&page.content)) {
                            pages.push(page);
                        }
                    }
                    Err(e) => tracing::warn!("collector: dropping {}: {}", url, e),
                }
            }
        }
        FetchMode::Polite => {
            for (i, product) in selected.iter().enumerate() {
                if i > 0 {
                    tokio::time::sleep(POLITE_DELAY).await;
                }
                match fetch_page(client, &product.url).await {
                    Ok(html) => {
                        let page = to_page_content(product.url.clone(), &html);
                        if seen_hashes.insert(content_hash(&page.content)) {
                            pages.push(page);
                        }
                    }
                    Err(e) => tracing::warn!("collector: dropping {}: {}", product.url, e),
                }
            }
        }
    }

    tracing::info!(
        "collector: {} of {} pages collected",
        pages.len(),
        selected.len()
    );
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_hash_is_stable_and_distinguishes_content() {
        assert_eq!(content_hash("abc"), content_hash("abc"));
        assert_ne!(content_hash("abc"), content_hash("abd"));
        assert_eq!(content_hash("abc").len(), 16);
    }

    #[test]
    fn empty_extraction_falls_back_to_raw_html() {
        let html = "<html><body><img src=\"x.png\"></body></html>";
        let page = to_page_content("https://x.com/p/a".to_string(), html);
        assert_eq!(page.content, html);
        assert_eq!(page.page_type, PageKind::Product);
    }

    #[test]
    fn visible_text_is_preferred_over_markup() {
        let html = "<html><head><title>Tent</title></head><body><p>Two-person tent.</p></body></html>";
        let page = to_page_content("https://x.com/p/t".to_string(), html);
        assert!(page.content.contains("Two-person tent."));
        assert!(!page.content.contains("<p>"));
    }
}
