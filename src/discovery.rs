//! Candidate discovery: homepage links → category pages → product candidates.

use reqwest::Client;
use std::collections::HashSet;
use url::Url;

use crate::classify::{classify, LinkKind};
use crate::extract::extract_links;
use crate::fetch::fetch_all;
use crate::models::{CollectionGroup, Link};

/// Categories followed from the homepage, in order of appearance.
pub const MAX_CATEGORY_PAGES: usize = 3;
/// Product links kept per category page.
pub const MAX_PRODUCTS_PER_GROUP: usize = 20;

#[derive(Debug, Clone)]
pub struct Discovery {
    pub collections: Vec<CollectionGroup>,
    /// Flattened product candidates, deduplicated across groups in group
    /// order. Every entry was observed as an anchor on its category page.
    pub candidates: Vec<Link>,
}

#[derive(Debug, thiserror::Error)]
pub enum DiscoverError {
    #[error("no category links were found on the homepage — this may not be a standard storefront")]
    NoCategories,
    #[error("no product URLs were found in the discovered categories")]
    NoCandidates,
}

/// Walk the already-fetched homepage: pick the first `MAX_CATEGORY_PAGES`
/// category links in appearance order, fetch each concurrently, and keep the
/// product links found on them. Category links require non-empty anchor text
/// (nav noise is usually unlabeled); product links may be image-only.
pub async fn discover(
    client: &Client,
    base: &Url,
    homepage_html: &str,
) -> Result<Discovery, DiscoverError> {
    let homepage_links = extract_links(homepage_html, base);
    tracing::debug!("discovery: {} links on homepage", homepage_links.len());

    let category_links: Vec<Link> = homepage_links
        .iter()
        .filter(|l| !l.text.trim().is_empty())
        .filter(|l| classify(&l.url, &l.text) == LinkKind::Category)
        .take(MAX_CATEGORY_PAGES)
        .cloned()
        .collect();

    if category_links.is_empty() {
        return Err(DiscoverError::NoCategories);
    }

    let urls: Vec<String> = category_links.iter().map(|l| l.url.clone()).collect();
    let fetched = fetch_all(client, &urls).await;

    let mut collections = Vec::new();
    for (link, (url, outcome)) in category_links.iter().zip(fetched) {
        let html = match outcome {
            Ok(html) => html,
            Err(e) => {
                tracing::warn!("discovery: category fetch failed for {}: {}", url, e);
                continue;
            }
        };
        let page_base = Url::parse(&url).unwrap_or_else(|_| base.clone());

        let mut seen_in_group: HashSet<String> = HashSet::new();
        let products: Vec<Link> = extract_links(&html, &page_base)
            .into_iter()
            .filter(|l| classify(&l.url, &l.text) == LinkKind::Product)
            .filter(|l| seen_in_group.insert(l.url.clone()))
            .take(MAX_PRODUCTS_PER_GROUP)
            .collect();

        tracing::info!(
            "discovery: category '{}' yielded {} products",
            link.text,
            products.len()
        );
        collections.push(CollectionGroup {
            collection: link.clone(),
            products,
        });
    }

    // Global dedup across groups, first occurrence wins.
    let mut seen: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();
    for group in &collections {
        for product in &group.products {
            if seen.insert(product.url.clone()) {
                candidates.push(product.clone());
            }
        }
    }

    if candidates.is_empty() {
        return Err(DiscoverError::NoCandidates);
    }

    Ok(Discovery {
        collections,
        candidates,
    })
}
