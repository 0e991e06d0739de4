//! Oracle-assisted product ranking with hallucination defense.
//!
//! The oracle is untrusted for URL fabrication. Defense is two-stage: the
//! prompt instructs it to choose only from the supplied list, and every
//! returned URL is checked for byte-identical membership in the candidate set
//! before it is surfaced downstream. Either stage failing degrades to the
//! deterministic first-N selection.

use serde_json::Value;
use std::collections::HashSet;

use crate::models::{Link, SelectedProduct};
use crate::oracle::{ChatMessage, GenerationOptions, Oracle};

/// Candidates sent to the oracle are capped to keep the prompt bounded.
pub const MAX_RANKER_CANDIDATES: usize = 100;
/// Products surfaced to the rest of the pipeline.
pub const MAX_SELECTED: usize = 10;

const FALLBACK_REASON: &str = "Selected in discovery order (ranking unavailable)";

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn build_messages(candidates: &[Link]) -> Vec<ChatMessage> {
    let listing: String = candidates
        .iter()
        .enumerate()
        .map(|(i, l)| {
            let label = if l.text.is_empty() { "(no title)" } else { &l.text };
            format!("{}. {} — {}", i + 1, l.url, label)
        })
        .collect::<Vec<_>>()
        .join("\n");

    vec![
        ChatMessage::system(
            "You evaluate e-commerce product pages. You select a representative \
             subset of product URLs for a content-quality review: cover distinct \
             product types and price points where the titles allow it.",
        ),
        ChatMessage::user(format!(
            "Below are product page URLs discovered on a storefront. Select up to \
             {} that best represent the catalog.\n\
             Respond with JSON only, in this exact shape:\n\
             {{\"topProducts\": [{{\"url\": \"...\", \"title\": \"...\", \"reason\": \"...\"}}]}}\n\
             Select ONLY from the list below. NEVER invent, modify, or complete a URL.\n\n{}",
            MAX_SELECTED, listing
        )),
    ]
}

// ---------------------------------------------------------------------------
// Validation & fallback
// ---------------------------------------------------------------------------

/// Keep only selections whose `url` is byte-identical to a candidate URL.
/// Anything else — unknown URLs, missing fields, duplicates — is dropped.
pub fn validate_selection(value: &Value, candidates: &[Link]) -> Vec<SelectedProduct> {
    let allowed: HashSet<&str> = candidates.iter().map(|l| l.url.as_str()).collect();
    let by_url = |url: &str| candidates.iter().find(|l| l.url == url);

    let Some(items) = value.get("topProducts").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        let Some(url) = item.get("url").and_then(Value::as_str) else {
            continue;
        };
        if !allowed.contains(url) {
            tracing::warn!("ranker: discarding hallucinated URL {}", url);
            continue;
        }
        if !seen.insert(url.to_string()) {
            continue;
        }

        let title = item
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|t| !t.is_empty())
            .or_else(|| by_url(url).map(|l| l.text.clone()).filter(|t| !t.is_empty()))
            .unwrap_or_else(|| url.to_string());
        let reason = item
            .get("reason")
            .and_then(Value::as_str)
            .filter(|r| !r.is_empty())
            .unwrap_or("Selected by the ranking model")
            .to_string();

        out.push(SelectedProduct {
            url: url.to_string(),
            title,
            reason,
        });
        if out.len() == MAX_SELECTED {
            break;
        }
    }
    out
}

/// Deterministic selection: the first `MAX_SELECTED` candidates in discovery
/// order. Non-empty whenever the candidate set is non-empty.
pub fn fallback_selection(candidates: &[Link]) -> Vec<SelectedProduct> {
    candidates
        .iter()
        .take(MAX_SELECTED)
        .map(|l| SelectedProduct {
            url: l.url.clone(),
            title: if l.text.is_empty() {
                l.url.clone()
            } else {
                l.text.clone()
            },
            reason: FALLBACK_REASON.to_string(),
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Ask the oracle for a ranked subset of `candidates`. Guaranteed non-empty
/// for non-empty input; every returned URL is a member of `candidates`.
pub async fn rank_products(oracle: &dyn Oracle, candidates: &[Link]) -> Vec<SelectedProduct> {
    let capped = &candidates[..candidates.len().min(MAX_RANKER_CANDIDATES)];
    let messages = build_messages(capped);

    match oracle.generate_json(&messages, &GenerationOptions::default()).await {
        Ok(value) => {
            let validated = validate_selection(&value, capped);
            if validated.is_empty() {
                tracing::warn!(
                    "ranker: oracle selection empty after validation — using discovery order"
                );
                fallback_selection(capped)
            } else {
                validated
            }
        }
        Err(e) => {
            tracing::warn!("ranker: oracle unavailable ({}), using discovery order", e);
            fallback_selection(capped)
        }
    }
}
