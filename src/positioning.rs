//! Brand-positioning inference.
//!
//! One oracle call that reduces the collected pages plus the auxiliary
//! digital sources into a short positioning statement. Positioning is
//! advisory input to later stages, so total failure degrades to a fixed
//! placeholder instead of raising.

use crate::models::{DigitalSource, PageContent, PageKind};
use crate::oracle::{ChatMessage, GenerationOptions, Oracle};
use serde_json::Value;

pub const POSITIONING_UNAVAILABLE: &str =
    "Brand positioning could not be inferred from the collected pages.";

const PAGE_BUDGET_TOTAL: usize = 20_000;
const PAGE_BUDGET_FLOOR: usize = 2_000;
const SOURCE_BUDGET_TOTAL: usize = 8_000;
const SOURCE_BUDGET_FLOOR: usize = 1_000;

// ---------------------------------------------------------------------------
// Truncation
// ---------------------------------------------------------------------------

/// Truncate to at most `max` bytes without splitting a UTF-8 character.
pub(crate) fn truncate_chars(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let boundary = s
        .char_indices()
        .take_while(|(i, _)| *i < max)
        .last()
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    &s[..boundary]
}

/// Even split of `total` across `count` items, never below `floor`.
pub(crate) fn per_item_budget(total: usize, floor: usize, count: usize) -> usize {
    if count == 0 {
        return 0;
    }
    (total / count).max(floor)
}

// ---------------------------------------------------------------------------
// Prompt
// ---------------------------------------------------------------------------

fn build_messages(pages: &[PageContent], sources: &[DigitalSource]) -> Vec<ChatMessage> {
    let page_budget = per_item_budget(PAGE_BUDGET_TOTAL, PAGE_BUDGET_FLOOR, pages.len());
    let source_budget = per_item_budget(SOURCE_BUDGET_TOTAL, SOURCE_BUDGET_FLOOR, sources.len());

    let mut corpus = String::new();
    for page in pages {
        let kind = match page.page_type {
            PageKind::Product => "product page",
            PageKind::Category => "category page",
        };
        corpus.push_str(&format!(
            "## {} ({})\n{}\n\n",
            page.url,
            kind,
            truncate_chars(&page.content, page_budget)
        ));
    }
    for source in sources {
        corpus.push_str(&format!(
            "## {} ({})\n{}\n\n",
            source.source,
            source.kind,
            truncate_chars(&source.content, source_budget)
        ));
    }

    vec![
        ChatMessage::system(
            "You are a brand strategist. You infer how a brand positions itself \
             from the copy on its own pages.",
        ),
        ChatMessage::user(format!(
            "From the page content below, write a 2-4 sentence brand positioning \
             statement covering: target audience, offering, differentiation, and \
             value proposition.\n\
             Respond with JSON only: {{\"positioning\": \"...\"}}\n\n{}",
            corpus
        )),
    ]
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn infer_positioning(
    oracle: &dyn Oracle,
    pages: &[PageContent],
    sources: &[DigitalSource],
) -> String {
    let messages = build_messages(pages, sources);

    match oracle.generate_json(&messages, &GenerationOptions::default()).await {
        Ok(value) => value
            .get("positioning")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                tracing::warn!("positioning: response missing 'positioning' field");
                POSITIONING_UNAVAILABLE.to_string()
            }),
        Err(e) => {
            tracing::warn!("positioning: oracle unavailable ({})", e);
            POSITIONING_UNAVAILABLE.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate_chars(s, 3);
        assert!(t.len() <= 3 || t.is_char_boundary(t.len()));
        assert!(s.starts_with(t));
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn budget_splits_evenly_with_floor() {
        // 10 pages out of 20k → even split would be 2k, at the floor.
        assert_eq!(per_item_budget(20_000, 2_000, 10), 2_000);
        // 4 pages → 5k each.
        assert_eq!(per_item_budget(20_000, 2_000, 4), 5_000);
        // 40 pages → floor wins.
        assert_eq!(per_item_budget(20_000, 2_000, 40), 2_000);
        assert_eq!(per_item_budget(20_000, 2_000, 0), 0);
    }

    #[test]
    fn prompt_includes_pages_and_sources() {
        let pages = vec![PageContent {
            url: "https://x.com/p/a".to_string(),
            page_type: PageKind::Product,
            content: "Waxed canvas jacket built for wet climates.".to_string(),
        }];
        let sources = vec![DigitalSource {
            kind: "website".to_string(),
            source: "homepage".to_string(),
            content: "Gear for the long way round.".to_string(),
            url: "https://x.com".to_string(),
        }];
        let messages = build_messages(&pages, &sources);
        let user = &messages[1].content;
        assert!(user.contains("Waxed canvas jacket"));
        assert!(user.contains("long way round"));
        assert!(user.contains("positioning"));
    }
}
