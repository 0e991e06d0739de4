//! HTML link extraction.
//!
//! A DOM pass over `scraper` does the real work; a regex anchor scan is the
//! degraded path for markup the parser cannot make sense of. Malformed CSS is
//! a common parse hazard, so `<style>` blocks and stylesheet `<link>` tags are
//! stripped before parsing.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::models::Link;

// ---------------------------------------------------------------------------
// Href filtering
// ---------------------------------------------------------------------------

fn is_usable_href(href: &str) -> bool {
    !href.is_empty()
        && !href.starts_with('#')
        && !href.starts_with("javascript:")
        && !href.starts_with("mailto:")
        && !href.starts_with("tel:")
        && !href.starts_with("data:")
}

/// Resolve `href` against `base`, keeping only absolute http(s) URLs.
fn resolve(base: &Url, href: &str) -> Option<String> {
    let joined = base.join(href).ok()?;
    match joined.scheme() {
        "http" | "https" => Some(joined.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Style stripping
// ---------------------------------------------------------------------------

fn strip_styles(html: &str) -> String {
    let style_re = Regex::new(r"(?is)<style[^>]*>.*?</style>").expect("style regex is valid");
    let css_link_re = Regex::new(r#"(?i)<link[^>]*rel\s*=\s*["']?stylesheet["']?[^>]*>"#)
        .expect("stylesheet link regex is valid");
    let without_blocks = style_re.replace_all(html, "");
    css_link_re.replace_all(&without_blocks, "").into_owned()
}

// ---------------------------------------------------------------------------
// DOM extraction
// ---------------------------------------------------------------------------

/// Extract all anchors as `(absolute url, label)` pairs, deduplicated by exact
/// URL in first-seen order. Label priority: visible text, then `aria-label`,
/// then `title`. Callers that need non-empty labels filter on their side.
pub fn extract_links(html: &str, base: &Url) -> Vec<Link> {
    let cleaned = strip_styles(html);
    let doc = Html::parse_document(&cleaned);

    let mut links = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let sel = Selector::parse("a[href]").expect("anchor selector is valid");
    for el in doc.select(&sel) {
        let Some(href) = el.value().attr("href").map(str::trim) else {
            continue;
        };
        if !is_usable_href(href) {
            continue;
        }
        let Some(resolved) = resolve(base, href) else {
            continue;
        };
        if !seen.insert(resolved.clone()) {
            continue;
        }

        let raw_text = el.text().collect::<Vec<_>>().join(" ");
        let mut text = raw_text.split_whitespace().collect::<Vec<_>>().join(" ");
        if text.is_empty() {
            text = el
                .value()
                .attr("aria-label")
                .or_else(|| el.value().attr("title"))
                .unwrap_or("")
                .trim()
                .to_string();
        }

        links.push(Link::new(resolved, text));
    }

    // The parser recovered nothing usable — take the degraded path.
    if links.is_empty() {
        return extract_links_fallback(html, base);
    }
    links
}

// ---------------------------------------------------------------------------
// Regex fallback
// ---------------------------------------------------------------------------

/// Degraded anchor scan for markup the DOM pass could not use. Never panics;
/// malformed entries are silently skipped.
pub fn extract_links_fallback(html: &str, base: &Url) -> Vec<Link> {
    let anchor_re = Regex::new(r#"(?is)<a\s[^>]*?href\s*=\s*["']([^"']+)["'][^>]*>(.*?)</a>"#)
        .expect("anchor regex is valid");
    let tag_re = Regex::new(r"(?s)<[^>]*>").expect("tag regex is valid");

    let mut links = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for cap in anchor_re.captures_iter(html) {
        let href = cap[1].trim();
        if !is_usable_href(href) {
            continue;
        }
        let Some(resolved) = resolve(base, href) else {
            continue;
        };
        if !seen.insert(resolved.clone()) {
            continue;
        }

        let stripped = tag_re.replace_all(&cap[2], " ");
        let text = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        links.push(Link::new(resolved, text));
    }
    links
}

// ---------------------------------------------------------------------------
// Visible text
// ---------------------------------------------------------------------------

const NOISE_TAGS: &[&str] = &[
    "script", "style", "noscript", "svg", "iframe", "nav", "header", "footer",
];

fn collect_text(element: ElementRef, out: &mut String) {
    if NOISE_TAGS.contains(&element.value().name()) {
        return;
    }
    for child in element.children() {
        match child.value() {
            scraper::node::Node::Text(text) => {
                let t = text.text.trim();
                if !t.is_empty() {
                    out.push_str(t);
                    out.push(' ');
                }
            }
            scraper::node::Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
            }
            _ => {}
        }
    }
}

/// Visible-text rendition of a page, used for oracle prompts. The `<title>`
/// is kept as a leading line; whitespace is collapsed.
pub fn page_text(html: &str) -> String {
    let doc = Html::parse_document(html);

    let title = Selector::parse("title")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let body_sel = Selector::parse("body").expect("body selector is valid");
    let mut raw = String::new();
    if let Some(body) = doc.select(&body_sel).next() {
        collect_text(body, &mut raw);
    }
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");

    match title {
        Some(t) if !text.is_empty() => format!("{}\n{}", t, text),
        Some(t) => t,
        None => text,
    }
}
