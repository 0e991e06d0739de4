//! Per-dimension content scoring and the executive summary.
//!
//! Each of the three fixed dimensions is an independent oracle call carrying
//! the same content with a dimension-specific prompt. Dispatch order is
//! shuffled (seedable, so tests can pin it) — purely cosmetic, to avoid
//! positional bias when a human reviews repeated runs. A failed dimension
//! becomes the 0/"unable to analyze" sentinel and never cancels its siblings.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde_json::Value;

use crate::models::{CategoryScore, DigitalSource, PageContent};
use crate::oracle::{ChatMessage, GenerationOptions, Oracle, OracleError};
use crate::positioning::{per_item_budget, truncate_chars};

pub const UNABLE_TO_ANALYZE: &str = "unable to analyze";
pub const SUMMARY_UNAVAILABLE: &str =
    "An executive summary could not be generated for this analysis.";

const CORPUS_BUDGET_TOTAL: usize = 20_000;
const CORPUS_BUDGET_FLOOR: usize = 2_000;

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dimension {
    BrandAlignment,
    ConversionEffectiveness,
    SeoAiBestPractices,
}

impl Dimension {
    pub const ALL: [Dimension; 3] = [
        Dimension::BrandAlignment,
        Dimension::ConversionEffectiveness,
        Dimension::SeoAiBestPractices,
    ];

    /// Wire key used in events and the final payload.
    pub fn key(self) -> &'static str {
        match self {
            Dimension::BrandAlignment => "brandAlignment",
            Dimension::ConversionEffectiveness => "conversionEffectiveness",
            Dimension::SeoAiBestPractices => "seoAiBestPractices",
        }
    }

    pub fn display(self) -> &'static str {
        match self {
            Dimension::BrandAlignment => "brand alignment",
            Dimension::ConversionEffectiveness => "conversion effectiveness",
            Dimension::SeoAiBestPractices => "SEO & AI discoverability",
        }
    }

    fn focus(self) -> &'static str {
        match self {
            Dimension::BrandAlignment => {
                "how consistently the product copy reflects the brand's \
                 positioning: voice, tone, terminology, and promises"
            }
            Dimension::ConversionEffectiveness => {
                "how well the product copy drives purchase decisions: clarity of \
                 benefits, specificity, objection handling, calls to action, and \
                 trust signals"
            }
            Dimension::SeoAiBestPractices => {
                "how discoverable the content is for search engines and AI \
                 assistants: descriptive titles, concrete product attributes, \
                 natural keyword usage, and machine-readable clarity"
            }
        }
    }
}

/// The three dimensions in randomized dispatch order. `seed` pins the order
/// for tests; `None` uses thread-local entropy.
pub fn shuffled_dimensions(seed: Option<u64>) -> Vec<Dimension> {
    let mut dims = Dimension::ALL.to_vec();
    match seed {
        Some(s) => dims.shuffle(&mut StdRng::seed_from_u64(s)),
        None => dims.shuffle(&mut rand::thread_rng()),
    }
    dims
}

// ---------------------------------------------------------------------------
// Shared corpus
// ---------------------------------------------------------------------------

/// The content block shared by all three dimension calls.
pub fn build_corpus(pages: &[PageContent], sources: &[DigitalSource]) -> String {
    let budget = per_item_budget(CORPUS_BUDGET_TOTAL, CORPUS_BUDGET_FLOOR, pages.len());
    let mut corpus = String::new();
    for page in pages {
        corpus.push_str(&format!(
            "## {}\n{}\n\n",
            page.url,
            truncate_chars(&page.content, budget)
        ));
    }
    for source in sources {
        corpus.push_str(&format!(
            "## {} ({})\n{}\n\n",
            source.source,
            source.kind,
            truncate_chars(&source.content, CORPUS_BUDGET_FLOOR)
        ));
    }
    corpus
}

// ---------------------------------------------------------------------------
// Per-dimension scoring
// ---------------------------------------------------------------------------

fn parse_score(value: &Value) -> Option<CategoryScore> {
    let raw = value.get("score").and_then(Value::as_u64)?;
    let summary = value
        .get("summary")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())?;
    Some(CategoryScore {
        // 0 is reserved for "could not score"; legitimate scores are 1–100.
        score: (raw as u32).clamp(1, 100),
        summary: summary.to_string(),
        ok: true,
    })
}

/// Sentinel for a dimension the oracle could not score.
pub fn placeholder_score() -> CategoryScore {
    CategoryScore {
        score: 0,
        summary: UNABLE_TO_ANALYZE.to_string(),
        ok: false,
    }
}

pub async fn score_dimension(
    oracle: &dyn Oracle,
    dimension: Dimension,
    corpus: &str,
    positioning: &str,
) -> Result<CategoryScore, OracleError> {
    let messages = vec![
        ChatMessage::system(
            "You are a senior e-commerce content strategist reviewing a \
             storefront's product content.",
        ),
        ChatMessage::user(format!(
            "Evaluate {}.\n\
             Inferred brand positioning: {}\n\n\
             Respond with JSON only: {{\"score\": <integer 1-100>, \"summary\": \
             \"1-3 sentences\"}}\n\n{}",
            dimension.focus(),
            positioning,
            corpus
        )),
    ];

    let value = oracle
        .generate_json(&messages, &GenerationOptions::default())
        .await?;
    parse_score(&value).ok_or_else(|| {
        OracleError::Parse(format!(
            "{} response missing score or summary",
            dimension.key()
        ))
    })
}

// ---------------------------------------------------------------------------
// Executive summary
// ---------------------------------------------------------------------------

pub async fn executive_summary(
    oracle: &dyn Oracle,
    positioning: &str,
    scores: &[(Dimension, CategoryScore)],
) -> String {
    let breakdown: String = scores
        .iter()
        .map(|(dim, score)| {
            format!(
                "- {}: {}/100 — {}",
                dim.display(),
                score.score,
                score.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let messages = vec![
        ChatMessage::system(
            "You write executive summaries of e-commerce content audits for \
             brand owners. Plain language, no jargon.",
        ),
        ChatMessage::user(format!(
            "Brand positioning: {}\n\nDimension results:\n{}\n\n\
             Write a 3-5 sentence executive summary of this audit: overall \
             verdict first, then the most important strength and the most \
             important gap.\n\
             Respond with JSON only: {{\"executiveSummary\": \"...\"}}",
            positioning, breakdown
        )),
    ];

    match oracle.generate_json(&messages, &GenerationOptions::default()).await {
        Ok(value) => value
            .get("executiveSummary")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                tracing::warn!("scoring: summary response missing 'executiveSummary'");
                SUMMARY_UNAVAILABLE.to_string()
            }),
        Err(e) => {
            tracing::warn!("scoring: executive summary unavailable ({})", e);
            SUMMARY_UNAVAILABLE.to_string()
        }
    }
}
