use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Links & discovery
// ---------------------------------------------------------------------------

/// A single anchor discovered on a page. Uniqueness key is the exact `url`
/// string — no normalization, so validation downstream can compare
/// byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
    /// Anchor label; may be empty (image-only cards).
    pub text: String,
}

impl Link {
    pub fn new(url: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            text: text.into(),
        }
    }
}

/// One discovered category page and the product links found on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionGroup {
    pub collection: Link,
    pub products: Vec<Link>,
}

// ---------------------------------------------------------------------------
// Collected content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageKind {
    Product,
    Category,
}

/// Content fetched for one selected page. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContent {
    pub url: String,
    pub page_type: PageKind,
    pub content: String,
}

/// Auxiliary, non-product-page evidence. Only the homepage is constructed
/// today, but the shape supports plural external sources (reviews, social,
/// press).
#[derive(Debug, Clone, Serialize)]
pub struct DigitalSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub source: String,
    pub content: String,
    pub url: String,
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Score for one evaluation dimension. `score` is 1–100 as reported by the
/// oracle; 0 is reserved for "could not score", in which case `ok` is false.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub score: u32,
    pub summary: String,
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblematicContent {
    pub content: String,
    pub issue: String,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedAnalysis {
    pub executive_summary: String,
    pub inferred_brand_positioning: String,
    pub brand_alignment: CategoryScore,
    pub conversion_effectiveness: CategoryScore,
    pub seo_ai_best_practices: CategoryScore,
    /// Reserved — always empty today.
    pub problematic_content: Vec<ProblematicContent>,
}

// ---------------------------------------------------------------------------
// Selection & final payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedProduct {
    pub url: String,
    pub title: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStats {
    pub collections_count: usize,
    pub products_fetched_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub collections: Vec<CollectionGroup>,
    pub top_products: Vec<SelectedProduct>,
    pub analysis: ConsolidatedAnalysis,
    pub stats: AnalysisStats,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Progress events
// ---------------------------------------------------------------------------

/// Events streamed to the client while an analysis runs. Exactly one
/// `complete` or one `error` terminates every run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Start {
        message: String,
    },
    Initial {
        message: String,
        collections: Vec<CollectionGroup>,
        #[serde(rename = "candidateCount")]
        candidate_count: usize,
    },
    ProductsFetched {
        message: String,
        count: usize,
    },
    Progress {
        message: String,
    },
    CategoryComplete {
        category: String,
        score: CategoryScore,
    },
    CategoryError {
        category: String,
        message: String,
    },
    Complete {
        result: Box<AnalysisResult>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete { .. } | ProgressEvent::Error { .. })
    }
}

// ---------------------------------------------------------------------------
// Requests & health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub name: String,
    pub available: bool,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub app: String,
    pub uptime_seconds: u64,
    pub providers: Vec<ProviderInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_events_are_snake_case_tagged() {
        let ev = ProgressEvent::CategoryComplete {
            category: "brandAlignment".to_string(),
            score: CategoryScore {
                score: 72,
                summary: "Strong voice.".to_string(),
                ok: true,
            },
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "category_complete");
        assert_eq!(v["score"]["score"], 72);
    }

    #[test]
    fn error_event_is_terminal() {
        let ev = ProgressEvent::Error {
            message: "no product URLs found".to_string(),
        };
        assert!(ev.is_terminal());
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "error");
    }

    #[test]
    fn analysis_result_uses_camel_case_on_the_wire() {
        let stats = AnalysisStats {
            collections_count: 2,
            products_fetched_count: 6,
        };
        let v = serde_json::to_value(&stats).unwrap();
        assert!(v.get("collectionsCount").is_some());
        assert!(v.get("productsFetchedCount").is_some());
    }
}
