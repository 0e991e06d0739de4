//! Full-pipeline tests: a fixture storefront served from an ephemeral local
//! listener plus a scripted oracle, so the whole analysis runs without
//! touching the real network or a real model provider.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

use shoplens_backend::collector::FetchMode;
use shoplens_backend::models::ProgressEvent;
use shoplens_backend::oracle::{ChatMessage, GenerationOptions, Oracle, OracleError};
use shoplens_backend::orchestrator::{run_analysis, AnalysisOptions};
use shoplens_backend::positioning::POSITIONING_UNAVAILABLE;
use shoplens_backend::scoring::{SUMMARY_UNAVAILABLE, UNABLE_TO_ANALYZE};
use shoplens_backend::state::AppState;

// ---------------------------------------------------------------------------
// Fixture storefront
// ---------------------------------------------------------------------------

const HOMEPAGE: &str = r#"<html><head><title>Acme Outfitters</title></head><body>
<nav>
  <a href="/collections/boots">Boots Collection</a>
  <a href="/collections/bags">Bags Collection</a>
  <a href="/about">About us</a>
</nav>
<p>Gear for the long way round.</p>
</body></html>"#;

const BOOTS: &str = r#"<html><head><title>Boots</title></head><body>
<a href="/products/trail-boot">Trail Boot</a>
<a href="/products/city-boot">City Boot</a>
<a href="/products/trail-boot">Trail Boot (again)</a>
<a href="/collections/bags">Bags Collection</a>
</body></html>"#;

const BAGS: &str = r#"<html><head><title>Bags</title></head><body>
<a href="/products/tote">Canvas Tote</a>
<a href="/products/duffel">Weekend Duffel</a>
<a href="/products/trail-boot">Trail Boot</a>
</body></html>"#;

fn storefront() -> Router {
    Router::new()
        .route("/", get(|| async { Html(HOMEPAGE) }))
        .route("/collections/boots", get(|| async { Html(BOOTS) }))
        .route("/collections/bags", get(|| async { Html(BAGS) }))
        .route(
            "/products/{name}",
            get(|axum::extract::Path(name): axum::extract::Path<String>| async move {
                Html(format!(
                    "<html><head><title>{name}</title></head><body><h1>{name}</h1>\
                     <p>The {name} is cut from waxed canvas and full-grain leather, \
                     built for a decade of daily use.</p></body></html>"
                ))
            }),
        )
}

async fn spawn_site(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ---------------------------------------------------------------------------
// Scripted oracles
// ---------------------------------------------------------------------------

/// Dispatches on markers in the user prompt — each pipeline stage asks for a
/// distinct JSON shape.
struct ScriptedOracle {
    ranking: Value,
    score: Value,
    positioning: Value,
    summary: Value,
    calls: AtomicUsize,
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate_json(
        &self,
        messages: &[ChatMessage],
        _opts: &GenerationOptions,
    ) -> Result<Value, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let user = messages
            .iter()
            .find(|m| m.role == "user")
            .map(|m| m.content.as_str())
            .unwrap_or("");
        if user.contains("executiveSummary") {
            Ok(self.summary.clone())
        } else if user.contains("topProducts") {
            Ok(self.ranking.clone())
        } else if user.contains("{\"score\"") {
            Ok(self.score.clone())
        } else {
            Ok(self.positioning.clone())
        }
    }
}

/// Every model failed, every time — total oracle outage.
struct FailingOracle {
    calls: AtomicUsize,
}

#[async_trait]
impl Oracle for FailingOracle {
    async fn generate_json(
        &self,
        _messages: &[ChatMessage],
        _opts: &GenerationOptions,
    ) -> Result<Value, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::Exhausted { tried: 2 })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

async fn run_and_collect(state: AppState, target: &str) -> Vec<ProgressEvent> {
    let url = Url::parse(target).unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let options = AnalysisOptions {
        fetch_mode: FetchMode::Parallel,
        shuffle_seed: Some(42),
    };
    let handle = tokio::spawn(run_analysis(state, url, tx, cancel, options));

    let mut events = Vec::new();
    while let Some(ev) = rx.recv().await {
        events.push(ev);
    }
    handle.await.unwrap();
    events
}

fn terminal_count(events: &[ProgressEvent]) -> usize {
    events.iter().filter(|e| e.is_terminal()).count()
}

// ═══════════════════════════════════════════════════════════════════════════
//  Happy path + hallucination defense
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn happy_path_streams_events_and_filters_hallucinations() {
    let base = spawn_site(storefront()).await;

    let ranking = json!({
        "topProducts": [
            { "url": format!("{base}/products/trail-boot"), "title": "Trail Boot", "reason": "flagship" },
            { "url": "https://fake.example/products/ghost", "title": "Ghost", "reason": "invented" },
            { "url": format!("{base}/products/tote"), "title": "Canvas Tote", "reason": "distinct type" },
        ]
    });
    let oracle = Arc::new(ScriptedOracle {
        ranking,
        score: json!({ "score": 72, "summary": "Consistent voice across pages." }),
        positioning: json!({ "positioning": "Durable travel gear for people who buy once." }),
        summary: json!({ "executiveSummary": "Solid content with room to grow." }),
        calls: AtomicUsize::new(0),
    });
    let state = AppState::with_oracle(oracle.clone(), Vec::new());

    let events = run_and_collect(state, &format!("{base}/")).await;

    // Stage ordering: start first, then discovery results.
    assert!(matches!(events[0], ProgressEvent::Start { .. }));
    match &events[1] {
        ProgressEvent::Initial {
            collections,
            candidate_count,
            ..
        } => {
            assert_eq!(collections.len(), 2);
            // trail-boot deduped within boots and across groups.
            assert_eq!(*candidate_count, 4);
        }
        other => panic!("expected initial event, got {:?}", other),
    }

    // Exactly one terminal event, and it is last.
    assert_eq!(terminal_count(&events), 1);
    let last = events.last().unwrap();
    let result = match last {
        ProgressEvent::Complete { result } => result,
        other => panic!("expected complete, got {:?}", other),
    };

    // Each dimension settled exactly once, successfully.
    let mut categories: Vec<String> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::CategoryComplete { category, .. } => Some(category.clone()),
            ProgressEvent::CategoryError { category, .. } => Some(category.clone()),
            _ => None,
        })
        .collect();
    categories.sort();
    assert_eq!(
        categories,
        vec!["brandAlignment", "conversionEffectiveness", "seoAiBestPractices"]
    );

    // The hallucinated URL never surfaced; every selection is a candidate.
    let selected: Vec<&str> = result.top_products.iter().map(|p| p.url.as_str()).collect();
    assert_eq!(
        selected,
        vec![
            format!("{base}/products/trail-boot").as_str(),
            format!("{base}/products/tote").as_str(),
        ]
    );

    assert_eq!(result.stats.collections_count, 2);
    assert_eq!(result.stats.products_fetched_count, 2);
    assert_eq!(result.analysis.brand_alignment.score, 72);
    assert!(result.analysis.brand_alignment.ok);
    assert_eq!(
        result.analysis.inferred_brand_positioning,
        "Durable travel gear for people who buy once."
    );
    assert_eq!(
        result.analysis.executive_summary,
        "Solid content with room to grow."
    );
    assert!(result.analysis.problematic_content.is_empty());

    // 1 ranking + 1 positioning + 3 dimensions + 1 summary.
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 6);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Total oracle outage — degrade, don't abort
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn oracle_outage_degrades_but_still_completes() {
    let base = spawn_site(storefront()).await;
    let oracle = Arc::new(FailingOracle {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::with_oracle(oracle.clone(), Vec::new());

    let events = run_and_collect(state, &format!("{base}/")).await;

    // Pages were still fetched, so the run completes rather than erroring.
    assert_eq!(terminal_count(&events), 1);
    let result = match events.last().unwrap() {
        ProgressEvent::Complete { result } => result,
        other => panic!("expected complete, got {:?}", other),
    };

    // Ranking fell back to discovery order over all 4 candidates.
    assert_eq!(result.top_products.len(), 4);
    assert!(result
        .top_products
        .iter()
        .all(|p| p.reason.contains("discovery order")));

    // All three dimensions carry the sentinel, announced as category_error.
    let category_errors = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::CategoryError { .. }))
        .count();
    assert_eq!(category_errors, 3);
    for score in [
        &result.analysis.brand_alignment,
        &result.analysis.conversion_effectiveness,
        &result.analysis.seo_ai_best_practices,
    ] {
        assert_eq!(score.score, 0);
        assert_eq!(score.summary, UNABLE_TO_ANALYZE);
        assert!(!score.ok);
    }

    assert_eq!(result.analysis.inferred_brand_positioning, POSITIONING_UNAVAILABLE);
    assert_eq!(result.analysis.executive_summary, SUMMARY_UNAVAILABLE);
    assert!(oracle.calls.load(Ordering::SeqCst) >= 6);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Terminal errors
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn zero_category_links_errors_before_any_oracle_call() {
    let app = Router::new().route(
        "/",
        get(|| async {
            Html(r#"<html><body><a href="/about">About us</a><a href="/contact">Contact</a></body></html>"#)
        }),
    );
    let base = spawn_site(app).await;
    let oracle = Arc::new(FailingOracle {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::with_oracle(oracle.clone(), Vec::new());

    let events = run_and_collect(state, &format!("{base}/")).await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], ProgressEvent::Start { .. }));
    match &events[1] {
        ProgressEvent::Error { message } => {
            assert!(message.contains("category"), "unexpected message: {message}");
        }
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn blocked_homepage_reports_a_blocking_reason() {
    let app = Router::new().route(
        "/",
        get(|| async { (axum::http::StatusCode::FORBIDDEN, "go away") }),
    );
    let base = spawn_site(app).await;
    let oracle = Arc::new(FailingOracle {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::with_oracle(oracle, Vec::new());

    let events = run_and_collect(state, &format!("{base}/")).await;

    assert_eq!(terminal_count(&events), 1);
    match events.last().unwrap() {
        ProgressEvent::Error { message } => {
            assert!(message.contains("blocking"), "unexpected message: {message}");
        }
        other => panic!("expected error event, got {:?}", other),
    }
}

#[tokio::test]
async fn empty_category_pages_report_no_candidates() {
    let app = Router::new()
        .route(
            "/",
            get(|| async {
                Html(r#"<html><body><a href="/collections/empty">Empty Collection</a></body></html>"#)
            }),
        )
        .route(
            "/collections/empty",
            get(|| async { Html("<html><body><p>Nothing here yet.</p></body></html>") }),
        );
    let base = spawn_site(app).await;
    let oracle = Arc::new(FailingOracle {
        calls: AtomicUsize::new(0),
    });
    let state = AppState::with_oracle(oracle.clone(), Vec::new());

    let events = run_and_collect(state, &format!("{base}/")).await;

    match events.last().unwrap() {
        ProgressEvent::Error { message } => {
            assert!(
                message.contains("product URLs"),
                "unexpected message: {message}"
            );
        }
        other => panic!("expected error event, got {:?}", other),
    }
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}
