//! The streaming analysis pipeline.
//!
//! Stages: collecting → ranking → fetching → scoring → summarizing, ending in
//! exactly one `complete` or one `error` event. The orchestrator only knows
//! an mpsc sink — the transport layer decides how events reach the client.
//! Two timeout tiers apply: a short homepage probe ("did the site respond at
//! all") and a long whole-analysis ceiling.

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::collector::{collect_pages, FetchMode};
use crate::discovery::{discover, DiscoverError};
use crate::fetch::{fetch_page, FetchError};
use crate::models::{
    AnalysisResult, AnalysisStats, ConsolidatedAnalysis, DigitalSource, ProgressEvent,
};
use crate::positioning::infer_positioning;
use crate::ranker::rank_products;
use crate::scoring::{
    build_corpus, executive_summary, placeholder_score, score_dimension, shuffled_dimensions,
    Dimension,
};
use crate::state::AppState;

pub const SITE_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub fetch_mode: FetchMode,
    /// Pins the dimension dispatch order; `None` shuffles with real entropy.
    pub shuffle_seed: Option<u64>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            fetch_mode: FetchMode::Parallel,
            shuffle_seed: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage plumbing
// ---------------------------------------------------------------------------

enum StageEnd {
    /// Terminal failure — one `error` event with this reason, then stop.
    Failed(String),
    /// The client went away; stop quietly, nobody is listening.
    Disconnected,
}

async fn emit(tx: &mpsc::Sender<ProgressEvent>, event: ProgressEvent) -> Result<(), StageEnd> {
    tx.send(event).await.map_err(|_| StageEnd::Disconnected)
}

fn homepage_failure(err: &FetchError) -> String {
    match err {
        FetchError::Blocked(_) => {
            "The site appears to be blocking automated access. Some storefronts \
             reject analysis tools — try again later or analyze a different site."
                .to_string()
        }
        FetchError::RateLimited => {
            "The site is rate-limiting requests right now. Wait a minute and retry.".to_string()
        }
        FetchError::TimedOut => {
            "The site did not respond in time. It may be down or very slow.".to_string()
        }
        FetchError::NotFound => {
            "The homepage could not be found (HTTP 404). Double-check the URL.".to_string()
        }
        other => format!("The homepage could not be fetched: {}", other),
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run one full analysis, writing progress events into `tx`. Every run ends
/// with exactly one `complete` or `error` event unless the receiver is
/// dropped or `cancel` fires first, in which case the pipeline is abandoned
/// best-effort and nothing further is emitted.
pub async fn run_analysis(
    state: AppState,
    target: Url,
    tx: mpsc::Sender<ProgressEvent>,
    cancel: CancellationToken,
    options: AnalysisOptions,
) {
    let run_id = Uuid::new_v4();
    tracing::info!("analysis[{}]: starting for {}", run_id, target);

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("analysis[{}]: cancelled by client", run_id);
        }
        outcome = tokio::time::timeout(ANALYSIS_TIMEOUT, run_pipeline(&state, &target, &tx, &options)) => {
            match outcome {
                Ok(Ok(())) => tracing::info!("analysis[{}]: complete", run_id),
                Ok(Err(StageEnd::Failed(reason))) => {
                    tracing::warn!("analysis[{}]: failed: {}", run_id, reason);
                    let _ = tx.send(ProgressEvent::Error { message: reason }).await;
                }
                Ok(Err(StageEnd::Disconnected)) => {
                    tracing::info!("analysis[{}]: client disconnected", run_id);
                }
                Err(_) => {
                    tracing::warn!("analysis[{}]: timed out", run_id);
                    let _ = tx
                        .send(ProgressEvent::Error {
                            message: format!(
                                "The analysis did not finish within {} seconds. The site \
                                 may be very slow or very large — try again later.",
                                ANALYSIS_TIMEOUT.as_secs()
                            ),
                        })
                        .await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

async fn run_pipeline(
    state: &AppState,
    target: &Url,
    tx: &mpsc::Sender<ProgressEvent>,
    options: &AnalysisOptions,
) -> Result<(), StageEnd> {
    // ── collecting ──────────────────────────────────────────────────────
    emit(
        tx,
        ProgressEvent::Start {
            message: format!("Analyzing {}", target),
        },
    )
    .await?;

    let homepage_html =
        match tokio::time::timeout(SITE_PROBE_TIMEOUT, fetch_page(&state.client, target.as_str()))
            .await
        {
            Err(_) => {
                return Err(StageEnd::Failed(format!(
                    "The site did not respond within {} seconds. It may be down, \
                     or blocking automated access.",
                    SITE_PROBE_TIMEOUT.as_secs()
                )))
            }
            Ok(Err(e)) => return Err(StageEnd::Failed(homepage_failure(&e))),
            Ok(Ok(html)) => html,
        };

    // Both discovery failures mean "nothing to analyze" — terminal, and
    // reported before any oracle call is attempted.
    let discovery = discover(&state.client, target, &homepage_html)
        .await
        .map_err(|e: DiscoverError| StageEnd::Failed(e.to_string()))?;

    // ── ranking ─────────────────────────────────────────────────────────
    emit(
        tx,
        ProgressEvent::Initial {
            message: format!(
                "Discovered {} collections with {} product candidates",
                discovery.collections.len(),
                discovery.candidates.len()
            ),
            collections: discovery.collections.clone(),
            candidate_count: discovery.candidates.len(),
        },
    )
    .await?;

    let selected = rank_products(state.oracle.as_ref(), &discovery.candidates).await;

    // ── fetching ────────────────────────────────────────────────────────
    let pages = collect_pages(&state.client, &selected, options.fetch_mode).await;
    if pages.is_empty() {
        return Err(StageEnd::Failed(
            "None of the selected product pages could be fetched — the site may \
             be blocking automated access."
                .to_string(),
        ));
    }
    emit(
        tx,
        ProgressEvent::ProductsFetched {
            message: format!("Fetched {} product pages", pages.len()),
            count: pages.len(),
        },
    )
    .await?;

    let sources = vec![DigitalSource {
        kind: "website".to_string(),
        source: "homepage".to_string(),
        content: crate::extract::page_text(&homepage_html),
        url: target.to_string(),
    }];

    // ── scoring ─────────────────────────────────────────────────────────
    emit(
        tx,
        ProgressEvent::Progress {
            message: "Inferring brand positioning".to_string(),
        },
    )
    .await?;
    let positioning = infer_positioning(state.oracle.as_ref(), &pages, &sources).await;

    let corpus = build_corpus(&pages, &sources);
    let dimensions = shuffled_dimensions(options.shuffle_seed);

    let mut set = JoinSet::new();
    for dimension in dimensions {
        emit(
            tx,
            ProgressEvent::Progress {
                message: format!("Scoring {}", dimension.display()),
            },
        )
        .await?;
        let oracle = state.oracle.clone();
        let corpus = corpus.clone();
        let positioning = positioning.clone();
        set.spawn(async move {
            let result = score_dimension(oracle.as_ref(), dimension, &corpus, &positioning).await;
            (dimension, result)
        });
    }

    let mut scores: HashMap<Dimension, crate::models::CategoryScore> = HashMap::new();
    while let Some(joined) = set.join_next().await {
        let Ok((dimension, result)) = joined else {
            continue;
        };
        match result {
            Ok(score) => {
                emit(
                    tx,
                    ProgressEvent::CategoryComplete {
                        category: dimension.key().to_string(),
                        score: score.clone(),
                    },
                )
                .await?;
                scores.insert(dimension, score);
            }
            Err(e) => {
                tracing::warn!("scoring: {} failed: {}", dimension.key(), e);
                emit(
                    tx,
                    ProgressEvent::CategoryError {
                        category: dimension.key().to_string(),
                        message: format!("{} could not be scored", dimension.display()),
                    },
                )
                .await?;
                scores.insert(dimension, placeholder_score());
            }
        }
    }
    // A panicked scoring task never reported; give its dimension the sentinel
    // so every dimension settles exactly once.
    for dimension in Dimension::ALL {
        if !scores.contains_key(&dimension) {
            emit(
                tx,
                ProgressEvent::CategoryError {
                    category: dimension.key().to_string(),
                    message: format!("{} could not be scored", dimension.display()),
                },
            )
            .await?;
            scores.insert(dimension, placeholder_score());
        }
    }

    // ── summarizing ─────────────────────────────────────────────────────
    emit(
        tx,
        ProgressEvent::Progress {
            message: "Synthesizing executive summary".to_string(),
        },
    )
    .await?;
    let ordered: Vec<(Dimension, crate::models::CategoryScore)> = Dimension::ALL
        .iter()
        .map(|d| (*d, scores[d].clone()))
        .collect();
    let summary = executive_summary(state.oracle.as_ref(), &positioning, &ordered).await;

    let analysis = ConsolidatedAnalysis {
        executive_summary: summary,
        inferred_brand_positioning: positioning,
        brand_alignment: scores[&Dimension::BrandAlignment].clone(),
        conversion_effectiveness: scores[&Dimension::ConversionEffectiveness].clone(),
        seo_ai_best_practices: scores[&Dimension::SeoAiBestPractices].clone(),
        problematic_content: Vec::new(),
    };

    let result = AnalysisResult {
        stats: AnalysisStats {
            collections_count: discovery.collections.len(),
            products_fetched_count: pages.len(),
        },
        collections: discovery.collections,
        top_products: selected,
        analysis,
        generated_at: Utc::now(),
    };

    emit(
        tx,
        ProgressEvent::Complete {
            result: Box::new(result),
        },
    )
    .await?;
    Ok(())
}
