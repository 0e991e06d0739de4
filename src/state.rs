//! Application state.

use std::sync::Arc;
use std::time::Instant;

use reqwest::Client;
use tokio::sync::RwLock;

use crate::models::ProviderInfo;
use crate::oracle::{FailoverOracle, ModelHealth, ModelId, Oracle};

/// Central application state. Clone-friendly — everything shared is an Arc.
#[derive(Clone)]
pub struct AppState {
    pub client: Client,
    pub oracle: Arc<dyn Oracle>,
    /// Advisory model-health caches used by the failover oracle. Held here
    /// (not as a module global) so tests can reset them between runs.
    pub oracle_health: Arc<RwLock<ModelHealth>>,
    pub roster: Vec<ModelId>,
    pub providers: Vec<ProviderInfo>,
    pub start_time: Instant,
}

impl AppState {
    /// Build state from the environment: `ORACLE_MODELS`,
    /// `GOOGLE_API_KEY`/`GEMINI_API_KEY`, `ANTHROPIC_API_KEY`.
    pub fn new() -> Self {
        let client = build_http_client();
        let health = Arc::new(RwLock::new(ModelHealth::default()));
        let oracle = FailoverOracle::from_env(client.clone(), health.clone());
        let roster = oracle.roster().to_vec();
        let providers = build_providers(&roster);

        tracing::info!(
            "AppState initialised — {} oracle models, {} providers",
            roster.len(),
            providers.len()
        );

        Self {
            client,
            oracle: Arc::new(oracle),
            oracle_health: health,
            roster,
            providers,
            start_time: Instant::now(),
        }
    }

    /// State with an injected oracle — the seam integration tests use to
    /// script oracle behavior without a network.
    pub fn with_oracle(oracle: Arc<dyn Oracle>, roster: Vec<ModelId>) -> Self {
        let providers = build_providers(&roster);
        Self {
            client: build_http_client(),
            oracle,
            oracle_health: Arc::new(RwLock::new(ModelHealth::default())),
            roster,
            providers,
            start_time: Instant::now(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

fn build_http_client() -> Client {
    Client::builder()
        .pool_max_idle_per_host(10)
        .connect_timeout(std::time::Duration::from_secs(5))
        .build()
        .expect("Failed to build HTTP client")
}

fn build_providers(roster: &[ModelId]) -> Vec<ProviderInfo> {
    let google_key = std::env::var("GOOGLE_API_KEY")
        .or_else(|_| std::env::var("GEMINI_API_KEY"))
        .is_ok_and(|k| !k.is_empty());
    let anthropic_key = std::env::var("ANTHROPIC_API_KEY").is_ok_and(|k| !k.is_empty());

    roster
        .iter()
        .map(|m| ProviderInfo {
            name: m.provider.clone(),
            available: match m.provider.as_str() {
                "google" => google_key,
                "anthropic" => anthropic_key,
                _ => false,
            },
            model: Some(m.model.clone()),
        })
        .collect()
}
