//! Model-fallback layer over the text-generation providers.
//!
//! Every oracle call in the pipeline goes through [`Oracle::generate_json`]:
//! an ordered roster of `provider:model` candidates is tried until one
//! returns text that parses as JSON. Two advisory, safely-racy caches live in
//! [`ModelHealth`]: the last model that succeeded is promoted to the front of
//! the order, and models that failed are excluded for the rest of the
//! process. Losing a cache update only causes a redundant retry.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

const ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Roster used when `ORACLE_MODELS` is unset.
pub const DEFAULT_MODELS: &str = "google:gemini-2.5-flash";

// ---------------------------------------------------------------------------
// Messages & options
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub max_tokens: u32,
    pub force_json: bool,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2048,
            force_json: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("no oracle models are configured")]
    NoModels,
    #[error("every configured oracle model failed ({tried} tried)")]
    Exhausted { tried: usize },
    #[error("oracle provider error: {0}")]
    Api(String),
    #[error("oracle network error: {0}")]
    Network(String),
    #[error("oracle returned unparseable output: {0}")]
    Parse(String),
}

// ---------------------------------------------------------------------------
// Model identifiers & roster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
    pub provider: String,
    pub model: String,
}

impl ModelId {
    /// Parse a `provider:model` spec; a bare model name defaults to google.
    pub fn parse(spec: &str) -> Option<Self> {
        let spec = spec.trim();
        if spec.is_empty() {
            return None;
        }
        let (provider, model) = match spec.split_once(':') {
            Some((p, m)) => (p.trim(), m.trim()),
            None => ("google", spec),
        };
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self {
            provider: provider.to_string(),
            model: model.to_string(),
        })
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// Parse a comma-separated roster, preserving order and dropping blanks.
pub fn parse_roster(spec: &str) -> Vec<ModelId> {
    spec.split(',').filter_map(ModelId::parse).collect()
}

// ---------------------------------------------------------------------------
// Health cache
// ---------------------------------------------------------------------------

/// Process-lifetime model health. Injected (not module-global) so tests can
/// reset it between runs; a fresh process starts from a clean slate.
#[derive(Debug, Default)]
pub struct ModelHealth {
    pub last_good: Option<ModelId>,
    pub failed: HashSet<ModelId>,
}

impl ModelHealth {
    /// Order candidates for the next call: last-known-good first, known-bad
    /// excluded. If exclusion would empty the order, the full roster is
    /// retried — the caches are advisory, not a permanent verdict.
    pub fn candidate_order(&self, roster: &[ModelId]) -> Vec<ModelId> {
        let mut order: Vec<ModelId> = Vec::new();
        if let Some(good) = &self.last_good {
            if roster.contains(good) {
                order.push(good.clone());
            }
        }
        for m in roster {
            if !order.contains(m) && !self.failed.contains(m) {
                order.push(m.clone());
            }
        }
        if order.is_empty() {
            order = roster.to_vec();
        }
        order
    }
}

// ---------------------------------------------------------------------------
// Oracle trait
// ---------------------------------------------------------------------------

/// One call shape over all interchangeable models: role-tagged messages in,
/// parsed JSON out. Output is untrusted external input — callers validate
/// the shape they expect.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate_json(
        &self,
        messages: &[ChatMessage],
        opts: &GenerationOptions,
    ) -> Result<Value, OracleError>;
}

// ---------------------------------------------------------------------------
// Response parsing
// ---------------------------------------------------------------------------

/// Models wrap JSON in markdown fences often enough that stripping them is
/// table stakes.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

pub fn parse_structured(text: &str) -> Result<Value, OracleError> {
    serde_json::from_str(strip_code_fences(text)).map_err(|e| OracleError::Parse(e.to_string()))
}

// ---------------------------------------------------------------------------
// Failover implementation
// ---------------------------------------------------------------------------

pub struct FailoverOracle {
    client: reqwest::Client,
    roster: Vec<ModelId>,
    api_keys: HashMap<String, String>,
    health: Arc<RwLock<ModelHealth>>,
}

impl FailoverOracle {
    pub fn new(
        client: reqwest::Client,
        roster: Vec<ModelId>,
        api_keys: HashMap<String, String>,
        health: Arc<RwLock<ModelHealth>>,
    ) -> Self {
        Self {
            client,
            roster,
            api_keys,
            health,
        }
    }

    /// Build from the environment: `ORACLE_MODELS` (comma-separated
    /// `provider:model` specs), `GOOGLE_API_KEY`/`GEMINI_API_KEY`,
    /// `ANTHROPIC_API_KEY`.
    pub fn from_env(client: reqwest::Client, health: Arc<RwLock<ModelHealth>>) -> Self {
        let spec = std::env::var("ORACLE_MODELS").unwrap_or_else(|_| DEFAULT_MODELS.to_string());
        let roster = parse_roster(&spec);

        let mut api_keys = HashMap::new();
        if let Ok(key) = std::env::var("GOOGLE_API_KEY").or_else(|_| std::env::var("GEMINI_API_KEY"))
        {
            api_keys.insert("google".to_string(), key);
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            api_keys.insert("anthropic".to_string(), key);
        }

        tracing::info!(
            "oracle: roster [{}], keys: {:?}",
            roster
                .iter()
                .map(ModelId::to_string)
                .collect::<Vec<_>>()
                .join(", "),
            api_keys.keys().collect::<Vec<_>>()
        );

        Self::new(client, roster, api_keys, health)
    }

    pub fn roster(&self) -> &[ModelId] {
        &self.roster
    }

    fn key_for(&self, provider: &str) -> Result<&str, OracleError> {
        self.api_keys
            .get(provider)
            .map(String::as_str)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| OracleError::Api(format!("no API key configured for '{}'", provider)))
    }

    async fn call_model(
        &self,
        model: &ModelId,
        messages: &[ChatMessage],
        opts: &GenerationOptions,
    ) -> Result<String, OracleError> {
        match model.provider.as_str() {
            "google" => self.call_google(&model.model, messages, opts).await,
            "anthropic" => self.call_anthropic(&model.model, messages, opts).await,
            other => Err(OracleError::Api(format!("unknown provider '{}'", other))),
        }
    }

    async fn call_google(
        &self,
        model: &str,
        messages: &[ChatMessage],
        opts: &GenerationOptions,
    ) -> Result<String, OracleError> {
        let key = self.key_for("google")?;

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let contents: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| {
                json!({
                    "role": if m.role == "assistant" { "model" } else { "user" },
                    "parts": [{ "text": m.content }]
                })
            })
            .collect();

        let mut gen_config = json!({
            "temperature": opts.temperature,
            "maxOutputTokens": opts.max_tokens,
        });
        if opts.force_json {
            gen_config["responseMimeType"] = json!("application/json");
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": gen_config,
        });
        if !system.is_empty() {
            body["systemInstruction"] = json!({ "parts": [{ "text": system.join("\n\n") }] });
        }

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent",
            model
        );
        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", key)
            .json(&body)
            .timeout(ORACLE_TIMEOUT)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err_body = resp.text().await.unwrap_or_default();
            let snippet: String = err_body.chars().take(300).collect();
            return Err(OracleError::Api(format!(
                "Gemini API returned {}: {}",
                status, snippet
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;
        body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::Parse("Gemini response has no text part".to_string()))
    }

    async fn call_anthropic(
        &self,
        model: &str,
        messages: &[ChatMessage],
        opts: &GenerationOptions,
    ) -> Result<String, OracleError> {
        let key = self.key_for("anthropic")?;

        let system: Vec<&str> = messages
            .iter()
            .filter(|m| m.role == "system")
            .map(|m| m.content.as_str())
            .collect();
        let wire_messages: Vec<Value> = messages
            .iter()
            .filter(|m| m.role != "system")
            .map(|m| json!({ "role": m.role, "content": m.content }))
            .collect();

        let mut body = json!({
            "model": model,
            "max_tokens": opts.max_tokens,
            "temperature": opts.temperature,
            "messages": wire_messages,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }

        let resp = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .timeout(ORACLE_TIMEOUT)
            .send()
            .await
            .map_err(|e| OracleError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let err_body = resp.text().await.unwrap_or_default();
            let snippet: String = err_body.chars().take(300).collect();
            return Err(OracleError::Api(format!(
                "Anthropic API returned {}: {}",
                status, snippet
            )));
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| OracleError::Parse(e.to_string()))?;
        body["content"][0]["text"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| OracleError::Parse("Anthropic response has no text block".to_string()))
    }

    async fn mark_failed(&self, model: ModelId) {
        let mut health = self.health.write().await;
        if health.last_good.as_ref() == Some(&model) {
            health.last_good = None;
        }
        health.failed.insert(model);
    }

    async fn mark_good(&self, model: ModelId) {
        let mut health = self.health.write().await;
        health.failed.remove(&model);
        health.last_good = Some(model);
    }
}

#[async_trait]
impl Oracle for FailoverOracle {
    async fn generate_json(
        &self,
        messages: &[ChatMessage],
        opts: &GenerationOptions,
    ) -> Result<Value, OracleError> {
        if self.roster.is_empty() {
            return Err(OracleError::NoModels);
        }

        let order = self.health.read().await.candidate_order(&self.roster);
        let tried = order.len();

        for model in order {
            let text = match self.call_model(&model, messages, opts).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("oracle: {} failed: {}", model, e);
                    self.mark_failed(model).await;
                    continue;
                }
            };
            match parse_structured(&text) {
                Ok(value) => {
                    self.mark_good(model).await;
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!("oracle: {} returned unparseable output: {}", model, e);
                    self.mark_failed(model).await;
                }
            }
        }

        Err(OracleError::Exhausted { tried })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(spec: &str) -> ModelId {
        ModelId::parse(spec).unwrap()
    }

    // ── roster parsing ───────────────────────────────────────────────────

    #[test]
    fn parse_roster_handles_namespaced_and_bare_ids() {
        let roster = parse_roster("google:gemini-2.5-flash, anthropic:claude-sonnet-4-6,plain-model");
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0].provider, "google");
        assert_eq!(roster[1].provider, "anthropic");
        assert_eq!(roster[1].model, "claude-sonnet-4-6");
        // Bare id defaults to google.
        assert_eq!(roster[2].provider, "google");
        assert_eq!(roster[2].model, "plain-model");
    }

    #[test]
    fn parse_roster_drops_blank_entries() {
        let roster = parse_roster("google:a,, ,google:b");
        assert_eq!(roster.len(), 2);
    }

    #[test]
    fn default_roster_is_non_empty() {
        assert!(!parse_roster(DEFAULT_MODELS).is_empty());
    }

    // ── candidate ordering ───────────────────────────────────────────────

    #[test]
    fn last_good_model_is_tried_first() {
        let roster = vec![m("google:a"), m("google:b"), m("google:c")];
        let health = ModelHealth {
            last_good: Some(m("google:b")),
            failed: HashSet::new(),
        };
        let order = health.candidate_order(&roster);
        assert_eq!(order[0], m("google:b"));
        assert_eq!(order.len(), 3);
    }

    #[test]
    fn failed_models_are_excluded() {
        let roster = vec![m("google:a"), m("google:b")];
        let mut failed = HashSet::new();
        failed.insert(m("google:a"));
        let health = ModelHealth {
            last_good: None,
            failed,
        };
        let order = health.candidate_order(&roster);
        assert_eq!(order, vec![m("google:b")]);
    }

    #[test]
    fn all_failed_falls_back_to_full_roster() {
        let roster = vec![m("google:a"), m("google:b")];
        let health = ModelHealth {
            last_good: None,
            failed: roster.iter().cloned().collect(),
        };
        let order = health.candidate_order(&roster);
        assert_eq!(order, roster);
    }

    #[test]
    fn last_good_not_in_roster_is_ignored() {
        let roster = vec![m("google:a")];
        let health = ModelHealth {
            last_good: Some(m("google:gone")),
            failed: HashSet::new(),
        };
        let order = health.candidate_order(&roster);
        assert_eq!(order, roster);
    }

    // ── response parsing ─────────────────────────────────────────────────

    #[test]
    fn strip_code_fences_unwraps_json_blocks() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn parse_structured_rejects_non_json() {
        assert!(parse_structured("not json at all").is_err());
        assert!(parse_structured("```json\n{\"ok\":true}\n```").is_ok());
    }
}
