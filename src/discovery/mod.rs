//! Channel token testing — probes every credential of a channel and folds
//! the per-token outcomes into one summary.
//!
//! Probing is strictly sequential: one request in flight per run, each
//! awaited before the next begins. A channel counts as healthy as soon as
//! a single credential works, whatever happens to the others.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::adapters::{ModelProbe, OpenAIModelsProbe, ProbeResult};
use crate::error::ProbeError;
use crate::util::mask_secret;

pub mod poller;

// ── Types ───────────────────────────────────────────────────────────

/// One API key belonging to a channel.
#[derive(Clone)]
pub struct Credential {
    pub id: Option<String>,
    pub name: Option<String>,
    pub secret: String,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { id: None, name: None, secret: secret.into() }
    }

    pub fn named(id: impl Into<String>, name: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            name: Some(name.into()),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &mask_secret(&self.secret))
            .finish()
    }
}

/// Per-credential line of a summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTestItem {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_name: Option<String>,
    pub ok: bool,
    #[serde(rename = "elapsed")]
    pub elapsed_ms: u64,
    pub models: Vec<String>,
}

/// Aggregate over all credentials tested for one base URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestSummary {
    pub ok: bool,
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Rounded mean over every item, failures included.
    #[serde(rename = "elapsed")]
    pub elapsed_ms: u64,
    /// Deduplicated union over successful items, first-seen order.
    pub models: Vec<String>,
    pub items: Vec<TokenTestItem>,
}

impl TestSummary {
    /// The result for a channel with no credentials.
    pub fn empty() -> Self {
        Self {
            ok: false,
            total: 0,
            success: 0,
            failed: 0,
            elapsed_ms: 0,
            models: Vec::new(),
            items: Vec::new(),
        }
    }
}

// ── Aggregation ─────────────────────────────────────────────────────

/// Probe each credential in order and aggregate the outcomes.
///
/// A probe that errors (upstream unreachable) becomes a failed item for
/// that credential and the run moves on to the next one.
pub async fn test_channel_tokens(
    base_url: &str,
    tokens: &[Credential],
    probe: &dyn ModelProbe,
) -> TestSummary {
    if tokens.is_empty() {
        return TestSummary::empty();
    }

    let mut items = Vec::with_capacity(tokens.len());
    let mut models: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut success = 0usize;
    let mut total_elapsed = 0u64;

    for token in tokens {
        let result = match probe.probe(base_url, &token.secret).await {
            Ok(r) => r,
            Err(e) => unreachable_result(token, e),
        };

        total_elapsed += result.elapsed_ms;
        if result.ok {
            success += 1;
            for model in &result.models {
                if seen.insert(model.clone()) {
                    models.push(model.clone());
                }
            }
        }

        debug!(
            token_id = token.id.as_deref().unwrap_or("-"),
            ok = result.ok,
            elapsed_ms = result.elapsed_ms,
            models = result.models.len(),
            "Token probed"
        );

        items.push(TokenTestItem {
            token_id: token.id.clone(),
            token_name: token.name.clone(),
            ok: result.ok,
            elapsed_ms: result.elapsed_ms,
            models: result.models,
        });
    }

    let total = tokens.len();
    let elapsed_ms = (total_elapsed as f64 / total as f64).round() as u64;

    TestSummary {
        ok: success > 0,
        total,
        success,
        failed: total - success,
        elapsed_ms,
        models,
        items,
    }
}

fn unreachable_result(token: &Credential, err: ProbeError) -> ProbeResult {
    warn!(
        token_id = token.id.as_deref().unwrap_or("-"),
        "Probe failed before a status was known: {}",
        err
    );
    ProbeResult::failed(err.elapsed_ms())
}

// ── Tester ──────────────────────────────────────────────────────────

/// Holds the probe used for token tests.
///
/// `ChannelTester::default()` binds the HTTP probe; tests and callers
/// with special transport needs use `with_probe`.
#[derive(Clone)]
pub struct ChannelTester {
    probe: Arc<dyn ModelProbe>,
}

impl ChannelTester {
    pub fn with_probe(probe: Arc<dyn ModelProbe>) -> Self {
        Self { probe }
    }

    pub async fn test_tokens(&self, base_url: &str, tokens: &[Credential]) -> TestSummary {
        test_channel_tokens(base_url, tokens, self.probe.as_ref()).await
    }

    /// Single-credential check, as used for channels without a token list.
    pub async fn test_single(&self, base_url: &str, secret: &str) -> Result<ProbeResult, ProbeError> {
        self.probe.probe(base_url, secret).await
    }
}

impl Default for ChannelTester {
    fn default() -> Self {
        Self::with_probe(Arc::new(OpenAIModelsProbe::new()))
    }
}
