//! Upstream probe interface — one credential, one request, one result.
//!
//! The aggregator only ever talks to `ModelProbe`. The concrete HTTP
//! implementation lives in `openai`; tests substitute scripted probes.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProbeError;

pub mod openai;

pub use openai::OpenAIModelsProbe;

// ── Core Types ──────────────────────────────────────────────────────

/// Outcome of checking one credential against one base URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    /// True iff the upstream answered with a 2xx status.
    pub ok: bool,
    /// Wall-clock time until response headers (or failure).
    #[serde(rename = "elapsed")]
    pub elapsed_ms: u64,
    /// Model identifiers as received. Always empty when `ok` is false.
    pub models: Vec<String>,
    /// Decoded response body, kept on success for diagnostics.
    #[serde(skip)]
    pub raw_payload: Option<serde_json::Value>,
}

impl ProbeResult {
    /// A rejected probe: no models, no payload.
    pub fn failed(elapsed_ms: u64) -> Self {
        Self {
            ok: false,
            elapsed_ms,
            models: Vec::new(),
            raw_payload: None,
        }
    }

    pub fn succeeded(elapsed_ms: u64, models: Vec<String>, raw_payload: serde_json::Value) -> Self {
        Self {
            ok: true,
            elapsed_ms,
            models,
            raw_payload: Some(raw_payload),
        }
    }
}

// ── Probe Trait ─────────────────────────────────────────────────────

/// Checks whether a secret can list models on an upstream.
///
/// Implementations issue at most one request and never retry.
/// Non-2xx answers resolve to `Ok` with `ok == false`; only failures that
/// leave the HTTP status unknown are returned as `Err`.
#[async_trait]
pub trait ModelProbe: Send + Sync {
    async fn probe(&self, base_url: &str, secret: &str) -> Result<ProbeResult, ProbeError>;
}
