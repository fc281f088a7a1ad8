//! Probe error taxonomy.
//!
//! Only failures that prevent an HTTP status from being known surface as
//! errors. Rejected credentials (non-2xx) and undecodable 2xx bodies are
//! recovered inside the probe and never reach this type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProbeError {
    /// Transport-level failure: DNS, connect, TLS, or a configured timeout.
    #[error("upstream unreachable after {elapsed_ms}ms: {source}")]
    Unreachable {
        elapsed_ms: u64,
        #[source]
        source: reqwest::Error,
    },

    /// The channel has no usable base URL; no request was issued.
    #[error("invalid base url: {0:?}")]
    InvalidBaseUrl(String),
}

impl ProbeError {
    /// Time spent before the failure was observed.
    pub fn elapsed_ms(&self) -> u64 {
        match self {
            ProbeError::Unreachable { elapsed_ms, .. } => *elapsed_ms,
            ProbeError::InvalidBaseUrl(_) => 0,
        }
    }
}
