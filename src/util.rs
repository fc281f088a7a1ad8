//! Small helpers shared across modules: URL canonicalization, clock, masking.

use chrono::{SecondsFormat, Utc};

/// Canonicalize an upstream base URL for path concatenation.
///
/// Trims whitespace and trailing slashes, and drops a trailing `/v1` so
/// that `{base}/v1/models` never doubles the version segment.
pub fn normalize_base_url(base_url: &str) -> String {
    let mut url = base_url.trim().trim_end_matches('/');
    if let Some(stripped) = url.strip_suffix("/v1") {
        url = stripped.trim_end_matches('/');
    }
    url.to_string()
}

/// Current time as an RFC 3339 string with millisecond precision (`...Z`).
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as whole seconds since the Unix epoch.
pub fn now_epoch_secs() -> i64 {
    Utc::now().timestamp()
}

/// Mask a secret for display: "sk-abcdef123456" → "sk-a...3456"
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        let head: String = chars.iter().take(chars.len().min(2)).collect();
        return format!("{}...", head);
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
