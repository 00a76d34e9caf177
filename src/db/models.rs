//! Store model types.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A registered URL under monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    pub id: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// One page of a target listing.
#[derive(Debug, Serialize)]
pub struct TargetPage {
    pub items: Vec<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// One probe outcome for a target, covering all of the probe's attempts.
///
/// At least one of `status_code` and `error` is present: a probe either got
/// an HTTP response or failed with a recorded reason.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub checked_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub latency_ms: i64,
    pub error: Option<String>,
}

/// Probe history for a target, most recent first.
#[derive(Debug, Serialize)]
pub struct CheckResultPage {
    pub items: Vec<CheckResult>,
}
