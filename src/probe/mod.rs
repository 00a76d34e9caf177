//! HTTP probing with bounded retry.
//!
//! A probe is one fetch of a target URL: up to three attempts with doubling
//! backoff, retrying only transient failures (connect-level errors and 5xx
//! responses). The scheduler stamps `checked_at` and `latency_ms`; the probe
//! reports the final status code and error.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// Attempts per probe: the initial request plus two retries.
const MAX_ATTEMPTS: u32 = 3;
/// Backoff before the first retry; doubles for each subsequent retry.
const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
/// Redirects followed per attempt; one more is an error.
const MAX_REDIRECTS: usize = 5;

const USER_AGENT: &str = "Linkwatch/1.0";

/// Outcome of one probe, covering all attempts.
#[derive(Debug, Clone, Default)]
pub struct ProbeOutcome {
    /// HTTP status of the final response, if any response was obtained.
    pub status_code: Option<u16>,
    /// Failure description; absent when the final response was below 500.
    pub error: Option<String>,
}

impl ProbeOutcome {
    fn cancelled() -> Self {
        Self {
            status_code: None,
            error: Some("context cancelled".to_string()),
        }
    }
}

/// HTTP prober with a shared, bounded connection pool.
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    /// Build a prober with the given per-attempt timeout.
    pub fn new(http_timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(http_timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { client })
    }

    /// Fetch `url`, retrying transient failures until the attempt budget is
    /// spent. Cancellation is observed before the first request, during
    /// backoff sleeps, and while a request is in flight.
    pub async fn check(&self, url: &str, cancel: &CancellationToken) -> ProbeOutcome {
        let mut outcome = ProbeOutcome::default();
        let mut last_error: Option<String> = None;
        let mut backoff = INITIAL_BACKOFF;

        if cancel.is_cancelled() {
            return ProbeOutcome::cancelled();
        }

        for attempt in 0..MAX_ATTEMPTS {
            if attempt > 0 {
                tokio::select! {
                    _ = cancel.cancelled() => return ProbeOutcome::cancelled(),
                    _ = tokio::time::sleep(backoff) => backoff *= 2,
                }
            }

            let response = tokio::select! {
                _ = cancel.cancelled() => return ProbeOutcome::cancelled(),
                response = self.client.get(url).send() => response,
            };

            match response {
                Ok(resp) => {
                    let code = resp.status().as_u16();
                    outcome.status_code = Some(code);
                    // Drain so the pooled connection is reusable.
                    let _ = resp.bytes().await;

                    if code < 500 {
                        // 2xx/3xx/4xx are terminal; 4xx is not retried.
                        return outcome;
                    }
                    last_error = Some(format!("server error: {code}"));
                }
                Err(err) => {
                    last_error = Some(err.to_string());
                    if !is_network_error(&err) {
                        break;
                    }
                }
            }
        }

        outcome.error = last_error;
        outcome
    }
}

/// Connect-level failures (DNS, TCP) are worth retrying. Anything else,
/// including timeouts and redirect-limit errors, is terminal.
fn is_network_error(err: &reqwest::Error) -> bool {
    err.is_connect()
}
