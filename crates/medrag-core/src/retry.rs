//! Retry Policy
//!
//! An explicit policy value rather than ad-hoc try/except chains (§9
//! Design Notes: "Retries and fallbacks"). Every dependency client
//! (embedding, FHIR, LLM) builds one of these and drives it the same way.

use std::time::Duration;
use tracing::warn;

/// What to do once `max_attempts` is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUp {
    /// Propagate `DependencyUnavailable` to the caller.
    Fail,
    /// Downgrade to a degraded mode (lexical fallback, demo mode, mock
    /// embeddings) instead of failing. The caller is responsible for
    /// actually switching modes; this policy only documents the intent.
    Downgrade,
}

/// Exponential backoff retry policy: `max_attempts` tries, delay doubling
/// from `base_delay` each time.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub on_giveup: GiveUp,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration, on_giveup: GiveUp) -> Self {
        Self {
            max_attempts,
            base_delay,
            on_giveup,
        }
    }

    /// The embedding client's policy (§4.1): 3 attempts, base delay 2s,
    /// downgrades to mock mode on exhaustion.
    pub const fn embedding() -> Self {
        Self::new(3, Duration::from_secs(2), GiveUp::Downgrade)
    }

    /// The FHIR adapter's policy: 3 attempts, base delay 1s, falls back to
    /// demo mode.
    pub const fn fhir() -> Self {
        Self::new(3, Duration::from_secs(1), GiveUp::Downgrade)
    }

    /// The ingestion pipeline's database policy: 3 attempts, base delay 2s,
    /// fails hard (only the ingestion pipeline may fail hard per §7).
    pub const fn ingest_db() -> Self {
        Self::new(3, Duration::from_secs(2), GiveUp::Fail)
    }

    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.saturating_pow(attempt)
    }

    /// Run `op` up to `max_attempts` times, sleeping with exponential
    /// backoff between attempts. Returns the last error if every attempt
    /// fails.
    pub async fn run<T, E, F, Fut>(&self, mut op: F) -> std::result::Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut last_err = None;
        for attempt in 0..self.max_attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        "operation failed: {err}"
                    );
                    last_err = Some(err);
                    if attempt + 1 < self.max_attempts {
                        tokio::time::sleep(self.delay_for_attempt(attempt)).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once since max_attempts >= 1"))
    }
}
