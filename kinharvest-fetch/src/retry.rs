//! Retry policy for vendor requests.
//!
//! Every completed or failed attempt is reduced to an [`AttemptOutcome`],
//! and the policy classifies it into a [`Decision`]. The delay between
//! attempts is a fixed configured wait, not exponential backoff: the
//! vendor link is expected to recover on its own timescale, and a bounded
//! per-request latency is preferred over adaptive growth.

use std::time::Duration;

/// Default ceiling on counted retries before a forced re-login.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;

// ============================================================================
// Attempt Outcome
// ============================================================================

/// The reduced result of one request attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response with a usable body.
    Success(String),
    /// The request timed out at the transport level.
    Timeout,
    /// The connection failed or was dropped.
    Connection,
    /// Non-2xx HTTP status other than the specially handled ones.
    HttpStatus(u16),
    /// HTTP 503 or a vendor-specific busy body on an otherwise fine
    /// response.
    SoftBlock,
    /// The server-side session contract went stale (HTTP 426).
    SessionExpired,
}

// ============================================================================
// Decision
// ============================================================================

/// What to do after an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The attempt succeeded; hand the body to the caller.
    Accept,
    /// Sleep for `wait`, then try again. `counted` attempts advance the
    /// per-session retry counter; uncounted ones may repeat without bound.
    RetryAfter {
        /// Fixed delay before the next attempt.
        wait: Duration,
        /// Whether this retry advances the per-session counter.
        counted: bool,
    },
    /// Re-establish the session, reset the counter, then retry.
    ReAuthThenRetry,
    /// Terminal failure for this resource; no further attempts.
    Abort(AbortReason),
}

/// Why a request was aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// HTTP 403: a permanent capability denial for the resource.
    Forbidden,
}

// ============================================================================
// Retry Policy
// ============================================================================

/// Classifies attempt outcomes and supplies the fixed retry delay.
///
/// One counter covers every counted failure class before re-login is
/// forced. Whether re-login is the right remedy for repeated ordinary
/// HTTP errors is questionable (the condition may be site-side and
/// permanent), but it is the behavior the harvests were built around and
/// is kept as explicit policy.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Fixed delay between attempts.
    pub wait: Duration,
    /// Counted-retry ceiling before `ReAuthThenRetry`.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Creates a policy with the given fixed wait and the default ceiling.
    pub fn new(wait: Duration) -> Self {
        Self {
            wait,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Sets the counted-retry ceiling.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Classifies one attempt outcome given the retries counted so far.
    pub fn classify(&self, outcome: &AttemptOutcome, retries_so_far: u32) -> Decision {
        match outcome {
            AttemptOutcome::Success(_) => Decision::Accept,

            // The vendor link is assumed to recover; retry without bound.
            AttemptOutcome::Timeout | AttemptOutcome::Connection => Decision::RetryAfter {
                wait: self.wait,
                counted: false,
            },

            AttemptOutcome::SoftBlock => Decision::RetryAfter {
                wait: self.wait,
                counted: false,
            },

            AttemptOutcome::SessionExpired => Decision::ReAuthThenRetry,

            AttemptOutcome::HttpStatus(403) => Decision::Abort(AbortReason::Forbidden),

            AttemptOutcome::HttpStatus(_) => {
                if retries_so_far >= self.max_attempts {
                    Decision::ReAuthThenRetry
                } else {
                    Decision::RetryAfter {
                        wait: self.wait,
                        counted: true,
                    }
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
