//! Retry policy: which failures are worth another attempt, and how long to
//! wait before it.
//!
//! Delay before retry `k` (0-indexed) is `base * 2^k` plus uniform jitter in
//! `[0, 0.25 * base * 2^k)`. The total number of attempts is `retries + 1`.

use std::collections::BTreeSet;
use std::time::Duration;

use serde_json::Value;

use crate::payload::{business_code, is_success_payload};

pub const DEFAULT_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(20_000);
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(350);
pub const JITTER_FRACTION: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub timeout: Duration,
    pub base_delay: Duration,
    /// Business codes worth retrying. Empty = every code other than `"1"`.
    pub retryable_codes: BTreeSet<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
            base_delay: DEFAULT_BASE_DELAY,
            retryable_codes: BTreeSet::new(),
        }
    }
}

/// What one attempt produced, as seen by the retry decision.
#[derive(Debug, Clone, Copy)]
pub struct AttemptReport<'a> {
    /// HTTP status, `None` when no response was obtained.
    pub status: Option<u16>,
    /// Network failure or per-attempt timeout.
    pub transport_failed: bool,
    pub payload: Option<&'a Value>,
}

impl RetryPolicy {
    pub fn with_retryable_codes<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_codes = codes
            .into_iter()
            .map(Into::into)
            .filter(|c: &String| !c.is_empty())
            .collect();
        self
    }

    /// `base * 2^attempt`, without jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.min(20)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Backoff with random jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_delay_with(attempt, rand::random::<f64>())
    }

    /// Backoff with a caller-supplied jitter sample in `[0, 1)`.
    pub fn backoff_delay_with(&self, attempt: u32, unit: f64) -> Duration {
        let base = self.base_delay_for(attempt);
        let unit = unit.clamp(0.0, 1.0);
        base + base.mul_f64(JITTER_FRACTION * unit)
    }

    /// Retry iff transport failure, no status, 408/429, 5xx, or a payload
    /// whose business code is not success (and is in the retryable set, when
    /// one is configured).
    pub fn should_retry(&self, report: AttemptReport<'_>) -> bool {
        if report.transport_failed {
            return true;
        }
        let status = match report.status {
            None | Some(0) => return true,
            Some(s) => s,
        };
        if status == 408 || status == 429 || status >= 500 {
            return true;
        }
        match report.payload {
            Some(p) if !is_success_payload(p) => self.is_retryable_code(business_code(p)),
            _ => false,
        }
    }

    fn is_retryable_code(&self, code: Option<String>) -> bool {
        if self.retryable_codes.is_empty() {
            return true;
        }
        code.is_some_and(|c| self.retryable_codes.contains(&c))
    }
}
