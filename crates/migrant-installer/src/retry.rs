use std::time::Duration;

use migrant_core::{EntryStatus, FailureKind};

use crate::Job;

/// Exponential backoff for failed installs: `base_delay * multiplier^retry_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(5000),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    /// Upper bound on retries for a single install, whatever the configuration asks for.
    pub const MAX_RETRIES: u32 = 3;

    pub fn capped(self) -> Self {
        Self {
            max_retries: self.max_retries.min(Self::MAX_RETRIES),
            ..self
        }
    }

    pub fn delay(&self, retry_count: u32) -> Duration {
        let factor = self.multiplier.max(1).saturating_pow(retry_count);
        self.base_delay.saturating_mul(factor)
    }

    /// Permanent failures (bad input, permissions, unknown package) never retry.
    pub fn should_retry(&self, job: &Job, cancelled: bool) -> bool {
        !cancelled
            && job.status == EntryStatus::Failed
            && job.retry_count < self.max_retries.min(Self::MAX_RETRIES)
            && job.failure_kind.is_none_or(FailureKind::is_retryable)
    }
}
