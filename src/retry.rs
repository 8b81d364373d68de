use std::num::NonZeroU32;

use crate::error::Error;

/// What to do with a message after a failed delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Keep the message pending; it will be fetched again.
    Retry { retry_count: u32 },
    /// The maximum was reached; the message moves to `Failed`.
    Exhausted { retry_count: u32 },
}

impl RetryDecision {
    pub fn retry_count(self) -> u32 {
        match self {
            Self::Retry { retry_count } | Self::Exhausted { retry_count } => retry_count,
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Bounded retry policy. The count is incremented first and then compared
/// against the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: NonZeroU32,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Result<Self, Error> {
        NonZeroU32::new(max_retries)
            .map(|max_retries| Self { max_retries })
            .ok_or_else(|| Error::config("max_retries must be at least 1"))
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries.get()
    }

    /// Decision for a message that has failed `retry_count` times before.
    pub fn decide(&self, retry_count: u32) -> RetryDecision {
        self.classify(retry_count.saturating_add(1))
    }

    /// Decision for a count that already includes the latest failure, as
    /// returned by the repository after incrementing it.
    pub fn classify(&self, retry_count: u32) -> RetryDecision {
        if retry_count >= self.max_retries.get() {
            RetryDecision::Exhausted { retry_count }
        } else {
            RetryDecision::Retry { retry_count }
        }
    }
}
