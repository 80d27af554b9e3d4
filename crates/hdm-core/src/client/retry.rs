//! Retry policy and error classification for the transfer client.

use std::time::Duration;

use super::ClientError;

/// High-level classification of a transfer error for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read).
    Timeout,
    /// Server asked us to slow down (429, 503).
    Throttled,
    /// Network-level failure (connection reset, DNS, etc.).
    Connection,
    /// HTTP status that is retryable but not strictly throttling (5xx).
    Http5xx(u16),
    /// Any other error (typically not retried).
    Other,
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Simple exponential backoff policy with caps.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    /// Base delay for backoff.
    pub base_delay: Duration,
    /// Upper bound on backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Compute the next backoff delay for a given attempt and error kind.
    ///
    /// `attempt` is 1-based (1 = first attempt). Returns `RetryDecision::NoRetry`
    /// when we should stop retrying.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.max_attempts {
            return RetryDecision::NoRetry;
        }

        match kind {
            ErrorKind::Other => RetryDecision::NoRetry,
            ErrorKind::Timeout
            | ErrorKind::Connection
            | ErrorKind::Throttled
            | ErrorKind::Http5xx(_) => {
                // Exponential backoff: base * 2^(attempt-1), capped.
                let exp = 1u32.saturating_mul(1 << attempt.saturating_sub(1).min(8));
                let raw = self.base_delay.saturating_mul(exp);
                let delay = raw.min(self.max_delay);
                RetryDecision::RetryAfter(delay)
            }
        }
    }
}

/// Map a transfer error to a retry classification.
pub fn classify(error: &ClientError) -> ErrorKind {
    match error {
        ClientError::Curl(e) => {
            if e.is_operation_timedout() {
                ErrorKind::Timeout
            } else if e.is_couldnt_connect()
                || e.is_couldnt_resolve_host()
                || e.is_recv_error()
                || e.is_send_error()
                || e.is_partial_file()
            {
                ErrorKind::Connection
            } else {
                ErrorKind::Other
            }
        }
        ClientError::Http(429) | ClientError::Http(503) => ErrorKind::Throttled,
        ClientError::Http(code) if (500..600).contains(code) => ErrorKind::Http5xx(*code as u16),
        ClientError::Http(_) => ErrorKind::Other,
        // Disk failures and bad requests don't get better on retry.
        ClientError::Storage(_)
        | ClientError::InvalidUrl(_)
        | ClientError::RetriesExhausted { .. }
        | ClientError::Task(_) => ErrorKind::Other,
    }
}
