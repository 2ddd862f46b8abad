//! The retry policy is a value the client stores and forwards to the
//! transport; the backoff arithmetic itself is the transport's job (see the
//! non-goals in §1 of the spec).

use std::time::Duration;

/// Retry strategies recognized by the transport layer. The core only needs
/// to carry the selected variant and the timeout limit; it never computes a
/// backoff delay itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RetryPolicy {
    #[default]
    ExponentialBackoffWithJitter,
    ExponentialBackoff,
    Immediate,
    Interval,
    LinearBackoff,
    None,
}

/// The policy plus the overall timeout after which the transport should
/// give up retrying and surface a terminal connection-status error.
#[derive(Debug, Clone, Copy)]
pub struct RetrySettings {
    pub policy: RetryPolicy,
    pub timeout: Option<Duration>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        RetrySettings {
            policy: RetryPolicy::default(),
            timeout: None,
        }
    }
}
