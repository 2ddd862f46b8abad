use thiserror::Error;

/// Result alias used across the public API.
pub type Result<T> = std::result::Result<T, ClientError>;

/// The error taxonomy surfaced to callers of [`crate::Client`].
///
/// Internal helpers generally return `anyhow::Result` and get wrapped into
/// [`ClientError::Error`] at the public boundary, mirroring how the
/// provisioning/registration errors in this lineage are handled: a handful of
/// well-known variants plus a catch-all for everything else.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A null/empty required argument, or an internally inconsistent
    /// combination of arguments (e.g. both a key and a token).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An operation that requires an attached hub was issued before the
    /// client reached the `Attached` registration state. Subscription
    /// intents are exempt: they're queued instead of rejected.
    #[error("operation requires an attached client; current state does not allow it")]
    NotYetProvisioned,

    /// `last_message_receive_time` was queried before any message arrived.
    #[error("no message has been received yet")]
    IndefiniteTime,

    /// Catch-all for allocation failures, transport rejections, subscribe
    /// failures, and connection-string parse failures.
    #[error(transparent)]
    Error(#[from] anyhow::Error),
}

impl ClientError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        ClientError::InvalidArgument(msg.into())
    }
}
