use std::time::Duration;

/// Errors surfaced by the execution transport.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The restart budget is exhausted. Terminal for this transport.
    #[error(
        "execution runtime unavailable after {attempts} restart attempts: \
         {reason}"
    )]
    Unavailable {
        /// Restarts attempted before giving up.
        attempts: u32,
        /// Why the last attempt failed.
        reason: String,
    },
    /// The process could not be launched.
    #[error("failed to launch execution runtime: {0}")]
    Launch(String),
    /// The channel broke while the request was in flight, and the request
    /// had already been retried once.
    #[error("connection to execution runtime lost: {0}")]
    ConnectionLost(String),
    /// No response arrived in time.
    #[error("`{method}` timed out after {timeout:?}")]
    Timeout {
        /// The JSON-RPC method.
        method: String,
        /// The elapsed limit.
        timeout: Duration,
    },
    /// The runtime answered with a JSON-RPC error.
    #[error("execution runtime returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message.
        message: String,
    },
    /// The runtime sent something that is not valid framing.
    #[error("protocol violation: {0}")]
    Protocol(String),
    /// The transport has been closed.
    #[error("transport is closed")]
    Closed,
}

impl TransportError {
    /// Returns `true` if the transport will never serve requests again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransportError::Unavailable { .. } | TransportError::Closed)
    }
}
