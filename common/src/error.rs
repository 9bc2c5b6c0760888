use std::time::Duration;

use thiserror::Error;

/// Broker-side failure: unreachable host, dropped connection, failed
/// declare or publish.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct TransportError(String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        TransportError(message.into())
    }
}

/// Failure of a request/reply exchange. Timeouts are reported separately
/// from transport faults so callers can tell a retryable stall from a
/// broken broker.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),
    #[error("no correlated reply within {0:?}")]
    Timeout(Duration),
}

impl RpcError {
    /// Machine-readable kind for error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::Transport(_) => "transport",
            RpcError::Timeout(_) => "timeout",
        }
    }
}
