//! Transport-level error types.

use thiserror::Error;

use crate::wire::RpcErrorObject;

#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection refused, reset, or a non-2xx status.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The remote side answered with a JSON-RPC error object.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(RpcErrorObject),

    /// The WebSocket connection is down or was closed.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("deserialization error: {0}")]
    Deserialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` for transient failures worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http(_) | Self::WebSocket(_) | Self::Timeout { .. })
    }

    pub(crate) fn from_reqwest(e: reqwest::Error, timeout_ms: u64) -> Self {
        if e.is_timeout() {
            Self::Timeout { ms: timeout_ms }
        } else {
            Self::Http(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_retry() {
        assert!(TransportError::Http("reset".into()).is_retryable());
        assert!(TransportError::Timeout { ms: 10 }.is_retryable());
        let rpc = TransportError::Rpc(RpcErrorObject::new(-32000, "header not found"));
        assert!(!rpc.is_retryable());
        assert_eq!(rpc.to_string(), "RPC error -32000: header not found");
    }
}
