//! Error types for the agent run pipeline.
//!
//! Only failures that end a run live here. A fault of one agent on one event
//! is recorded as an [`InvocationOutcome`](crate::types::InvocationOutcome)
//! and never becomes a `RunnerError`.

use thiserror::Error;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("missing configuration: no {field} provided")]
    MissingConfiguration { field: String },

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("failed to fetch block {block}: {reason}")]
    RangeFetch { block: u64, reason: String },

    #[error("malformed record {record}: {reason}")]
    MalformedRecord { record: u64, reason: String },

    #[error("source error: {0}")]
    Source(String),

    #[error("sink error: {0}")]
    Sink(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl RunnerError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            field: field.into(),
        }
    }

    /// Returns `true` for configuration errors (raised before any dispatch).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingConfiguration { .. } | Self::InvalidConfiguration(_)
        )
    }

    /// Returns `true` for event sourcing errors.
    pub fn is_source(&self) -> bool {
        matches!(
            self,
            Self::RangeFetch { .. } | Self::MalformedRecord { .. } | Self::Source(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        assert!(RunnerError::missing("jsonRpcUrl").is_configuration());
        assert!(RunnerError::RangeFetch {
            block: 7,
            reason: "not found".into()
        }
        .is_source());
        assert!(!RunnerError::Sink("closed".into()).is_source());
    }

    #[test]
    fn missing_configuration_names_field() {
        let err = RunnerError::missing("ipfsGatewayUrl");
        assert_eq!(
            err.to_string(),
            "missing configuration: no ipfsGatewayUrl provided"
        );
    }
}
