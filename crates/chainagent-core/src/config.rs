//! Run configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Tunables of the dispatch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Deadline for a single agent invocation (milliseconds).
    pub invocation_timeout_ms: u64,
    /// Maximum number of events dispatched concurrently.
    pub max_in_flight: usize,
    /// Number of blocks the live source may hold back to restore order.
    pub live_reorder_window: usize,
    /// How many blocks the source may fetch ahead of the dispatcher.
    pub source_lookahead: usize,
    /// Block polling interval in live mode (milliseconds).
    pub poll_interval_ms: u64,
    /// Blocks behind head before a live block is considered confirmed.
    pub confirmation_depth: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            invocation_timeout_ms: 30_000,
            max_in_flight: 4,
            live_reorder_window: 8,
            source_lookahead: 4,
            poll_interval_ms: 2_000,
            confirmation_depth: 0,
        }
    }
}

impl RunnerConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), RunnerError> {
        if self.invocation_timeout_ms == 0 {
            return Err(RunnerError::InvalidConfiguration(
                "invocationTimeoutMs must be greater than zero".into(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(RunnerError::InvalidConfiguration(
                "maxInFlight must be at least 1".into(),
            ));
        }
        if self.live_reorder_window == 0 {
            return Err(RunnerError::InvalidConfiguration(
                "liveReorderWindow must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = RunnerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.invocation_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn zero_in_flight_rejected() {
        let cfg = RunnerConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(cfg.validate().unwrap_err().is_configuration());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let cfg: RunnerConfig = serde_json::from_str(r#"{"maxInFlight":8}"#).unwrap();
        assert_eq!(cfg.max_in_flight, 8);
        assert_eq!(cfg.live_reorder_window, 8);
    }
}
