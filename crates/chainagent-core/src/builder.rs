//! Fluent builder API for run configuration.
//!
//! # Example
//!
//! ```rust
//! use chainagent_core::RunnerBuilder;
//!
//! let config = RunnerBuilder::new()
//!     .invocation_timeout_ms(10_000)
//!     .max_in_flight(8)
//!     .live_reorder_window(16)
//!     .build_config();
//! assert_eq!(config.max_in_flight, 8);
//! ```

use crate::config::RunnerConfig;

/// Fluent builder for `RunnerConfig`.
#[derive(Default)]
pub struct RunnerBuilder {
    config: RunnerConfig,
}

impl RunnerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration (e.g. the settings file's).
    pub fn from_config(config: RunnerConfig) -> Self {
        Self { config }
    }

    /// Per-agent invocation deadline.
    pub fn invocation_timeout_ms(mut self, ms: u64) -> Self {
        self.config.invocation_timeout_ms = ms;
        self
    }

    /// Events dispatched concurrently (K).
    pub fn max_in_flight(mut self, k: usize) -> Self {
        self.config.max_in_flight = k;
        self
    }

    pub fn live_reorder_window(mut self, blocks: usize) -> Self {
        self.config.live_reorder_window = blocks;
        self
    }

    pub fn source_lookahead(mut self, blocks: usize) -> Self {
        self.config.source_lookahead = blocks;
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.config.confirmation_depth = depth;
        self
    }

    pub fn build_config(self) -> RunnerConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = RunnerBuilder::new().build_config();
        assert_eq!(cfg.max_in_flight, 4);
        assert_eq!(cfg.invocation_timeout_ms, 30_000);
    }

    #[test]
    fn builder_overrides_loaded_config() {
        let base = RunnerConfig {
            max_in_flight: 2,
            ..Default::default()
        };
        let cfg = RunnerBuilder::from_config(base)
            .invocation_timeout_ms(500)
            .confirmation_depth(12)
            .build_config();
        assert_eq!(cfg.max_in_flight, 2);
        assert_eq!(cfg.invocation_timeout_ms, 500);
        assert_eq!(cfg.confirmation_depth, 12);
    }
}
