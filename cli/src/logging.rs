//! Tracing initialisation.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default level for this workspace's crates.
    pub level: &'static str,
    /// JSON lines instead of human-readable text.
    pub json: bool,
}

impl LogConfig {
    pub fn new(debug: bool, json: bool) -> Self {
        Self {
            level: if debug { "debug" } else { "info" },
            json,
        }
    }

    /// `warn` for dependencies, `level` for our own crates.
    fn directives(&self) -> String {
        ["chainagent", "chainagent_core", "chainagent_rpc", "chainagent_evm"]
            .iter()
            .fold("warn".to_string(), |mut acc, krate| {
                acc.push_str(&format!(",{krate}={}", self.level));
                acc
            })
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `config` when set.
pub fn init_tracing(config: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.directives()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Logs go to stderr so findings on stdout stay pipeable.
    if config.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_raises_own_crates_only() {
        let directives = LogConfig::new(true, false).directives();
        assert!(directives.starts_with("warn,"));
        assert!(directives.contains("chainagent_core=debug"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }
}
