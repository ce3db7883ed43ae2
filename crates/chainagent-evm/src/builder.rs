//! Fluent builder for an [`EvmChainClient`].
//!
//! The URL scheme picks the transport: `http(s)://` polls for new blocks,
//! `ws(s)://` follows a `newHeads` subscription.

use std::time::Duration;

use chainagent_core::{RunnerConfig, RunnerError};
use chainagent_rpc::{HttpClientConfig, HttpRpcClient, RetryConfig, RpcTransport, WsClientConfig, WsRpcClient};

use crate::client::EvmChainClient;

pub struct EvmClientBuilder {
    url: String,
    http: HttpClientConfig,
    poll_interval: Duration,
    confirmation_depth: u64,
}

impl EvmClientBuilder {
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = RunnerConfig::default();
        Self {
            url: url.into(),
            http: HttpClientConfig::default(),
            poll_interval: defaults.poll_interval(),
            confirmation_depth: defaults.confirmation_depth,
        }
    }

    /// Take the live polling settings from a run configuration.
    pub fn runner_config(mut self, config: &RunnerConfig) -> Self {
        self.poll_interval = config.poll_interval();
        self.confirmation_depth = config.confirmation_depth;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Blocks behind head before a live block is emitted.
    pub fn confirmation_depth(mut self, depth: u64) -> Self {
        self.confirmation_depth = depth;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.http.retry = retry;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.http.request_timeout = timeout;
        self
    }

    /// A `ws(s)://` URL spawns the connection task, so it must be called
    /// inside a tokio runtime.
    pub fn build(self) -> Result<EvmChainClient<Box<dyn RpcTransport>>, RunnerError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(RunnerError::missing("jsonRpcUrl"));
        }
        let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
        let transport: Box<dyn RpcTransport> = match scheme.as_deref() {
            Some("http" | "https") => Box::new(
                HttpRpcClient::new(url, self.http)
                    .map_err(|e| RunnerError::InvalidConfiguration(e.to_string()))?,
            ),
            Some("ws" | "wss") => Box::new(WsRpcClient::connect(
                url,
                WsClientConfig {
                    request_timeout: self.http.request_timeout,
                    ..WsClientConfig::default()
                },
            )),
            _ => {
                return Err(RunnerError::InvalidConfiguration(format!(
                    "jsonRpcUrl {url}: expected an http(s):// or ws(s):// URL"
                )))
            }
        };
        Ok(EvmChainClient::new(
            transport,
            self.poll_interval,
            self.confirmation_depth,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_url_is_missing_configuration() {
        let err = EvmClientBuilder::new(" ").build().err().unwrap();
        assert_eq!(err.to_string(), "missing configuration: no jsonRpcUrl provided");
    }

    #[test]
    fn builds_with_url() {
        let config = RunnerConfig {
            poll_interval_ms: 500,
            ..Default::default()
        };
        let client = EvmClientBuilder::new("http://localhost:8545")
            .runner_config(&config)
            .build()
            .unwrap();
        assert_eq!(client.url(), "http://localhost:8545");
    }

    #[tokio::test]
    async fn websocket_url_builds_subscribing_client() {
        let client = EvmClientBuilder::new("ws://127.0.0.1:1").build().unwrap();
        assert_eq!(client.url(), "ws://127.0.0.1:1");
    }

    #[test]
    fn unknown_scheme_is_invalid_configuration() {
        for url in ["ftp://node", "localhost:8545"] {
            let err = EvmClientBuilder::new(url).build().err().unwrap();
            assert!(matches!(err, RunnerError::InvalidConfiguration(_)), "{url}: {err}");
        }
    }
}
