//! HTTP JSON-RPC client for chain nodes, backed by `reqwest`.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::retry::{RetryConfig, RetryPolicy};
use crate::transport::RpcTransport;
use crate::wire::{RpcRequest, RpcResponse};

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Backoff for transient failures (connection errors, non-2xx, timeouts).
    pub retry: RetryConfig,
    /// Deadline for a single attempt, not for the whole retry sequence.
    pub request_timeout: Duration,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC client that retries transient failures with exponential backoff.
pub struct HttpRpcClient {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    timeout_ms: u64,
}

impl HttpRpcClient {
    pub fn new(url: impl Into<String>, config: HttpClientConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::Other(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(url, http, config))
    }

    /// Share an existing `reqwest::Client` (connection pool).
    pub fn with_client(
        url: impl Into<String>,
        http: reqwest::Client,
        config: HttpClientConfig,
    ) -> Self {
        Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            timeout_ms: config.request_timeout.as_millis() as u64,
        }
    }

    async fn send_once(&self, req: &RpcRequest) -> Result<RpcResponse, TransportError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout_ms))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Http(format!("HTTP {status}: {body}")));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, self.timeout_ms))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl RpcTransport for HttpRpcClient {
    async fn send(&self, req: RpcRequest) -> Result<RpcResponse, TransportError> {
        let mut attempt = 0u32;
        loop {
            match self.send_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() => {
                    attempt += 1;
                    match self.retry.next_delay(attempt) {
                        Some(delay) => {
                            tracing::warn!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                method = %req.method,
                                error = %e,
                                url = %self.url,
                                "retrying request"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            tracing::error!(
                                attempts = attempt,
                                method = %req.method,
                                error = %e,
                                url = %self.url,
                                "giving up on request"
                            );
                            return Err(e);
                        }
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn url(&self) -> &str {
        &self.url
    }
}
