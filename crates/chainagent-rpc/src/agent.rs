//! Agent invocation protocol and the HTTP transport the runner uses.
//!
//! Each invocation is one JSON-RPC call to the agent's endpoint:
//!
//! | Method | Params |
//! |--------|--------|
//! | `agent_evaluateBlock` | `[{ agentId, block }]` |
//! | `agent_evaluateTx` | `[{ agentId, block, transaction }]` (block without transactions) |
//!
//! The result is an [`AgentResponse`]. Invocations are never retried.

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use chainagent_core::{
    Agent, AgentTransport, Block, DispatchRequest, InvocationOutcome, ReportedFinding, Transaction,
};

use crate::error::TransportError;
use crate::wire::{RpcRequest, RpcResponse};

/// Block handler call; params are [`EvaluateBlockParams`].
pub const METHOD_EVALUATE_BLOCK: &str = "agent_evaluateBlock";
/// Transaction handler call; params are [`EvaluateTxParams`].
pub const METHOD_EVALUATE_TX: &str = "agent_evaluateTx";

/// Block header fields sent alongside a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockContext {
    pub number: u64,
    pub hash: String,
    #[serde(default)]
    pub parent_hash: String,
    pub timestamp: i64,
}

impl From<&Block> for BlockContext {
    fn from(block: &Block) -> Self {
        Self {
            number: block.number,
            hash: block.hash.clone(),
            parent_hash: block.parent_hash.clone(),
            timestamp: block.timestamp,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateBlockParams<'a> {
    pub agent_id: Cow<'a, str>,
    pub block: Cow<'a, Block>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateTxParams<'a> {
    pub agent_id: Cow<'a, str>,
    pub block: BlockContext,
    pub transaction: Cow<'a, Transaction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
/// `ERROR` means the agent ran and failed; it maps to `AgentFault`.
pub enum ResponseStatus {
    Success,
    Error,
}

/// What an agent returns for one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Result object of both agent methods.
pub struct AgentResponse {
    pub status: ResponseStatus,
    #[serde(default)]
    pub findings: Vec<ReportedFinding>,
    /// Messages accompanying an `ERROR` status.
    #[serde(default)]
    pub errors: Vec<String>,
}

impl AgentResponse {
    pub fn success(findings: Vec<ReportedFinding>) -> Self {
        Self {
            status: ResponseStatus::Success,
            findings,
            errors: vec![],
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            findings: vec![],
            errors: vec![message.into()],
        }
    }

    /// Normalise into an outcome, attributing findings to `agent_id`.
    pub fn into_outcome(self, agent_id: &str, request: &DispatchRequest) -> InvocationOutcome {
        match self.status {
            ResponseStatus::Error => {
                let detail = if self.errors.is_empty() {
                    "agent reported an error".to_string()
                } else {
                    self.errors.join("; ")
                };
                InvocationOutcome::AgentFault(detail)
            }
            ResponseStatus::Success => InvocationOutcome::from_findings(
                self.findings
                    .into_iter()
                    .map(|f| f.attribute(agent_id, request.event_ref()))
                    .collect(),
            ),
        }
    }
}

/// Build the JSON-RPC method and params for one dispatch unit.
pub fn encode_request<'a>(
    agent_id: &'a str,
    request: &'a DispatchRequest,
) -> Result<(&'static str, serde_json::Value), TransportError> {
    let params = match request.transaction() {
        Some(tx) => (
            METHOD_EVALUATE_TX,
            serde_json::to_value(EvaluateTxParams {
                agent_id: Cow::Borrowed(agent_id),
                block: BlockContext::from(request.block()),
                transaction: Cow::Borrowed(tx),
            })?,
        ),
        None => (
            METHOD_EVALUATE_BLOCK,
            serde_json::to_value(EvaluateBlockParams {
                agent_id: Cow::Borrowed(agent_id),
                block: Cow::Borrowed(request.block()),
            })?,
        ),
    };
    Ok(params)
}

/// Invokes agents over HTTP JSON-RPC, one attempt per invocation.
pub struct RpcAgentTransport {
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl RpcAgentTransport {
    pub fn new() -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Other(format!("cannot build HTTP client: {e}")))?;
        Ok(Self::with_client(http))
    }

    /// Use a preconfigured client. Its own timeout is overridden per call by
    /// the invocation deadline.
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            http,
            next_id: AtomicU64::new(1),
        }
    }

    async fn evaluate(
        &self,
        agent: &Agent,
        request: &DispatchRequest,
        deadline: Duration,
    ) -> Result<AgentResponse, TransportError> {
        let timeout_ms = deadline.as_millis() as u64;
        let (method, params) = encode_request(&agent.id, request)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let rpc = RpcRequest::new(id, method, vec![params]);

        let resp = self
            .http
            .post(&agent.endpoint)
            .timeout(deadline)
            .json(&rpc)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?;
        if !resp.status().is_success() {
            return Err(TransportError::Http(format!("HTTP {}", resp.status().as_u16())));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(e, timeout_ms))?;

        let resp: RpcResponse = serde_json::from_slice(&body)?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }
}

#[async_trait]
impl AgentTransport for RpcAgentTransport {
    async fn invoke(
        &self,
        agent: &Agent,
        request: &DispatchRequest,
        deadline: Duration,
    ) -> InvocationOutcome {
        match self.evaluate(agent, request, deadline).await {
            Ok(resp) => resp.into_outcome(&agent.id, request),
            Err(TransportError::Timeout { .. }) => InvocationOutcome::Timeout,
            // The agent itself reported the failure.
            Err(e @ TransportError::Rpc(_)) => InvocationOutcome::AgentFault(e.to_string()),
            // Unreachable, non-2xx or a body that is not a response envelope.
            Err(e) => InvocationOutcome::TransportFault(e.to_string()),
        }
    }
}
