//! Serves a [`DetectionAgent`] over HTTP JSON-RPC, the other end of
//! [`RpcAgentTransport`](crate::agent::RpcAgentTransport).

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::net::TcpListener;

use chainagent_core::{Block, ReportedFinding, Transaction};

use crate::agent::{
    AgentResponse, BlockContext, EvaluateBlockParams, EvaluateTxParams, METHOD_EVALUATE_BLOCK,
    METHOD_EVALUATE_TX,
};
use crate::wire::{
    RpcErrorObject, RpcRequest, RpcResponse, INTERNAL_ERROR, INVALID_PARAMS, METHOD_NOT_FOUND,
    PARSE_ERROR,
};

/// Detection logic run inside an agent process.
///
/// An `Err` is reported to the runner as an `ERROR` response.
#[async_trait]
pub trait DetectionAgent: Send + Sync + 'static {
    async fn handle_block(&self, block: &Block) -> Result<Vec<ReportedFinding>, String> {
        let _ = block;
        Ok(vec![])
    }

    async fn handle_transaction(
        &self,
        block: &BlockContext,
        tx: &Transaction,
    ) -> Result<Vec<ReportedFinding>, String> {
        let _ = (block, tx);
        Ok(vec![])
    }
}

type SharedAgent = Arc<dyn DetectionAgent>;

#[derive(Clone)]
pub struct AgentServer {
    agent: SharedAgent,
}

impl AgentServer {
    pub fn new(agent: impl DetectionAgent) -> Self {
        Self {
            agent: Arc::new(agent),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", post(handle_rpc))
            .with_state(Arc::clone(&self.agent))
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> std::io::Result<()> {
        tracing::info!(addr = ?listener.local_addr().ok(), "agent server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
    }
}

async fn handle_rpc(State(agent): State<SharedAgent>, body: Bytes) -> Json<RpcResponse> {
    let req: RpcRequest = match serde_json::from_slice(&body) {
        Ok(req) => req,
        Err(e) => {
            return Json(RpcResponse::failure(
                Value::Null,
                RpcErrorObject::new(PARSE_ERROR, e.to_string()),
            ))
        }
    };
    let id = req.id.clone();
    let response = match evaluate(agent.as_ref(), req).await {
        Ok(resp) => match serde_json::to_value(resp) {
            Ok(result) => RpcResponse::success(id, result),
            Err(e) => RpcResponse::failure(id, RpcErrorObject::new(INTERNAL_ERROR, e.to_string())),
        },
        Err(err) => RpcResponse::failure(id, err),
    };
    Json(response)
}

async fn evaluate(agent: &dyn DetectionAgent, req: RpcRequest) -> Result<AgentResponse, RpcErrorObject> {
    let result = match req.method.as_str() {
        METHOD_EVALUATE_BLOCK => {
            let params: EvaluateBlockParams<'static> = first_param(req.params)?;
            tracing::debug!(block = params.block.number, "evaluating block");
            agent.handle_block(&params.block).await
        }
        METHOD_EVALUATE_TX => {
            let params: EvaluateTxParams<'static> = first_param(req.params)?;
            tracing::debug!(tx = %params.transaction.hash, "evaluating transaction");
            agent.handle_transaction(&params.block, &params.transaction).await
        }
        other => {
            return Err(RpcErrorObject::new(
                METHOD_NOT_FOUND,
                format!("method {other} not found"),
            ))
        }
    };
    Ok(match result {
        Ok(findings) => AgentResponse::success(findings),
        Err(message) => {
            tracing::warn!(error = %message, "agent handler failed");
            AgentResponse::error(message)
        }
    })
}

fn first_param<T: DeserializeOwned>(params: Vec<Value>) -> Result<T, RpcErrorObject> {
    let value = params
        .into_iter()
        .next()
        .ok_or_else(|| RpcErrorObject::new(INVALID_PARAMS, "missing params"))?;
    serde_json::from_value(value).map_err(|e| RpcErrorObject::new(INVALID_PARAMS, e.to_string()))
}
