//! The `RpcTransport` trait: how chain clients reach a node.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::wire::{RpcRequest, RpcResponse};

/// `eth_subscription` payloads (the `result` field) for one subscription.
pub type Notifications = mpsc::UnboundedReceiver<Value>;

#[async_trait]
pub trait RpcTransport: Send + Sync + 'static {
    /// Send one request and return the raw response.
    async fn send(&self, req: RpcRequest) -> Result<RpcResponse, TransportError>;

    /// The endpoint this transport talks to.
    fn url(&self) -> &str;

    /// Whether [`subscribe`](Self::subscribe) is available.
    fn supports_subscriptions(&self) -> bool {
        false
    }

    /// Open an `eth_subscribe` subscription of `kind` (e.g. `"newHeads"`).
    async fn subscribe(&self, kind: &str, params: Vec<Value>) -> Result<Notifications, TransportError> {
        let _ = params;
        Err(TransportError::Other(format!(
            "{kind} subscriptions need a WebSocket endpoint, {} is not one",
            self.url()
        )))
    }

    /// Call `method` and deserialize its result.
    async fn call<T: DeserializeOwned>(
        &self,
        id: u64,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, TransportError>
    where
        Self: Sized,
    {
        let resp = self.send(RpcRequest::new(id, method, params)).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        Ok(serde_json::from_value(result)?)
    }
}

/// Lets a client pick HTTP or WebSocket at runtime from the endpoint URL.
#[async_trait]
impl RpcTransport for Box<dyn RpcTransport> {
    async fn send(&self, req: RpcRequest) -> Result<RpcResponse, TransportError> {
        (**self).send(req).await
    }

    fn url(&self) -> &str {
        (**self).url()
    }

    fn supports_subscriptions(&self) -> bool {
        (**self).supports_subscriptions()
    }

    async fn subscribe(&self, kind: &str, params: Vec<Value>) -> Result<Notifications, TransportError> {
        (**self).subscribe(kind, params).await
    }
}
