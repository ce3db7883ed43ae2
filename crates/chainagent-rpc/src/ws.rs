//! WebSocket JSON-RPC client for chain nodes.
//!
//! A background task owns the connection. Callers' requests are multiplexed
//! over it under connection-local ids, and `eth_subscription` notifications
//! are routed to their subscriber. On disconnect, pending requests fail, the
//! task reconnects with exponential backoff and re-issues every live
//! subscription, re-keying it under the id the node hands back.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::transport::{Notifications, RpcTransport};
use crate::wire::{RpcRequest, RpcResponse};

#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Delay before the first reconnect attempt.
    pub reconnect_initial: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_max: Duration,
    /// Deadline for one request, including time spent waiting for a reconnect.
    pub request_timeout: Duration,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            request_timeout: Duration::from_secs(30),
        }
    }
}

type CallReply = oneshot::Sender<Result<RpcResponse, TransportError>>;
type SubscribeReply = oneshot::Sender<Result<Notifications, TransportError>>;

enum Command {
    Call { req: RpcRequest, reply: CallReply },
    Subscribe { kind: String, params: Vec<Value>, reply: SubscribeReply },
}

/// JSON-RPC over one auto-reconnecting WebSocket connection.
pub struct WsRpcClient {
    url: String,
    commands: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
    request_timeout: Duration,
}

impl WsRpcClient {
    /// Start the connection task for `url`.
    ///
    /// Must be called inside a Tokio runtime. Connecting happens in the
    /// background; requests issued before it succeeds wait for it.
    pub fn connect(url: impl Into<String>, config: WsClientConfig) -> Self {
        let url = url.into();
        let (commands, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let request_timeout = config.request_timeout;
        tokio::spawn(connection_task(url.clone(), config, rx, shutdown.clone()));
        Self {
            url,
            commands,
            shutdown,
            request_timeout,
        }
    }

    async fn await_reply<T>(&self, rx: oneshot::Receiver<Result<T, TransportError>>) -> Result<T, TransportError> {
        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::WebSocket("connection task stopped".into())),
            Err(_) => Err(TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }),
        }
    }

    fn submit(&self, command: Command) -> Result<(), TransportError> {
        self.commands
            .send(command)
            .map_err(|_| TransportError::WebSocket("connection task stopped".into()))
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: RpcRequest) -> Result<RpcResponse, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Call { req, reply })?;
        self.await_reply(rx).await
    }

    fn url(&self) -> &str {
        &self.url
    }

    fn supports_subscriptions(&self) -> bool {
        true
    }

    async fn subscribe(&self, kind: &str, params: Vec<Value>) -> Result<Notifications, TransportError> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::Subscribe {
            kind: kind.to_string(),
            params,
            reply,
        })?;
        self.await_reply(rx).await
    }
}

// ─── Connection task ──────────────────────────────────────────────────────────

enum Pending {
    /// A caller's request; `id` is the caller's own id, restored on the reply.
    Call { id: Value, reply: CallReply },
    Subscribe { kind: String, params: Vec<Value>, reply: SubscribeReply },
    /// Re-issued after a reconnect for the subscription known as `previous`.
    Resubscribe { previous: String },
    /// Fire and forget.
    Ignore,
}

struct Subscription {
    kind: String,
    params: Vec<Value>,
    sender: mpsc::UnboundedSender<Value>,
}

/// State that outlives a single connection.
#[derive(Default)]
struct Session {
    next_id: u64,
    pending: HashMap<u64, Pending>,
    subscriptions: HashMap<String, Subscription>,
}

impl Session {
    /// Register `pending` and render the frame to send.
    fn request(&mut self, method: &str, params: Vec<Value>, pending: Pending) -> String {
        self.next_id += 1;
        let id = self.next_id;
        self.pending.insert(id, pending);
        json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params}).to_string()
    }

    fn outgoing(&mut self, command: Command) -> Option<String> {
        match command {
            Command::Call { req, reply } => {
                let RpcRequest { method, params, id, .. } = req;
                Some(self.request(&method, params, Pending::Call { id, reply }))
            }
            Command::Subscribe { kind, params, reply } => {
                let args = subscribe_params(&kind, &params);
                Some(self.request("eth_subscribe", args, Pending::Subscribe { kind, params, reply }))
            }
        }
    }

    /// Frames that re-create every subscription on a fresh connection.
    fn resubscribe_all(&mut self) -> Vec<String> {
        let requests: Vec<(String, Vec<Value>)> = self
            .subscriptions
            .iter()
            .map(|(id, sub)| (id.clone(), subscribe_params(&sub.kind, &sub.params)))
            .collect();
        requests
            .into_iter()
            .map(|(previous, args)| self.request("eth_subscribe", args, Pending::Resubscribe { previous }))
            .collect()
    }

    /// Handle one text frame. Returns a frame to send back, if any.
    fn incoming(&mut self, text: &str) -> Option<String> {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            tracing::debug!("unparsable WebSocket frame");
            return None;
        };
        if value["method"] == "eth_subscription" {
            return self.notification(&value["params"]);
        }
        let mut resp: RpcResponse = match serde_json::from_value(value) {
            Ok(resp) => resp,
            Err(e) => {
                tracing::debug!(error = %e, "WebSocket frame is neither a response nor a notification");
                return None;
            }
        };
        let pending = resp.id.as_u64().and_then(|id| self.pending.remove(&id))?;
        match pending {
            Pending::Call { id, reply } => {
                resp.id = id;
                let _ = reply.send(Ok(resp));
            }
            Pending::Subscribe { kind, params, reply } => {
                let result = subscription_id(resp).map(|id| {
                    let (sender, rx) = mpsc::unbounded_channel();
                    tracing::debug!(subscription = %id, kind = %kind, "subscribed");
                    self.subscriptions.insert(id, Subscription { kind, params, sender });
                    rx
                });
                let _ = reply.send(result);
            }
            Pending::Resubscribe { previous } => {
                let Some(sub) = self.subscriptions.remove(&previous) else {
                    return None;
                };
                match subscription_id(resp) {
                    Ok(id) => {
                        tracing::info!(previous = %previous, subscription = %id, kind = %sub.kind, "resubscribed");
                        self.subscriptions.insert(id, sub);
                    }
                    // Dropping the sender ends the subscriber's stream.
                    Err(e) => tracing::error!(kind = %sub.kind, error = %e, "resubscribe failed"),
                }
            }
            Pending::Ignore => {}
        }
        None
    }

    fn notification(&mut self, params: &Value) -> Option<String> {
        let id = params["subscription"].as_str()?;
        let sub = self.subscriptions.get(id)?;
        if sub.sender.send(params["result"].clone()).is_ok() {
            return None;
        }
        tracing::debug!(subscription = %id, "subscriber gone, unsubscribing");
        let id = id.to_string();
        self.subscriptions.remove(&id);
        Some(self.request("eth_unsubscribe", vec![Value::String(id)], Pending::Ignore))
    }

    /// Fail every request still waiting on the connection that just dropped.
    fn fail_pending(&mut self, reason: &str) {
        for (_, pending) in self.pending.drain() {
            let err = || TransportError::WebSocket(reason.to_string());
            match pending {
                Pending::Call { reply, .. } => {
                    let _ = reply.send(Err(err()));
                }
                Pending::Subscribe { reply, .. } => {
                    let _ = reply.send(Err(err()));
                }
                Pending::Resubscribe { .. } | Pending::Ignore => {}
            }
        }
    }
}

fn subscribe_params(kind: &str, params: &[Value]) -> Vec<Value> {
    std::iter::once(Value::String(kind.to_string()))
        .chain(params.iter().cloned())
        .collect()
}

fn subscription_id(resp: RpcResponse) -> Result<String, TransportError> {
    match resp.into_result().map_err(TransportError::Rpc)? {
        Value::String(id) => Ok(id),
        other => Err(TransportError::Other(format!("unexpected subscription id {other}"))),
    }
}

async fn connection_task(
    url: String,
    config: WsClientConfig,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: CancellationToken,
) {
    let mut session = Session::default();
    let mut backoff = config.reconnect_initial;

    loop {
        tracing::info!(url = %url, "connecting via WebSocket");
        let connected = tokio::select! {
            _ = shutdown.cancelled() => return,
            conn = tokio_tungstenite::connect_async(url.as_str()) => conn,
        };
        match connected {
            Err(e) => tracing::warn!(url = %url, error = %e, backoff_ms = backoff.as_millis() as u64, "WebSocket connect failed"),
            Ok((ws, _)) => {
                backoff = config.reconnect_initial;
                let (mut sink, mut stream) = ws.split();
                let mut alive = true;

                for frame in session.resubscribe_all() {
                    if sink.send(Message::Text(frame.into())).await.is_err() {
                        alive = false;
                        break;
                    }
                }

                while alive {
                    let outgoing = tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = sink.close().await;
                            return;
                        }
                        command = commands.recv() => match command {
                            Some(command) => session.outgoing(command),
                            None => return,
                        },
                        msg = stream.next() => match msg {
                            Some(Ok(Message::Text(text))) => session.incoming(text.as_str()),
                            Some(Ok(Message::Close(_))) | None => {
                                alive = false;
                                None
                            }
                            Some(Err(e)) => {
                                tracing::warn!(url = %url, error = %e, "WebSocket receive failed");
                                alive = false;
                                None
                            }
                            Some(Ok(_)) => None,
                        },
                    };
                    if let Some(frame) = outgoing {
                        if sink.send(Message::Text(frame.into())).await.is_err() {
                            alive = false;
                        }
                    }
                }

                session.fail_pending("connection lost");
                tracing::warn!(url = %url, backoff_ms = backoff.as_millis() as u64, "WebSocket disconnected");
            }
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(config.reconnect_max);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_is_restored_on_reply() {
        let mut session = Session::default();
        let (reply, mut rx) = oneshot::channel();
        let frame = session
            .outgoing(Command::Call {
                req: RpcRequest::new(42, "eth_blockNumber", vec![]),
                reply,
            })
            .unwrap();
        let sent: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(sent["id"], 1);

        session.incoming(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#);
        let resp = rx.try_recv().unwrap().unwrap();
        assert_eq!(resp.id, 42);
        assert_eq!(resp.into_result().unwrap(), "0x10");
    }

    #[test]
    fn resubscribe_rekeys_subscription() {
        let mut session = Session::default();
        let (reply, mut rx) = oneshot::channel();
        session.outgoing(Command::Subscribe {
            kind: "newHeads".into(),
            params: vec![],
            reply,
        });
        session.incoming(r#"{"jsonrpc":"2.0","id":1,"result":"0xa"}"#);
        let mut heads = rx.try_recv().unwrap().unwrap();

        let frames = session.resubscribe_all();
        assert_eq!(frames.len(), 1);
        session.incoming(r#"{"jsonrpc":"2.0","id":2,"result":"0xb"}"#);
        session.incoming(
            r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xb","result":{"number":"0x5"}}}"#,
        );
        assert_eq!(heads.try_recv().unwrap()["number"], "0x5");
    }

    #[test]
    fn dropped_subscriber_is_unsubscribed() {
        let mut session = Session::default();
        let (reply, mut rx) = oneshot::channel();
        session.outgoing(Command::Subscribe {
            kind: "newHeads".into(),
            params: vec![],
            reply,
        });
        session.incoming(r#"{"jsonrpc":"2.0","id":1,"result":"0xa"}"#);
        drop(rx.try_recv().unwrap().unwrap());

        let frame = session
            .incoming(r#"{"jsonrpc":"2.0","method":"eth_subscription","params":{"subscription":"0xa","result":{}}}"#)
            .unwrap();
        let sent: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(sent["method"], "eth_unsubscribe");
        assert!(session.subscriptions.is_empty());
    }

    #[test]
    fn disconnect_fails_pending_calls() {
        let mut session = Session::default();
        let (reply, mut rx) = oneshot::channel();
        session.outgoing(Command::Call {
            req: RpcRequest::new(1, "eth_chainId", vec![]),
            reply,
        });
        session.fail_pending("connection lost");
        assert!(matches!(rx.try_recv().unwrap(), Err(TransportError::WebSocket(_))));
    }
}
