//! chainagent-rpc: JSON-RPC transports, in both directions.
//!
//! - [`HttpRpcClient`]: talks to a chain node over HTTP, retrying transient failures.
//! - [`WsRpcClient`]: talks to a chain node over WebSocket, with `eth_subscribe`.
//! - [`RpcAgentTransport`]: invokes detection agents, one attempt per event.
//! - [`AgentServer`]: serves a [`DetectionAgent`] so the runner can reach it.

pub mod agent;
pub mod error;
pub mod http;
pub mod retry;
pub mod server;
pub mod transport;
pub mod wire;
pub mod ws;

pub use agent::{AgentResponse, ResponseStatus, RpcAgentTransport};
pub use error::TransportError;
pub use http::{HttpClientConfig, HttpRpcClient};
pub use retry::{RetryConfig, RetryPolicy};
pub use server::{AgentServer, DetectionAgent};
pub use transport::{Notifications, RpcTransport};
pub use wire::{RpcErrorObject, RpcRequest, RpcResponse};
pub use ws::{WsClientConfig, WsRpcClient};
