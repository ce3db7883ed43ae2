//! EVM implementation of [`ChainClient`] over any [`RpcTransport`].
//!
//! Live blocks come from a background task, in the style of an indexer's live
//! loop: whenever the head moves, each block up to `head - confirmation_depth`
//! not yet sent is fetched and pushed in order. Over WebSocket the head comes
//! from a `newHeads` subscription; otherwise it is polled every
//! `poll_interval`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use chainagent_core::{Block, BlockStream, ChainClient, RunnerError, Transaction};
use chainagent_rpc::{Notifications, RpcTransport, TransportError};

use crate::fetcher::{block_from_json, header_from_json, parse_hex_u64, tx_from_json};

/// Buffered live blocks before the poller waits for the runner.
const LIVE_CHANNEL_CAPACITY: usize = 64;

/// Chain client for one EVM node.
///
/// Live stream tasks share its transport through an `Arc`.
pub struct EvmChainClient<T> {
    inner: Arc<Inner<T>>,
    poll_interval: Duration,
    confirmation_depth: u64,
}

struct Inner<T> {
    transport: T,
    next_id: AtomicU64,
}

impl<T: RpcTransport> Inner<T> {
    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value, RunnerError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.transport
            .call(id, method, params)
            .await
            .map_err(|e: TransportError| RunnerError::Source(format!("{method}: {e}")))
    }

    async fn block_number(&self) -> Result<u64, RunnerError> {
        let head = self.call("eth_blockNumber", vec![]).await?;
        head.as_str()
            .and_then(parse_hex_u64)
            .ok_or_else(|| RunnerError::Source(format!("eth_blockNumber: bad quantity {head}")))
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, RunnerError> {
        self.fetch_block(number, true).await
    }

    /// `full` selects transaction objects over transaction hashes.
    async fn fetch_block(&self, number: u64, full: bool) -> Result<Option<Block>, RunnerError> {
        let raw = self
            .call("eth_getBlockByNumber", vec![json!(format!("0x{number:x}")), json!(full)])
            .await?;
        if raw.is_null() {
            return Ok(None);
        }
        let decoded = if full {
            block_from_json(&raw)
        } else {
            header_from_json(&raw)
        };
        decoded
            .map(Some)
            .ok_or_else(|| RunnerError::Source(format!("block {number}: malformed response")))
    }
}

impl<T: RpcTransport> EvmChainClient<T> {
    /// `poll_interval` is only used when `transport` cannot subscribe.
    pub fn new(transport: T, poll_interval: Duration, confirmation_depth: u64) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                next_id: AtomicU64::new(1),
            }),
            poll_interval,
            confirmation_depth,
        }
    }

    pub fn url(&self) -> &str {
        self.inner.transport.url()
    }
}

#[async_trait]
impl<T: RpcTransport> ChainClient for EvmChainClient<T> {
    async fn block_number(&self) -> Result<u64, RunnerError> {
        self.inner.block_number().await
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, RunnerError> {
        self.inner.block(number).await
    }

    async fn block_header(&self, number: u64) -> Result<Option<Block>, RunnerError> {
        self.inner.fetch_block(number, false).await
    }

    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, RunnerError> {
        let raw = self.inner.call("eth_getTransactionByHash", vec![json!(hash)]).await?;
        if raw.is_null() {
            return Ok(None);
        }
        let tx = tx_from_json(&raw);
        if tx.is_none() {
            tracing::debug!(tx = hash, "transaction not mined yet");
        }
        Ok(tx)
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, RunnerError> {
        let head = self.inner.block_number().await?;
        let start = head.saturating_sub(self.confirmation_depth);
        let (tx, rx) = mpsc::channel(LIVE_CHANNEL_CAPACITY);
        let inner = Arc::clone(&self.inner);

        if self.inner.transport.supports_subscriptions() {
            let heads = self
                .inner
                .transport
                .subscribe("newHeads", vec![])
                .await
                .map_err(|e| RunnerError::Source(format!("eth_subscribe newHeads: {e}")))?;
            tokio::spawn(follow_heads(inner, tx, start, head, heads, self.confirmation_depth));
            tracing::info!(start, "live subscription started on newHeads");
        } else {
            tokio::spawn(poll_blocks(
                inner,
                tx,
                start,
                self.poll_interval,
                self.confirmation_depth,
            ));
            tracing::info!(start, poll_ms = self.poll_interval.as_millis() as u64, "live subscription started");
        }

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

/// Send every block from `*next` up to `head - confirmation_depth`.
/// Returns `false` once the receiver is gone.
async fn catch_up<T: RpcTransport>(
    inner: &Inner<T>,
    tx: &mpsc::Sender<Result<Block, RunnerError>>,
    next: &mut u64,
    head: u64,
    confirmation_depth: u64,
) -> bool {
    let confirmed = head.saturating_sub(confirmation_depth);
    while *next <= confirmed {
        let item = match inner.block(*next).await {
            Ok(Some(block)) => Ok(block),
            // Head moved past a block the node cannot serve yet.
            Ok(None) => break,
            Err(e) => Err(e),
        };
        let failed = item.is_err();
        if tx.send(item).await.is_err() {
            return false;
        }
        if failed {
            break;
        }
        *next += 1;
    }
    true
}

/// Push confirmed blocks from `next` onward until the receiver goes away.
async fn poll_blocks<T: RpcTransport>(
    inner: Arc<Inner<T>>,
    tx: mpsc::Sender<Result<Block, RunnerError>>,
    mut next: u64,
    poll_interval: Duration,
    confirmation_depth: u64,
) {
    loop {
        match inner.block_number().await {
            Ok(head) => {
                if !catch_up(&inner, &tx, &mut next, head, confirmation_depth).await {
                    return;
                }
            }
            Err(e) => {
                if tx.send(Err(e)).await.is_err() {
                    return;
                }
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {}
            _ = tx.closed() => return,
        }
    }
}

/// Like [`poll_blocks`], with the head taken from `newHeads` notifications.
/// Ends the stream when the subscription closes.
async fn follow_heads<T: RpcTransport>(
    inner: Arc<Inner<T>>,
    tx: mpsc::Sender<Result<Block, RunnerError>>,
    mut next: u64,
    head: u64,
    mut heads: Notifications,
    confirmation_depth: u64,
) {
    if !catch_up(&inner, &tx, &mut next, head, confirmation_depth).await {
        return;
    }
    loop {
        let notification = tokio::select! {
            n = heads.recv() => n,
            _ = tx.closed() => return,
        };
        let Some(raw) = notification else {
            tracing::warn!("newHeads subscription closed");
            return;
        };
        match header_from_json(&raw) {
            Some(header) => {
                if !catch_up(&inner, &tx, &mut next, header.number, confirmation_depth).await {
                    return;
                }
            }
            None => tracing::warn!(head = %raw, "malformed newHeads notification"),
        }
    }
}
