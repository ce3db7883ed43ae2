use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RunnerError;
use crate::source::{ChainClient, EventSource};
use crate::types::Block;

/// Yields one synthetic block wrapping a single transaction, then ends.
pub struct TransactionSource {
    client: Arc<dyn ChainClient>,
    hash: String,
    done: bool,
}

impl TransactionSource {
    pub fn new(client: Arc<dyn ChainClient>, hash: impl Into<String>) -> Self {
        Self {
            client,
            hash: hash.into(),
            done: false,
        }
    }
}

#[async_trait]
impl EventSource for TransactionSource {
    async fn next(&mut self) -> Result<Option<Block>, RunnerError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let tx = self
            .client
            .transaction(&self.hash)
            .await?
            .ok_or_else(|| RunnerError::Source(format!("transaction {} not found", self.hash)))?;

        let (parent_hash, timestamp) = match self.client.block_header(tx.block_number).await? {
            Some(block) => (block.parent_hash, block.timestamp),
            None => {
                tracing::warn!(block = tx.block_number, tx = %tx.hash, "containing block unavailable");
                (String::new(), 0)
            }
        };

        Ok(Some(Block {
            number: tx.block_number,
            hash: tx.block_hash.clone(),
            parent_hash,
            timestamp,
            transactions: vec![tx],
            synthetic: true,
        }))
    }
}
