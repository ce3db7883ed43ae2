use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RunnerError;
use crate::source::{ChainClient, EventSource};
use crate::types::Block;

/// Fetches blocks `[start, end]` in increasing order.
///
/// A block that cannot be fetched ends the source with
/// [`RunnerError::RangeFetch`]; nothing of that block is yielded.
pub struct RangeSource {
    client: Arc<dyn ChainClient>,
    next: u64,
    end: u64,
    done: bool,
}

impl RangeSource {
    pub fn new(client: Arc<dyn ChainClient>, start: u64, end: u64) -> Result<Self, RunnerError> {
        if start > end {
            return Err(RunnerError::InvalidConfiguration(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self {
            client,
            next: start,
            end,
            done: false,
        })
    }
}

#[async_trait]
impl EventSource for RangeSource {
    async fn next(&mut self) -> Result<Option<Block>, RunnerError> {
        if self.done || self.next > self.end {
            return Ok(None);
        }
        let number = self.next;
        let fetched = match self.client.block(number).await {
            Ok(Some(block)) if block.number == number => Ok(block),
            Ok(Some(block)) => Err(format!("node returned block {} instead", block.number)),
            Ok(None) => Err("block not available".to_string()),
            Err(e) => Err(e.to_string()),
        };
        match fetched {
            Ok(block) => {
                tracing::debug!(block = number, txs = block.tx_count(), "fetched block");
                if number == self.end {
                    self.done = true;
                } else {
                    self.next = number + 1;
                }
                Ok(Some(block))
            }
            Err(reason) => {
                self.done = true;
                Err(RunnerError::RangeFetch {
                    block: number,
                    reason,
                })
            }
        }
    }
}
