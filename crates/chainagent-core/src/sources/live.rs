use std::collections::VecDeque;

use async_trait::async_trait;
use futures::StreamExt;

use crate::error::RunnerError;
use crate::reorder::ReorderWindow;
use crate::source::{BlockStream, EventSource};
use crate::types::Block;

/// Follows a block subscription. Does not end on its own unless the
/// subscription closes; the runner stops it on cancellation.
///
/// A bad notification is logged and skipped.
pub struct LiveSource {
    stream: BlockStream,
    window: ReorderWindow,
    ready: VecDeque<Block>,
    closed: bool,
}

impl LiveSource {
    pub fn new(stream: BlockStream, reorder_window: usize) -> Self {
        Self {
            stream,
            window: ReorderWindow::new(reorder_window),
            ready: VecDeque::new(),
            closed: false,
        }
    }
}

#[async_trait]
impl EventSource for LiveSource {
    async fn next(&mut self) -> Result<Option<Block>, RunnerError> {
        loop {
            if let Some(block) = self.ready.pop_front() {
                return Ok(Some(block));
            }
            if self.closed {
                return Ok(None);
            }
            match self.stream.next().await {
                Some(Ok(block)) => {
                    tracing::debug!(block = block.number, "live block received");
                    self.ready.extend(self.window.push(block));
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "skipping bad live block");
                }
                None => {
                    tracing::info!("block subscription closed");
                    self.closed = true;
                    self.ready.extend(self.window.drain());
                }
            }
        }
    }
}
