//! The four event source implementations and the factory that picks one.

mod file;
mod live;
mod range;
mod transaction;

pub use file::FileSource;
pub use live::LiveSource;
pub use range::RangeSource;
pub use transaction::TransactionSource;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RunnerConfig;
use crate::error::RunnerError;
use crate::source::{ChainClient, EventSource, SourceFactory, SourceMode};

/// Opens sources backed by a shared [`ChainClient`].
pub struct ChainSourceFactory {
    client: Option<Arc<dyn ChainClient>>,
    reorder_window: usize,
}

impl ChainSourceFactory {
    pub fn new(client: Arc<dyn ChainClient>, config: &RunnerConfig) -> Self {
        Self {
            client: Some(client),
            reorder_window: config.live_reorder_window,
        }
    }

    /// A factory with no chain client; only `file` mode can be opened.
    pub fn offline(config: &RunnerConfig) -> Self {
        Self {
            client: None,
            reorder_window: config.live_reorder_window,
        }
    }

    fn client(&self) -> Result<Arc<dyn ChainClient>, RunnerError> {
        self.client
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| RunnerError::missing("jsonRpcUrl"))
    }
}

#[async_trait]
impl SourceFactory for ChainSourceFactory {
    async fn open(&self, mode: &SourceMode) -> Result<Box<dyn EventSource>, RunnerError> {
        let source: Box<dyn EventSource> = match mode {
            SourceMode::Transaction(hash) => {
                Box::new(TransactionSource::new(self.client()?, hash.clone()))
            }
            SourceMode::Block(number) => {
                Box::new(RangeSource::new(self.client()?, *number, *number)?)
            }
            SourceMode::Range { start, end } => {
                Box::new(RangeSource::new(self.client()?, *start, *end)?)
            }
            SourceMode::File(path) => Box::new(FileSource::open(path).await?),
            SourceMode::Live => {
                let stream = self.client()?.subscribe_blocks().await?;
                Box::new(LiveSource::new(stream, self.reorder_window))
            }
        };
        tracing::info!(mode = %mode, "event source opened");
        Ok(source)
    }
}
