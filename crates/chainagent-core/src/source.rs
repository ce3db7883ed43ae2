//! Event sources: where the ordered block stream comes from.
//!
//! Four modes share one [`EventSource`] interface so the runner is written
//! once against it:
//!
//! | Mode | Source | Terminates |
//! |------|--------|------------|
//! | `tx <hash>` | [`TransactionSource`](crate::sources::TransactionSource) | after one synthetic block |
//! | `block <n>` / `range <a> <b>` | [`RangeSource`](crate::sources::RangeSource) | after block `b` |
//! | `file <path>` | [`FileSource`](crate::sources::FileSource) | at end of file |
//! | `live` | [`LiveSource`](crate::sources::LiveSource) | only when cancelled |

use std::path::PathBuf;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::RunnerError;
use crate::types::{Block, Transaction};

/// A stream of confirmed blocks from a chain subscription.
pub type BlockStream = Pin<Box<dyn Stream<Item = Result<Block, RunnerError>> + Send>>;

/// The chain client collaborator. Constructed once per process and shared.
#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Current head block number.
    async fn block_number(&self) -> Result<u64, RunnerError>;

    /// Fetch a block with its full transactions. `None` if the node does not have it.
    async fn block(&self, number: u64) -> Result<Option<Block>, RunnerError>;

    /// Fetch a block's header fields only; `transactions` is left empty.
    async fn block_header(&self, number: u64) -> Result<Option<Block>, RunnerError>;

    /// Fetch a single transaction by hash.
    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, RunnerError>;

    /// Subscribe to newly confirmed blocks.
    async fn subscribe_blocks(&self) -> Result<BlockStream, RunnerError>;
}

/// Which origin a run reads its events from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceMode {
    Transaction(String),
    Block(u64),
    Range { start: u64, end: u64 },
    File(PathBuf),
    Live,
}

impl std::fmt::Display for SourceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transaction(hash) => write!(f, "tx {hash}"),
            Self::Block(n) => write!(f, "block {n}"),
            Self::Range { start, end } => write!(f, "range {start}..={end}"),
            Self::File(path) => write!(f, "file {}", path.display()),
            Self::Live => write!(f, "live"),
        }
    }
}

/// An ordered sequence of block events.
///
/// Block numbers never decrease between two successive `Ok(Some(_))` values.
/// After `Ok(None)` or an error the source yields nothing further.
#[async_trait]
pub trait EventSource: Send {
    async fn next(&mut self) -> Result<Option<Block>, RunnerError>;
}

/// Opens the event source for a mode.
#[async_trait]
pub trait SourceFactory: Send + Sync {
    async fn open(&self, mode: &SourceMode) -> Result<Box<dyn EventSource>, RunnerError>;
}
