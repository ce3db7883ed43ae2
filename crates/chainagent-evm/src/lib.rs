//! chainagent-evm: the [`ChainClient`](chainagent_core::ChainClient) for EVM nodes.
//!
//! ```rust,no_run
//! use chainagent_core::RunnerConfig;
//! use chainagent_evm::EvmClientBuilder;
//!
//! # fn main() -> Result<(), chainagent_core::RunnerError> {
//! let client = EvmClientBuilder::new("http://localhost:8545")
//!     .runner_config(&RunnerConfig::default())
//!     .build()?;
//! # let _ = client;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod fetcher;

pub use builder::EvmClientBuilder;
pub use client::EvmChainClient;
pub use fetcher::{block_from_json, header_from_json, parse_hex_u64, tx_from_json};
