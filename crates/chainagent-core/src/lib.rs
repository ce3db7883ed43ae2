//! chainagent-core: the pipeline that feeds chain events to detection agents.
//!
//! # Architecture
//!
//! ```text
//! Runner
//!   ├── SourceFactory → EventSource (tx | range | file | live + ReorderWindow)
//!   ├── HandlerRegistry (atomic snapshots of registered agents)
//!   ├── Dispatcher      (parallel fan-out, per-agent deadline and isolation)
//!   │     └── AgentTransport (remote invocation → InvocationOutcome)
//!   └── ResultSink      (entries in source order)
//! ```

pub mod agent;
pub mod builder;
pub mod config;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod registry;
pub mod reorder;
pub mod runner;
pub mod settings;
pub mod sink;
pub mod source;
pub mod sources;
pub mod transport;
pub mod types;

pub use agent::Agent;
pub use builder::RunnerBuilder;
pub use config::RunnerConfig;
pub use directory::{AgentDirectory, StaticDirectory};
pub use dispatcher::Dispatcher;
pub use error::RunnerError;
pub use registry::{HandlerRegistry, RegistrySnapshot};
pub use runner::{RunSummary, Runner, RunnerParts};
pub use settings::Settings;
pub use sink::{ConsoleSink, FanoutSink, JsonlSink, MemorySink, ResultSink};
pub use source::{BlockStream, ChainClient, EventSource, SourceFactory, SourceMode};
pub use sources::ChainSourceFactory;
pub use transport::AgentTransport;
pub use types::{
    AgentOutcome, Block, Capability, DispatchRequest, EventRef, Finding, InvocationOutcome,
    ReportedFinding, RunEntry, Severity, Transaction, TransactionResult,
};
