//! The run orchestrator: drives an event source through the dispatcher
//! into the result sink.
//!
//! # Pipeline
//! ```text
//! source task ──(bounded channel: lookahead)──► runner loop
//!                                                 ├── dispatch ≤ K events concurrently
//!                                                 ├── FuturesOrdered releases entries in source order
//!                                                 └── sink.emit(entry)
//! ```
//!
//! The reorder buffer (`FuturesOrdered`) is owned by the runner loop alone, so
//! no other task can insert into it while a cancellation drain is running.
//!
//! # Termination
//! - End of stream: stop accepting, drain in-flight events, return the summary.
//! - Cancellation: same, and the summary is marked `cancelled`.
//! - Source or sink error: same drain, then the error is returned.

use std::sync::Arc;

use futures::stream::{FuturesOrdered, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::config::RunnerConfig;
use crate::directory::AgentDirectory;
use crate::dispatcher::Dispatcher;
use crate::error::RunnerError;
use crate::registry::HandlerRegistry;
use crate::sink::ResultSink;
use crate::source::{EventSource, SourceFactory, SourceMode};
use crate::transport::AgentTransport;
use crate::types::{Block, InvocationOutcome, RunEntry};

// ─── Summary ──────────────────────────────────────────────────────────────────

/// Totals for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub events: u64,
    pub transactions: u64,
    pub invocations: u64,
    pub findings: u64,
    pub empty: u64,
    pub timeouts: u64,
    pub transport_faults: u64,
    pub agent_faults: u64,
    pub first_block: Option<u64>,
    pub last_block: Option<u64>,
    pub cancelled: bool,
}

impl RunSummary {
    fn record(&mut self, entry: &RunEntry) {
        self.events += 1;
        self.transactions += entry.block.tx_count() as u64;
        self.first_block.get_or_insert(entry.block.number);
        self.last_block = Some(entry.block.number);
        for outcome in entry.outcomes() {
            self.invocations += 1;
            match &outcome.outcome {
                InvocationOutcome::Ok(findings) => self.findings += findings.len() as u64,
                InvocationOutcome::Empty => self.empty += 1,
                InvocationOutcome::Timeout => self.timeouts += 1,
                InvocationOutcome::TransportFault(_) => self.transport_faults += 1,
                InvocationOutcome::AgentFault(_) => self.agent_faults += 1,
            }
        }
    }

    pub fn faults(&self) -> u64 {
        self.timeouts + self.transport_faults + self.agent_faults
    }
}

// ─── Runner ───────────────────────────────────────────────────────────────────

/// Collaborators the runner is built from, constructed once by the caller.
pub struct RunnerParts {
    pub sources: Arc<dyn SourceFactory>,
    pub registry: Arc<HandlerRegistry>,
    pub transport: Arc<dyn AgentTransport>,
    pub sink: Arc<dyn ResultSink>,
    /// Agents to register for the duration of each run.
    pub directory: Option<Arc<dyn AgentDirectory>>,
}

/// Directory agents added for one run, and the registered agents they replaced.
#[derive(Default)]
struct Registration {
    added: Vec<String>,
    displaced: Vec<Arc<Agent>>,
}

pub struct Runner {
    config: RunnerConfig,
    sources: Arc<dyn SourceFactory>,
    registry: Arc<HandlerRegistry>,
    sink: Arc<dyn ResultSink>,
    directory: Option<Arc<dyn AgentDirectory>>,
    dispatcher: Dispatcher,
}

impl Runner {
    pub fn new(config: RunnerConfig, parts: RunnerParts) -> Result<Self, RunnerError> {
        config.validate()?;
        let dispatcher = Dispatcher::new(
            Arc::clone(&parts.registry),
            parts.transport,
            config.invocation_timeout(),
        );
        Ok(Self {
            config,
            sources: parts.sources,
            registry: parts.registry,
            sink: parts.sink,
            directory: parts.directory,
            dispatcher,
        })
    }

    /// Run `mode` to completion, or until `cancel` fires for live mode.
    pub async fn run(&self, mode: &SourceMode, cancel: CancellationToken) -> Result<RunSummary, RunnerError> {
        let registration = self.register_directory().await?;
        let result = self.run_pipeline(mode, cancel).await;
        self.unregister_directory(registration);
        match &result {
            Ok(summary) => tracing::info!(
                mode = %mode,
                events = summary.events,
                invocations = summary.invocations,
                findings = summary.findings,
                faults = summary.faults(),
                cancelled = summary.cancelled,
                "run complete"
            ),
            Err(e) => tracing::error!(mode = %mode, error = %e, "run failed"),
        }
        result
    }

    async fn register_directory(&self) -> Result<Registration, RunnerError> {
        let mut registration = Registration::default();
        let Some(directory) = &self.directory else {
            return Ok(registration);
        };
        let agents = directory.resolve().await?;
        for agent in agents {
            if !agent.enabled {
                tracing::info!(agent = %agent.id, "agent disabled, not registering");
                continue;
            }
            if registration.added.contains(&agent.id) {
                tracing::warn!(agent = %agent.id, "duplicate directory entry, last one wins");
            } else {
                let prior = self.registry.snapshot().get(&agent.id).cloned();
                if let Some(prior) = prior {
                    tracing::debug!(agent = %agent.id, "directory entry shadows a registered agent for this run");
                    registration.displaced.push(prior);
                }
                registration.added.push(agent.id.clone());
            }
            self.registry.register(agent);
        }
        tracing::info!(agents = registration.added.len(), "agents registered");
        Ok(registration)
    }

    /// Remove the run's directory agents and put back any they replaced.
    fn unregister_directory(&self, registration: Registration) {
        for id in &registration.added {
            self.registry.unregister(id);
        }
        for prior in registration.displaced {
            self.registry.register(Agent::clone(&prior));
        }
    }

    async fn run_pipeline(&self, mode: &SourceMode, cancel: CancellationToken) -> Result<RunSummary, RunnerError> {
        let source = self.sources.open(mode).await?;

        let (tx, mut rx) = mpsc::channel(self.config.source_lookahead.max(1));
        let producer_cancel = cancel.child_token();
        let producer = tokio::spawn(produce(source, tx, producer_cancel.clone()));

        let max_in_flight = self.config.max_in_flight;
        let mut in_flight = FuturesOrdered::new();
        let mut summary = RunSummary::default();
        let mut seq = 0u64;
        let mut source_open = true;
        let mut cancelled = false;
        let mut sink_ok = true;
        let mut fatal: Option<RunnerError> = None;

        loop {
            let accepting = source_open && !cancelled && fatal.is_none();
            if !accepting && in_flight.is_empty() {
                break;
            }
            tokio::select! {
                biased;

                _ = cancel.cancelled(), if accepting => {
                    cancelled = true;
                    tracing::info!(in_flight = in_flight.len(), "cancellation requested, draining");
                }

                Some(entry) = in_flight.next(), if !in_flight.is_empty() => {
                    if sink_ok {
                        match self.sink.emit(&entry).await {
                            Ok(()) => summary.record(&entry),
                            Err(e) => {
                                tracing::error!(seq = entry.seq, error = %e, "result sink failed");
                                sink_ok = false;
                                fatal.get_or_insert(e);
                            }
                        }
                    }
                }

                item = rx.recv(), if accepting && in_flight.len() < max_in_flight => match item {
                    Some(Ok(block)) => {
                        in_flight.push_back(self.dispatcher.dispatch(seq, Arc::new(block)));
                        seq += 1;
                    }
                    Some(Err(e)) => {
                        tracing::error!(error = %e, dispatched = seq, "event source failed");
                        fatal = Some(e);
                    }
                    None => {
                        tracing::debug!(dispatched = seq, "event source exhausted");
                        source_open = false;
                    }
                },

                else => break,
            }
        }

        producer_cancel.cancel();
        producer.abort();
        summary.cancelled = cancelled;

        if sink_ok {
            if let Err(e) = self.sink.flush().await {
                fatal.get_or_insert(e);
            }
        }
        match fatal {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

/// Pull blocks from `source` into `tx` until it ends, fails, or is cancelled.
async fn produce(
    mut source: Box<dyn EventSource>,
    tx: mpsc::Sender<Result<Block, RunnerError>>,
    cancel: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            item = source.next() => item,
        };
        match item {
            Ok(Some(block)) => {
                if tx.send(Ok(block)).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                break;
            }
        }
    }
}
