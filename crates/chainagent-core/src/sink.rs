//! Result sinks: where ordered run entries go.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::error::RunnerError;
use crate::types::{InvocationOutcome, RunEntry};

/// Receives run entries strictly in event order.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn emit(&self, entry: &RunEntry) -> Result<(), RunnerError>;

    /// Called once after the last entry of a run.
    async fn flush(&self) -> Result<(), RunnerError> {
        Ok(())
    }
}

// ─── In-memory sink ───────────────────────────────────────────────────────────

/// Collects entries in memory, for tests and embedding.
#[derive(Default)]
pub struct MemorySink {
    entries: Mutex<Vec<RunEntry>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<RunEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RunEntry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn emit(&self, entry: &RunEntry) -> Result<(), RunnerError> {
        self.lock().push(entry.clone());
        Ok(())
    }
}

// ─── Console sink ─────────────────────────────────────────────────────────────

/// Prints one line per finding to stdout and logs faults.
#[derive(Default)]
pub struct ConsoleSink {
    /// Also print a line for events with no findings.
    pub verbose: bool,
}

#[async_trait]
impl ResultSink for ConsoleSink {
    async fn emit(&self, entry: &RunEntry) -> Result<(), RunnerError> {
        let mut found = false;
        for finding in entry.findings() {
            found = true;
            println!(
                "[{:?}] block {} {} {}: {} ({})",
                finding.severity,
                entry.block.number,
                finding.agent_id,
                finding.alert_id,
                finding.name,
                finding.event.hash(),
            );
        }
        for outcome in entry.outcomes() {
            match &outcome.outcome {
                InvocationOutcome::Ok(_) | InvocationOutcome::Empty => {}
                other => tracing::warn!(
                    block = entry.block.number,
                    agent = %outcome.agent_id,
                    outcome = %other,
                    "agent did not complete"
                ),
            }
        }
        if !found && self.verbose {
            println!(
                "block {} ({} txs): no findings",
                entry.block.number,
                entry.block.tx_count()
            );
        }
        Ok(())
    }
}

// ─── JSON Lines sink ──────────────────────────────────────────────────────────

/// Appends each entry as one JSON line, flushed per entry.
pub struct JsonlSink {
    writer: tokio::sync::Mutex<BufWriter<File>>,
}

impl JsonlSink {
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, RunnerError> {
        let file = File::create(path.as_ref()).await?;
        Ok(Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(file)),
        })
    }
}

#[async_trait]
impl ResultSink for JsonlSink {
    async fn emit(&self, entry: &RunEntry) -> Result<(), RunnerError> {
        let mut line =
            serde_json::to_vec(entry).map_err(|e| RunnerError::Sink(e.to_string()))?;
        line.push(b'\n');
        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    async fn flush(&self) -> Result<(), RunnerError> {
        self.writer.lock().await.flush().await?;
        Ok(())
    }
}

// ─── Fan-out ──────────────────────────────────────────────────────────────────

/// Forwards every entry to several sinks, in order. Stops at the first failure.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn ResultSink>>) -> Self {
        Self { sinks }
    }
}

#[async_trait]
impl ResultSink for FanoutSink {
    async fn emit(&self, entry: &RunEntry) -> Result<(), RunnerError> {
        for sink in &self.sinks {
            sink.emit(entry).await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), RunnerError> {
        for sink in &self.sinks {
            sink.flush().await?;
        }
        Ok(())
    }
}
