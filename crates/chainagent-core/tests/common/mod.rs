//! Fakes shared by the pipeline integration tests.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;

use chainagent_core::{
    Agent, AgentTransport, Block, BlockStream, ChainClient, DispatchRequest, EventRef,
    InvocationOutcome, ReportedFinding, RunnerError, Severity, Transaction,
};

pub fn block(number: u64, txs: u32) -> Block {
    Block {
        number,
        hash: format!("0xb{number}"),
        parent_hash: format!("0xb{}", number.saturating_sub(1)),
        timestamp: 1_700_000_000 + (number as i64) * 12,
        transactions: (0..txs)
            .map(|index| Transaction {
                hash: format!("0xt{number}-{index}"),
                block_number: number,
                block_hash: format!("0xb{number}"),
                index,
                from: "0xsender".into(),
                to: Some("0xreceiver".into()),
                value: "0x0".into(),
                input: "0x".into(),
            })
            .collect(),
        synthetic: false,
    }
}

// ─── Chain ────────────────────────────────────────────────────────────────────

type LiveFeed = mpsc::UnboundedReceiver<Result<Block, RunnerError>>;

#[derive(Default)]
pub struct ScriptedChain {
    blocks: BTreeMap<u64, Block>,
    live: Mutex<Option<LiveFeed>>,
}

impl ScriptedChain {
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks: blocks.into_iter().map(|b| (b.number, b)).collect(),
            live: Mutex::new(None),
        }
    }

    /// A chain whose subscription is fed through the returned sender.
    pub fn live() -> (Self, mpsc::UnboundedSender<Result<Block, RunnerError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let chain = Self {
            blocks: BTreeMap::new(),
            live: Mutex::new(Some(rx)),
        };
        (chain, tx)
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn block_number(&self) -> Result<u64, RunnerError> {
        Ok(self.blocks.keys().next_back().copied().unwrap_or(0))
    }

    async fn block(&self, number: u64) -> Result<Option<Block>, RunnerError> {
        Ok(self.blocks.get(&number).cloned())
    }

    async fn block_header(&self, number: u64) -> Result<Option<Block>, RunnerError> {
        Ok(self.blocks.get(&number).map(|b| Block {
            transactions: vec![],
            ..b.clone()
        }))
    }

    async fn transaction(&self, hash: &str) -> Result<Option<Transaction>, RunnerError> {
        Ok(self
            .blocks
            .values()
            .flat_map(|b| b.transactions.iter())
            .find(|t| t.hash == hash)
            .cloned())
    }

    async fn subscribe_blocks(&self) -> Result<BlockStream, RunnerError> {
        let rx = self
            .live
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| RunnerError::Source("already subscribed".into()))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

// ─── Transport ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Behaviour {
    Empty,
    Find,
    Delay(Duration),
    AgentFault(String),
    TransportFault(String),
}

/// Agent transport with per-agent behaviour and per-block delay injection.
#[derive(Default)]
pub struct FakeTransport {
    behaviours: HashMap<String, Behaviour>,
    block_delays: HashMap<u64, Duration>,
    calls: Mutex<Vec<(String, EventRef)>>,
    started_blocks: Mutex<Vec<u64>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agent(mut self, id: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(id.to_string(), behaviour);
        self
    }

    pub fn block_delay(mut self, number: u64, delay: Duration) -> Self {
        self.block_delays.insert(number, delay);
        self
    }

    pub fn calls(&self) -> Vec<(String, EventRef)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn started(&self, number: u64) -> bool {
        self.started_blocks.lock().unwrap().contains(&number)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl AgentTransport for FakeTransport {
    async fn invoke(
        &self,
        agent: &Agent,
        request: &DispatchRequest,
        _deadline: Duration,
    ) -> InvocationOutcome {
        let event = request.event_ref();
        let number = request.block().number;
        self.calls.lock().unwrap().push((agent.id.clone(), event.clone()));
        self.started_blocks.lock().unwrap().push(number);

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if let Some(delay) = self.block_delays.get(&number) {
            tokio::time::sleep(*delay).await;
        }

        match self.behaviours.get(&agent.id).cloned().unwrap_or(Behaviour::Empty) {
            Behaviour::Empty => InvocationOutcome::Empty,
            Behaviour::Find => {
                let finding = ReportedFinding::new("TEST-1", "test finding", Severity::Medium)
                    .attribute(&agent.id, event);
                InvocationOutcome::Ok(vec![finding])
            }
            Behaviour::Delay(delay) => {
                tokio::time::sleep(delay).await;
                InvocationOutcome::Empty
            }
            Behaviour::AgentFault(detail) => InvocationOutcome::AgentFault(detail),
            Behaviour::TransportFault(detail) => InvocationOutcome::TransportFault(detail),
        }
    }
}

pub fn shared<T>(value: T) -> Arc<T> {
    Arc::new(value)
}
