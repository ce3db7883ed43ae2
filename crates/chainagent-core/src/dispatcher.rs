//! Dispatcher: fans one block event out to every matching agent.
//!
//! A block is split into a block-level dispatch plus one transaction-level
//! dispatch per transaction. Handlers are resolved from a single registry
//! snapshot taken when the event is dispatched, so an agent registered later
//! never applies to it. Every invocation runs in its own task under its own
//! deadline; one agent's timeout, fault or panic cannot touch another's.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;

use crate::agent::Agent;
use crate::registry::HandlerRegistry;
use crate::transport::AgentTransport;
use crate::types::{
    AgentOutcome, Block, Capability, DispatchRequest, InvocationOutcome, RunEntry,
    TransactionResult,
};

type Invocation = (String, JoinHandle<InvocationOutcome>);

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    transport: Arc<dyn AgentTransport>,
    timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        transport: Arc<dyn AgentTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            timeout,
        }
    }

    /// Start every invocation for `block` and return a future that resolves
    /// to its [`RunEntry`] once all of them have settled.
    ///
    /// Must be called from within a Tokio runtime; invocations begin
    /// immediately, whether or not the returned future is polled.
    pub fn dispatch(&self, seq: u64, block: Arc<Block>) -> impl Future<Output = RunEntry> + Send + 'static {
        let snapshot = self.registry.snapshot();

        let block_calls: Vec<Invocation> = if block.synthetic {
            vec![]
        } else {
            let request = DispatchRequest::Block(Arc::clone(&block));
            snapshot
                .handlers_for(Capability::BlockHandler)
                .into_iter()
                .map(|agent| self.spawn(agent, request.clone()))
                .collect()
        };

        let tx_agents = snapshot.handlers_for(Capability::TransactionHandler);
        let tx_calls: Vec<(String, u32, Vec<Invocation>)> = block
            .transactions
            .iter()
            .enumerate()
            .map(|(index, tx)| {
                let request = DispatchRequest::Transaction {
                    block: Arc::clone(&block),
                    index,
                };
                let calls = tx_agents
                    .iter()
                    .map(|agent| self.spawn(Arc::clone(agent), request.clone()))
                    .collect();
                (tx.hash.clone(), tx.index, calls)
            })
            .collect();

        tracing::debug!(
            seq,
            block = block.number,
            generation = snapshot.generation(),
            block_invocations = block_calls.len(),
            tx_invocations = tx_calls.len() * tx_agents.len(),
            "dispatching block"
        );

        async move {
            let block_outcomes = settle_all(&block, block_calls).await;
            let mut transactions = Vec::with_capacity(tx_calls.len());
            for (hash, index, calls) in tx_calls {
                transactions.push(TransactionResult {
                    hash,
                    index,
                    outcomes: settle_all(&block, calls).await,
                });
            }
            RunEntry {
                seq,
                block,
                block_outcomes,
                transactions,
            }
        }
    }

    fn spawn(&self, agent: Arc<Agent>, request: DispatchRequest) -> Invocation {
        let transport = Arc::clone(&self.transport);
        let deadline = self.timeout;
        let agent_id = agent.id.clone();
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(deadline, transport.invoke(&agent, &request, deadline)).await {
                Ok(outcome) => outcome,
                Err(_) => InvocationOutcome::Timeout,
            }
        });
        (agent_id, handle)
    }
}

async fn settle_all(block: &Block, calls: Vec<Invocation>) -> Vec<AgentOutcome> {
    let (ids, handles): (Vec<String>, Vec<_>) = calls.into_iter().unzip();
    let results = join_all(handles).await;
    ids.into_iter()
        .zip(results)
        .map(|(agent_id, joined)| {
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => InvocationOutcome::AgentFault(format!("invocation aborted: {e}")),
            };
            if outcome.is_fault() {
                tracing::warn!(agent = %agent_id, block = block.number, outcome = %outcome, "agent invocation failed");
            }
            AgentOutcome { agent_id, outcome }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::types::{ReportedFinding, Severity, Transaction};

    struct Counting(AtomicU32);

    #[async_trait]
    impl AgentTransport for Counting {
        async fn invoke(&self, agent: &Agent, req: &DispatchRequest, _d: Duration) -> InvocationOutcome {
            self.0.fetch_add(1, Ordering::Relaxed);
            if agent.id == "finder" {
                let finding = ReportedFinding::new("F-1", "found", Severity::Low)
                    .attribute(&agent.id, req.event_ref());
                InvocationOutcome::Ok(vec![finding])
            } else {
                InvocationOutcome::Empty
            }
        }
    }

    struct Panicking;

    #[async_trait]
    impl AgentTransport for Panicking {
        async fn invoke(&self, agent: &Agent, _r: &DispatchRequest, _d: Duration) -> InvocationOutcome {
            if agent.id == "bad" {
                panic!("boom");
            }
            InvocationOutcome::Empty
        }
    }

    fn block(number: u64, txs: u32, synthetic: bool) -> Arc<Block> {
        Arc::new(Block {
            number,
            hash: format!("0xb{number}"),
            parent_hash: String::new(),
            timestamp: 0,
            transactions: (0..txs)
                .map(|index| Transaction {
                    hash: format!("0xt{number}-{index}"),
                    block_number: number,
                    block_hash: format!("0xb{number}"),
                    index,
                    from: "0x1".into(),
                    to: None,
                    value: "0x0".into(),
                    input: "0x".into(),
                })
                .collect(),
            synthetic,
        })
    }

    #[tokio::test]
    async fn splits_block_into_units() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(Agent::new("finder", "x").with_capability(Capability::BlockHandler));
        registry.register(Agent::new("tx", "y").with_capability(Capability::TransactionHandler));
        let transport = Arc::new(Counting(AtomicU32::new(0)));
        let dispatcher = Dispatcher::new(registry, transport.clone(), Duration::from_secs(1));

        let entry = dispatcher.dispatch(0, block(101, 2, false)).await;

        assert_eq!(entry.block_outcomes.len(), 1);
        assert_eq!(entry.transactions.len(), 2);
        assert_eq!(entry.transactions[1].hash, "0xt101-1");
        assert_eq!(entry.invocation_count(), 3);
        assert_eq!(entry.findings().count(), 1);
        assert_eq!(transport.0.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn synthetic_block_skips_block_handlers() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(
            Agent::new("both", "x")
                .with_capability(Capability::BlockHandler)
                .with_capability(Capability::TransactionHandler),
        );
        let dispatcher = Dispatcher::new(
            registry,
            Arc::new(Counting(AtomicU32::new(0))),
            Duration::from_secs(1),
        );

        let entry = dispatcher.dispatch(0, block(7, 1, true)).await;
        assert!(entry.block_outcomes.is_empty());
        assert_eq!(entry.transactions[0].outcomes.len(), 1);
    }

    #[tokio::test]
    async fn panic_is_isolated_as_agent_fault() {
        let registry = Arc::new(HandlerRegistry::new());
        registry.register(Agent::new("bad", "x").with_capability(Capability::BlockHandler));
        registry.register(Agent::new("good", "y").with_capability(Capability::BlockHandler));
        let dispatcher = Dispatcher::new(registry, Arc::new(Panicking), Duration::from_secs(1));

        let entry = dispatcher.dispatch(0, block(1, 0, false)).await;
        let bad = entry.block_outcomes.iter().find(|o| o.agent_id == "bad").unwrap();
        let good = entry.block_outcomes.iter().find(|o| o.agent_id == "good").unwrap();
        assert!(matches!(bad.outcome, InvocationOutcome::AgentFault(_)));
        assert_eq!(good.outcome, InvocationOutcome::Empty);
    }
}
