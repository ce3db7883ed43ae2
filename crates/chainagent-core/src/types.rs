//! Shared types for the agent run pipeline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Block / Transaction ──────────────────────────────────────────────────────

/// A block as produced by an event source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    /// Block number.
    pub number: u64,
    /// Block hash (`0x…`).
    pub hash: String,
    /// Parent block hash (`0x…`).
    #[serde(default)]
    pub parent_hash: String,
    /// Unix timestamp of the block (seconds since epoch).
    pub timestamp: i64,
    /// Transactions in block order.
    #[serde(default)]
    pub transactions: Vec<Transaction>,
    /// Set on the single-transaction wrapper built by transaction mode.
    /// Synthetic blocks are never handed to block handlers.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

impl Block {
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    pub fn event_ref(&self) -> EventRef {
        EventRef::Block {
            number: self.number,
            hash: self.hash.clone(),
        }
    }
}

/// A transaction inside a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    /// Transaction hash (`0x…`).
    pub hash: String,
    /// Number of the block holding this transaction.
    pub block_number: u64,
    /// Hash of the block holding this transaction.
    pub block_hash: String,
    /// Position of the transaction within its block.
    pub index: u32,
    /// Sender address.
    pub from: String,
    /// `None` for contract creation.
    #[serde(default)]
    pub to: Option<String>,
    /// Wei value, hex encoded.
    #[serde(default)]
    pub value: String,
    /// Call data, hex encoded.
    #[serde(default)]
    pub input: String,
}

impl Transaction {
    pub fn event_ref(&self) -> EventRef {
        EventRef::Transaction {
            block_number: self.block_number,
            hash: self.hash.clone(),
        }
    }
}

/// The chain object a finding is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EventRef {
    Block { number: u64, hash: String },
    #[serde(rename_all = "camelCase")]
    Transaction { block_number: u64, hash: String },
}

impl EventRef {
    pub fn hash(&self) -> &str {
        match self {
            Self::Block { hash, .. } | Self::Transaction { hash, .. } => hash,
        }
    }
}

// ─── Capabilities ─────────────────────────────────────────────────────────────

/// A handler an agent exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Capability {
    BlockHandler,
    TransactionHandler,
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BlockHandler => write!(f, "block-handler"),
            Self::TransactionHandler => write!(f, "transaction-handler"),
        }
    }
}

// ─── Findings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    #[default]
    Unknown,
    Info,
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingType {
    #[default]
    Unknown,
    Exploit,
    Suspicious,
    Degraded,
    Info,
}

/// A finding as an agent reports it over the wire, before the runner
/// attributes it to an agent and an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedFinding {
    /// Agent-chosen alert identifier, e.g. `LARGE-TRANSFER-1`.
    pub alert_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, rename = "type")]
    pub finding_type: FindingType,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ReportedFinding {
    pub fn new(alert_id: impl Into<String>, name: impl Into<String>, severity: Severity) -> Self {
        Self {
            alert_id: alert_id.into(),
            name: name.into(),
            description: String::new(),
            severity,
            finding_type: FindingType::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Attribute this finding to `agent_id` and `event`.
    pub fn attribute(self, agent_id: &str, event: EventRef) -> Finding {
        Finding {
            agent_id: agent_id.to_string(),
            event,
            alert_id: self.alert_id,
            name: self.name,
            description: self.description,
            severity: self.severity,
            finding_type: self.finding_type,
            metadata: self.metadata,
            created_at: Utc::now(),
        }
    }
}

/// A result reported by one agent about one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub agent_id: String,
    pub event: EventRef,
    pub alert_id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub finding_type: FindingType,
    pub metadata: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

// ─── Outcomes ─────────────────────────────────────────────────────────────────

/// The normalised result of one agent processing one event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum InvocationOutcome {
    Ok(Vec<Finding>),
    Empty,
    Timeout,
    TransportFault(String),
    AgentFault(String),
}

impl InvocationOutcome {
    /// Builds `Ok` or `Empty` depending on whether anything was found.
    pub fn from_findings(findings: Vec<Finding>) -> Self {
        if findings.is_empty() {
            Self::Empty
        } else {
            Self::Ok(findings)
        }
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            Self::Ok(findings) => findings,
            _ => &[],
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::TransportFault(_) | Self::AgentFault(_)
        )
    }
}

impl std::fmt::Display for InvocationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ok(findings) => write!(f, "{} finding(s)", findings.len()),
            Self::Empty => write!(f, "empty"),
            Self::Timeout => write!(f, "timeout"),
            Self::TransportFault(detail) => write!(f, "transport fault: {detail}"),
            Self::AgentFault(detail) => write!(f, "agent fault: {detail}"),
        }
    }
}

/// One agent's outcome for one dispatch unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutcome {
    pub agent_id: String,
    pub outcome: InvocationOutcome,
}

/// Outcomes of the transaction-level dispatch for one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResult {
    pub hash: String,
    pub index: u32,
    pub outcomes: Vec<AgentOutcome>,
}

/// One entry of a run result: a block event and every outcome it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEntry {
    /// Position of the event in source order, starting at 0.
    pub seq: u64,
    pub block: Arc<Block>,
    /// Outcomes of the block-level dispatch.
    pub block_outcomes: Vec<AgentOutcome>,
    /// Transaction-level dispatches, in transaction order.
    pub transactions: Vec<TransactionResult>,
}

impl RunEntry {
    /// Every outcome in this entry, block level first.
    pub fn outcomes(&self) -> impl Iterator<Item = &AgentOutcome> {
        self.block_outcomes
            .iter()
            .chain(self.transactions.iter().flat_map(|t| t.outcomes.iter()))
    }

    pub fn findings(&self) -> impl Iterator<Item = &Finding> {
        self.outcomes().flat_map(|o| o.outcome.findings().iter())
    }

    pub fn invocation_count(&self) -> usize {
        self.outcomes().count()
    }
}

// ─── Dispatch units ───────────────────────────────────────────────────────────

/// What an agent is asked to evaluate.
#[derive(Debug, Clone)]
pub enum DispatchRequest {
    Block(Arc<Block>),
    Transaction { block: Arc<Block>, index: usize },
}

impl DispatchRequest {
    pub fn capability(&self) -> Capability {
        match self {
            Self::Block(_) => Capability::BlockHandler,
            Self::Transaction { .. } => Capability::TransactionHandler,
        }
    }

    pub fn block(&self) -> &Block {
        match self {
            Self::Block(block) | Self::Transaction { block, .. } => block,
        }
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        match self {
            Self::Block(_) => None,
            Self::Transaction { block, index } => block.transactions.get(*index),
        }
    }

    pub fn event_ref(&self) -> EventRef {
        match self.transaction() {
            Some(tx) => tx.event_ref(),
            None => self.block().event_ref(),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
