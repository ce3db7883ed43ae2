//! Agent records: who can be invoked, where, and for what.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::Capability;

/// A detection agent reachable at a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    /// Unique agent identifier.
    pub id: String,
    /// Remote endpoint (e.g. `http://localhost:50051`).
    pub endpoint: String,
    /// Handlers this agent exposes.
    pub capabilities: BTreeSet<Capability>,
    /// Disabled agents stay registered but receive no events.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
}

fn enabled_default() -> bool {
    true
}

impl Agent {
    /// Create an enabled agent with no capabilities.
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            endpoint: endpoint.into(),
            capabilities: BTreeSet::new(),
            enabled: true,
        }
    }

    pub fn with_capability(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Returns `true` if the agent is enabled and exposes `capability`.
    pub fn handles(&self, capability: Capability) -> bool {
        self.enabled && self.capabilities.contains(&capability)
    }
}
