//! Handler registry: the set of active agents, swapped atomically.
//!
//! Readers take an `Arc` to an immutable snapshot; writers build a new
//! snapshot and replace the old one under a short write lock. A dispatch that
//! already holds a snapshot never observes later registrations.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use crate::agent::Agent;
use crate::types::Capability;

/// An immutable view of the registered agents.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    generation: u64,
    agents: BTreeMap<String, Arc<Agent>>,
}

impl RegistrySnapshot {
    /// Incremented by every register/unregister that changed the set.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enabled agents exposing `capability`, in agent id order.
    pub fn handlers_for(&self, capability: Capability) -> Vec<Arc<Agent>> {
        self.agents
            .values()
            .filter(|a| a.handles(capability))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Agent>> {
        self.agents.get(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

/// Registry of agents keyed by id.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any prior entry with the same id.
    pub fn register(&self, agent: Agent) {
        let id = agent.id.clone();
        self.update(|agents| {
            agents.insert(id.clone(), Arc::new(agent));
            true
        });
        tracing::debug!(agent = %id, "agent registered");
    }

    /// Remove an agent. Returns `true` if it was registered.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let removed = self.update(|agents| agents.remove(agent_id).is_some());
        if removed {
            tracing::debug!(agent = %agent_id, "agent unregistered");
        }
        removed
    }

    /// Agents for `capability` as of now.
    pub fn handlers_for(&self, capability: Capability) -> Vec<Arc<Agent>> {
        self.snapshot().handlers_for(capability)
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        match self.current.read() {
            Ok(guard) => (*guard).clone(),
            Err(poisoned) => (*poisoned.into_inner()).clone(),
        }
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<String, Arc<Agent>>) -> bool) -> bool {
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut agents = guard.agents.clone();
        if !apply(&mut agents) {
            return false;
        }
        *guard = Arc::new(RegistrySnapshot {
            generation: guard.generation + 1,
            agents,
        });
        true
    }
}
