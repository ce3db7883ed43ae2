//! Agent directory: resolves the agent set once at run start.

use async_trait::async_trait;

use crate::agent::Agent;
use crate::error::RunnerError;

/// Read-only source of agent endpoint descriptors.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn resolve(&self) -> Result<Vec<Agent>, RunnerError>;
}

/// A fixed list of agents, typically from the settings file.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    agents: Vec<Agent>,
}

impl StaticDirectory {
    pub fn new(agents: Vec<Agent>) -> Self {
        Self { agents }
    }
}

#[async_trait]
impl AgentDirectory for StaticDirectory {
    async fn resolve(&self) -> Result<Vec<Agent>, RunnerError> {
        Ok(self.agents.clone())
    }
}
