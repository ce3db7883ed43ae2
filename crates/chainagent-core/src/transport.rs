//! The `AgentTransport` trait: how the dispatcher reaches an agent.

use std::time::Duration;

use async_trait::async_trait;

use crate::agent::Agent;
use crate::types::{DispatchRequest, InvocationOutcome};

/// Invokes one agent handler for one dispatch unit.
///
/// Implementations convert every failure (connection refused, deadline
/// exceeded, malformed response, agent-reported error) into an
/// [`InvocationOutcome`]; nothing is propagated as an error. Calls to
/// different agents may run concurrently and must not share mutable state.
///
/// The dispatcher enforces `deadline` on its side as well, so an
/// implementation that overruns still yields [`InvocationOutcome::Timeout`].
#[async_trait]
pub trait AgentTransport: Send + Sync + 'static {
    async fn invoke(
        &self,
        agent: &Agent,
        request: &DispatchRequest,
        deadline: Duration,
    ) -> InvocationOutcome;
}
