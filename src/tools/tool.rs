//! Tool trait for agentmesh.

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::Payload;

/// A named capability an agent can invoke.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, unique per agent.
    fn name(&self) -> &str;

    /// Human-readable description. Documentation only.
    fn description(&self) -> &str;

    /// Run the tool.
    async fn execute(&self, params: Payload) -> Result<Payload>;
}
