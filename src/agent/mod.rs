//! Base agent: status, tools, memory and the A2A protocol.
//!
//! Concrete agents implement [`Agent`] by supplying an [`AgentCore`] plus
//! `process_request` / `process_a2a_request`. The protocol dispatch in
//! [`Agent::handle_a2a_message`] is written against the trait only.

pub mod core;
pub mod status;

use async_trait::async_trait;

use crate::error::Result;
use crate::protocol::{error_payload, Envelope, MessageType, Payload};

pub use self::core::AgentCore;
pub use status::{AgentStatus, StatusGuard};

#[async_trait]
pub trait Agent: Send + Sync {
    fn core(&self) -> &AgentCore;

    /// Domain dispatch for a plain request.
    async fn process_request(&self, request: Payload) -> Result<Payload>;

    /// Adapt an inbound request envelope into domain work.
    async fn process_a2a_request(&self, envelope: &Envelope) -> Result<Payload>;

    /// Hook for `event` and `heartbeat` envelopes. Ignored by default.
    async fn handle_notification(&self, envelope: &Envelope) {
        tracing::debug!(
            "Agent {} ignoring {} from {}",
            self.name(),
            envelope.message_type,
            envelope.from_agent
        );
    }

    fn name(&self) -> &str {
        self.core().name()
    }

    fn status(&self) -> AgentStatus {
        self.core().status()
    }

    async fn initialize(&self) {
        self.core().initialize().await;
    }

    /// Protocol dispatch point for inbound envelopes.
    ///
    /// Request failures come back to the sender as an error-shaped
    /// response; nothing raised while handling escapes this method.
    async fn handle_a2a_message(&self, envelope: Envelope) {
        let core = self.core();
        tracing::info!(
            "Agent {} received A2A {} from {}",
            core.name(),
            envelope.message_type,
            envelope.from_agent
        );

        match envelope.message_type {
            MessageType::Request => match self.process_a2a_request(&envelope).await {
                Ok(result) if result.is_empty() => {
                    tracing::debug!("Agent {} has no reply for {}", core.name(), envelope.id);
                }
                Ok(result) => {
                    core.send_response(&envelope, result).await;
                }
                Err(e) => {
                    tracing::error!("Error handling A2A message in {}: {}", core.name(), e);
                    core.send_response(&envelope, error_payload(e.to_string()))
                        .await;
                }
            },
            MessageType::Response => core.handle_response(&envelope).await,
            MessageType::Event | MessageType::Heartbeat => {
                self.handle_notification(&envelope).await
            }
        }
    }
}
