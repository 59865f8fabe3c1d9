//! Outbound notifications from an agent to its hosting collaborator.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::envelope::Envelope;
use crate::error::{Error, Result};

/// Signals an agent emits for collaborators.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The agent finished `initialize()`.
    Initialized { agent: String },
    /// An envelope the collaborator must deliver to `envelope.to_agent`.
    Message(Envelope),
}

impl AgentEvent {
    pub fn envelope(&self) -> Option<&Envelope> {
        match self {
            AgentEvent::Message(envelope) => Some(envelope),
            AgentEvent::Initialized { .. } => None,
        }
    }
}

/// Subscriber to an agent's outbound events.
///
/// Delivery into the sink is a handoff; the sink decides how the envelope
/// reaches its destination (in-process call, queue, network).
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: AgentEvent) -> Result<()>;
}

/// Sink that forwards events into an unbounded tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<AgentEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with the receiving end.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    async fn deliver(&self, event: AgentEvent) -> Result<()> {
        self.tx
            .send(event)
            .map_err(|_| Error::Protocol("outbound channel closed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{MessageType, Payload};

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::channel();
        let envelope = Envelope::new("a", "b", MessageType::Event, Payload::new());

        sink.deliver(AgentEvent::Message(envelope.clone())).await.unwrap();

        let event = rx.recv().await.unwrap();
        assert_eq!(event.envelope(), Some(&envelope));
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (sink, rx) = ChannelSink::channel();
        drop(rx);

        let result = sink.deliver(AgentEvent::Initialized { agent: "a".into() }).await;
        assert!(matches!(result, Err(Error::Protocol(_))));
    }
}
