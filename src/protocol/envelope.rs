//! A2A message envelopes with correlation IDs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{MessageType, Payload};

/// Wire-level unit of inter-agent communication.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    /// Unique message ID (UUID v4)
    pub id: String,
    /// Sender agent name
    pub from_agent: String,
    /// Recipient agent name
    pub to_agent: String,
    /// Message kind
    pub message_type: MessageType,
    /// Opaque payload
    pub payload: Payload,
    /// Groups the turns of one multi-turn exchange
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Creation time (sender's wall clock)
    pub timestamp: DateTime<Utc>,
    /// Ties a response back to the originating request
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Envelope {
    /// Create a new envelope from one agent to another.
    pub fn new(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: MessageType,
        payload: Payload,
    ) -> Self {
        Self {
            id: generate_id(),
            from_agent: from_agent.into(),
            to_agent: to_agent.into(),
            message_type,
            payload,
            conversation_id: None,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    /// Create an outbound envelope. Requests correlate on their own ID.
    pub fn compose(
        from_agent: impl Into<String>,
        to_agent: impl Into<String>,
        message_type: MessageType,
        payload: Payload,
        conversation_id: Option<String>,
    ) -> Self {
        let mut envelope = Envelope::new(from_agent, to_agent, message_type, payload)
            .with_conversation_id(conversation_id);
        if message_type == MessageType::Request {
            envelope.correlation_id = Some(envelope.id.clone());
        }
        envelope
    }

    /// Set the conversation ID.
    pub fn with_conversation_id(mut self, id: Option<String>) -> Self {
        self.conversation_id = id;
        self
    }

    /// Set correlation ID for request/response tracking.
    pub fn with_correlation_id(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    /// The key a responder must echo back so the requester can match the reply.
    pub fn correlation_key(&self) -> &str {
        self.correlation_id.as_deref().unwrap_or(&self.id)
    }

    /// Create a response envelope addressed back to this envelope's sender.
    pub fn create_response(&self, from_agent: impl Into<String>, payload: Payload) -> Self {
        Envelope::new(from_agent, self.from_agent.clone(), MessageType::Response, payload)
            .with_conversation_id(self.conversation_id.clone())
            .with_correlation_id(self.correlation_key())
    }
}

fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
