//! Agent-to-agent (A2A) communication protocol.
//!
//! This module defines the structured protocol agents speak to each other:
//! - Message envelopes with correlation IDs
//! - Typed message kinds (request, response, event, heartbeat)
//! - Pending-request bookkeeping for response correlation
//! - Outbound event sinks for the hosting collaborator

pub mod envelope;
pub mod pending;
pub mod sink;
pub mod types;

pub use envelope::Envelope;
pub use pending::{Continuation, PendingRequests};
pub use sink::{AgentEvent, ChannelSink, EventSink};
pub use types::{error_payload, into_payload, payload_status, MessageType, Payload};
