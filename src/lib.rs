//! AgentMesh library root.

pub mod agent;
pub mod bus;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod memory;
pub mod protocol;
pub mod specialists;
pub mod tools;

pub use agent::{Agent, AgentCore, AgentStatus};
pub use bus::MessageBus;
pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use error::{Error, Result};
pub use memory::{ConversationMemory, Memory};
pub use protocol::{AgentEvent, Envelope, EventSink, MessageType, Payload};
pub use specialists::{FlightSpecialist, HotelSpecialist, TripCoordinator};
pub use tools::{Tool, ToolRegistry};
