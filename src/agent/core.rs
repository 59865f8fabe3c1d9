//! State and protocol plumbing shared by every agent.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex, MutexGuard, RwLock};

use super::status::{AgentStatus, StatusCell, StatusGuard};
use crate::error::Result;
use crate::memory::{ConversationMemory, Memory};
use crate::protocol::{
    AgentEvent, Continuation, Envelope, EventSink, MessageType, Payload, PendingRequests,
};
use crate::tools::{Tool, ToolRegistry};

/// Identity, status, tools, memory and pending requests of one agent.
///
/// Every field is individually synchronised, so the hosting runtime may
/// deliver several envelopes to the same agent concurrently.
pub struct AgentCore {
    name: String,
    description: String,
    status: StatusCell,
    tools: RwLock<ToolRegistry>,
    memory: Mutex<Box<dyn Memory>>,
    pending: Mutex<PendingRequests>,
    sinks: RwLock<Vec<Arc<dyn EventSink>>>,
}

impl AgentCore {
    /// Create the core with an initial tool set and optional memory.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tools: Vec<Arc<dyn Tool>>,
        memory: Option<Box<dyn Memory>>,
    ) -> Self {
        let name = name.into();
        let mut registry = ToolRegistry::new();
        for tool in tools {
            tracing::info!("Added tool {} to agent {}", tool.name(), name);
            registry.add(tool);
        }

        tracing::info!("Initializing agent: {}", name);

        Self {
            name,
            description: description.into(),
            status: StatusCell::default(),
            tools: RwLock::new(registry),
            memory: Mutex::new(memory.unwrap_or_else(|| Box::new(ConversationMemory::new()))),
            pending: Mutex::new(PendingRequests::new()),
            sinks: RwLock::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn status(&self) -> AgentStatus {
        self.status.get()
    }

    /// Host-controlled status change (e.g. `offline`, or clearing `error`).
    pub fn set_status(&self, status: AgentStatus) {
        tracing::debug!("Agent {} status -> {}", self.name, status);
        self.status.set(status);
    }

    /// Hold `processing` status for the lifetime of the guard.
    pub fn processing(&self) -> StatusGuard<'_> {
        self.status.processing()
    }

    /// Mark the agent ready. Safe to call more than once.
    pub async fn initialize(&self) {
        self.status.set(AgentStatus::Idle);
        tracing::info!("Agent {} initialized", self.name);
        self.emit(AgentEvent::Initialized {
            agent: self.name.clone(),
        })
        .await;
    }

    /// Add an outbound subscriber.
    pub async fn subscribe(&self, sink: Arc<dyn EventSink>) {
        self.sinks.write().await.push(sink);
    }

    async fn emit(&self, event: AgentEvent) {
        let sinks = self.sinks.read().await.clone();
        if sinks.is_empty() {
            tracing::warn!("No outbound sink subscribed to agent {}", self.name);
            return;
        }

        for sink in sinks {
            if let Err(e) = sink.deliver(event.clone()).await {
                tracing::warn!("Agent {} failed to hand off event: {}", self.name, e);
            }
        }
    }

    /// Register or replace a tool.
    pub async fn add_tool(&self, tool: Arc<dyn Tool>) {
        let mut tools = self.tools.write().await;
        if tools.has_tool(tool.name()) {
            tracing::info!("Replacing tool {} on agent {}", tool.name(), self.name);
        } else {
            tracing::info!("Added tool {} to agent {}", tool.name(), self.name);
        }
        tools.add(tool);
    }

    /// `(name, description)` of every tool, sorted by name.
    pub async fn describe_tools(&self) -> Vec<(String, String)> {
        self.tools.read().await.describe()
    }

    /// Invoke a registered tool. This is the only way tools get executed.
    pub async fn use_tool(&self, name: &str, params: Payload) -> Result<Payload> {
        let tool = self.tools.read().await.resolve(name)?;
        tracing::info!("Agent {} using tool: {}", self.name, name);
        tool.execute(params).await
    }

    /// Exclusive access to the agent's memory.
    pub async fn memory(&self) -> MutexGuard<'_, Box<dyn Memory>> {
        self.memory.lock().await
    }

    /// Send an envelope through the outbound sinks and return its ID.
    pub async fn send_a2a_message(
        &self,
        to_agent: &str,
        message_type: MessageType,
        payload: Payload,
        conversation_id: Option<String>,
    ) -> String {
        let envelope = Envelope::compose(&self.name, to_agent, message_type, payload, conversation_id);
        let id = envelope.id.clone();
        self.dispatch(envelope).await;
        id
    }

    /// Send a request and register `continuation` for its response.
    ///
    /// The continuation is registered before the envelope leaves, so a
    /// synchronous transport cannot deliver the reply ahead of it.
    pub async fn send_request(
        &self,
        to_agent: &str,
        payload: Payload,
        conversation_id: Option<String>,
        continuation: Continuation,
    ) -> String {
        let envelope = Envelope::compose(
            &self.name,
            to_agent,
            MessageType::Request,
            payload,
            conversation_id,
        );
        let id = envelope.correlation_key().to_string();
        self.pending
            .lock()
            .await
            .register(id.clone(), to_agent, continuation);
        self.dispatch(envelope).await;
        id
    }

    /// Send `{action, parameters}` and wait up to `timeout` for the reply.
    ///
    /// On timeout the pending entry is dropped and a `status: timeout`
    /// payload is returned instead.
    pub async fn send_request_and_wait(
        &self,
        to_agent: &str,
        action: &str,
        parameters: Value,
        conversation_id: Option<String>,
        timeout: Duration,
    ) -> Payload {
        let mut payload = Payload::new();
        payload.insert("action".to_string(), Value::String(action.to_string()));
        payload.insert("parameters".to_string(), parameters);

        let (tx, rx) = oneshot::channel();
        let id = self
            .send_request(
                to_agent,
                payload,
                conversation_id,
                Box::new(move |response| {
                    let _ = tx.send(response);
                }),
            )
            .await;

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                self.pending.lock().await.cancel(&id);
                crate::protocol::into_payload(json!({
                    "status": "error",
                    "message": format!("Error waiting for response: request {} was dropped", id),
                }))
            }
            Err(_) => {
                self.pending.lock().await.cancel(&id);
                tracing::warn!(
                    "Agent {} got no response from {} within {:?}",
                    self.name,
                    to_agent,
                    timeout
                );
                crate::protocol::into_payload(json!({
                    "status": "timeout",
                    "message": format!(
                        "No response from {} within {} seconds",
                        to_agent,
                        timeout.as_secs_f64()
                    ),
                }))
            }
        }
    }

    /// Answer `request` with `payload`, correlated to the request.
    pub async fn send_response(&self, request: &Envelope, payload: Payload) -> String {
        let response = request.create_response(&self.name, payload);
        let id = response.id.clone();
        self.dispatch(response).await;
        id
    }

    async fn dispatch(&self, envelope: Envelope) {
        tracing::debug!(
            "Agent {} sending {} {} to {}",
            self.name,
            envelope.message_type,
            envelope.id,
            envelope.to_agent
        );
        self.emit(AgentEvent::Message(envelope)).await;
    }

    /// Fire the continuation registered for a response's correlation ID.
    ///
    /// Responses nobody is waiting for are dropped without error.
    pub async fn handle_response(&self, envelope: &Envelope) {
        let continuation = match envelope.correlation_id.as_deref() {
            Some(id) => {
                let mut pending = self.pending.lock().await;
                if let Some(expected) = pending
                    .recipient(id)
                    .filter(|expected| *expected != envelope.from_agent)
                {
                    tracing::warn!(
                        "Agent {} got response {} from {}, request went to {}",
                        self.name,
                        id,
                        envelope.from_agent,
                        expected
                    );
                }
                pending.take(id)
            }
            None => None,
        };

        match continuation {
            Some(continuation) => continuation(envelope.payload.clone()),
            None => tracing::debug!(
                "Agent {} dropped orphan response {} from {}",
                self.name,
                envelope.id,
                envelope.from_agent
            ),
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// Drop pending requests older than `max_age`. Returns how many were dropped.
    pub async fn expire_pending(&self, max_age: Duration) -> usize {
        self.pending.lock().await.expire(max_age)
    }
}

impl std::fmt::Debug for AgentCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentCore")
            .field("name", &self.name)
            .field("status", &self.status())
            .finish()
    }
}
