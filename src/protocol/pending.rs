//! Outbound requests awaiting a correlated response.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::types::Payload;

/// Invoked once with the payload of the matching response.
pub type Continuation = Box<dyn FnOnce(Payload) + Send + 'static>;

struct PendingRequest {
    to_agent: String,
    registered_at: Instant,
    continuation: Continuation,
}

/// Pending requests keyed by correlation ID.
#[derive(Default)]
pub struct PendingRequests {
    entries: HashMap<String, PendingRequest>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuation. A second registration under the same ID replaces the first.
    pub fn register(
        &mut self,
        correlation_id: impl Into<String>,
        to_agent: impl Into<String>,
        continuation: Continuation,
    ) {
        self.entries.insert(
            correlation_id.into(),
            PendingRequest {
                to_agent: to_agent.into(),
                registered_at: Instant::now(),
                continuation,
            },
        );
    }

    /// Remove and return the continuation for a correlation ID.
    pub fn take(&mut self, correlation_id: &str) -> Option<Continuation> {
        self.entries.remove(correlation_id).map(|p| p.continuation)
    }

    /// Drop a pending entry without invoking it.
    pub fn cancel(&mut self, correlation_id: &str) -> bool {
        self.entries.remove(correlation_id).is_some()
    }

    /// Agent a pending request was sent to.
    pub fn recipient(&self, correlation_id: &str) -> Option<&str> {
        self.entries.get(correlation_id).map(|p| p.to_agent.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries registered at least `max_age` ago. Returns how many were dropped.
    pub fn expire(&mut self, max_age: Duration) -> usize {
        let before = self.entries.len();
        self.entries.retain(|id, pending| {
            let keep = pending.registered_at.elapsed() < max_age;
            if !keep {
                tracing::debug!("Expiring pending request {} to {}", id, pending.to_agent);
            }
            keep
        });
        before - self.entries.len()
    }
}

impl std::fmt::Debug for PendingRequests {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequests")
            .field("ids", &self.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}
