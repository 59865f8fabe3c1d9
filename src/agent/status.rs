//! Agent status and scoped `processing` transitions.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Agent status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Processing,
    Error,
    Offline,
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus::Idle
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentStatus::Idle => write!(f, "idle"),
            AgentStatus::Processing => write!(f, "processing"),
            AgentStatus::Error => write!(f, "error"),
            AgentStatus::Offline => write!(f, "offline"),
        }
    }
}

/// Status cell shared by concurrent handlers of one agent.
///
/// The status and the number of open `processing` scopes change together
/// under one lock, so a scope that starts while another ends never observes
/// `idle`.
#[derive(Debug, Default)]
pub struct StatusCell {
    state: Mutex<ScopeState>,
}

#[derive(Debug, Default)]
struct ScopeState {
    status: AgentStatus,
    active: usize,
}

impl StatusCell {
    fn state(&self) -> MutexGuard<'_, ScopeState> {
        // A poisoned lock still holds a consistent state.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self) -> AgentStatus {
        self.state().status
    }

    pub fn set(&self, status: AgentStatus) {
        self.state().status = status;
    }

    /// Enter `processing` until the returned guard drops.
    ///
    /// Only an idle agent moves to `processing`, and only a `processing`
    /// agent goes back to idle, so `error` and `offline` survive the scope.
    pub fn processing(&self) -> StatusGuard<'_> {
        let mut state = self.state();
        state.active += 1;
        if state.status == AgentStatus::Idle {
            state.status = AgentStatus::Processing;
        }
        StatusGuard { cell: self }
    }
}

/// Restores `idle` when the last concurrent `processing` scope ends.
pub struct StatusGuard<'a> {
    cell: &'a StatusCell,
}

impl Drop for StatusGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.cell.state();
        state.active = state.active.saturating_sub(1);
        if state.active == 0 && state.status == AgentStatus::Processing {
            state.status = AgentStatus::Idle;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_restores_idle() {
        let cell = StatusCell::default();
        assert_eq!(cell.get(), AgentStatus::Idle);
        {
            let _guard = cell.processing();
            assert_eq!(cell.get(), AgentStatus::Processing);
        }
        assert_eq!(cell.get(), AgentStatus::Idle);
    }

    #[test]
    fn test_guard_restores_on_early_return() {
        fn failing(cell: &StatusCell) -> Result<(), String> {
            let _guard = cell.processing();
            Err("tool failed".to_string())
        }

        let cell = StatusCell::default();
        assert!(failing(&cell).is_err());
        assert_eq!(cell.get(), AgentStatus::Idle);
    }

    #[test]
    fn test_nested_scopes() {
        let cell = StatusCell::default();
        let outer = cell.processing();
        let inner = cell.processing();
        drop(inner);
        assert_eq!(cell.get(), AgentStatus::Processing);
        drop(outer);
        assert_eq!(cell.get(), AgentStatus::Idle);
    }

    #[test]
    fn test_error_is_sticky() {
        let cell = StatusCell::default();
        cell.set(AgentStatus::Error);
        {
            let _guard = cell.processing();
            assert_eq!(cell.get(), AgentStatus::Error);
        }
        assert_eq!(cell.get(), AgentStatus::Error);
    }

    #[test]
    fn test_overlapping_scopes_across_threads() {
        let cell = StatusCell::default();

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..10_000 {
                        let _guard = cell.processing();
                        assert_eq!(cell.get(), AgentStatus::Processing);
                    }
                });
            }
        });

        assert_eq!(cell.state().active, 0);
        assert_eq!(cell.get(), AgentStatus::Idle);
    }

    #[test]
    fn test_scope_started_while_another_ends_stays_processing() {
        let cell = StatusCell::default();
        let first = cell.processing();
        let second = cell.processing();

        drop(first);
        assert_eq!(cell.get(), AgentStatus::Processing);
        let third = cell.processing();
        drop(second);
        assert_eq!(cell.get(), AgentStatus::Processing);

        drop(third);
        assert_eq!(cell.get(), AgentStatus::Idle);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&AgentStatus::Offline).unwrap(), "\"offline\"");
        assert_eq!(AgentStatus::Processing.to_string(), "processing");
    }
}
