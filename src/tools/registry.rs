//! Per-agent tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use super::tool::Tool;
use crate::error::{Error, Result};

/// Map of tool name to tool.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn add(&mut self, tool: Arc<dyn Tool>) -> Option<Arc<dyn Tool>> {
        self.tools.insert(tool.name().to_string(), tool)
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// `(name, description)` pairs, sorted by name.
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut described: Vec<(String, String)> = self
            .tools
            .values()
            .map(|t| (t.name().to_string(), t.description().to_string()))
            .collect();
        described.sort();
        described
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Look up a tool, failing with `ToolNotFound` when it is not registered.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.get(name)
            .ok_or_else(|| Error::ToolNotFound(name.to_string()))
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Payload;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Echo the parameters back"
        }

        async fn execute(&self, params: Payload) -> Result<Payload> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(params)
        }
    }

    fn echo(name: &'static str) -> (Arc<dyn Tool>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Arc::new(Echo { name, calls: calls.clone() }), calls)
    }

    #[tokio::test]
    async fn test_invoke_returns_result_unchanged() {
        let mut registry = ToolRegistry::new();
        let (tool, calls) = echo("echo");
        registry.add(tool);

        let params = crate::protocol::into_payload(json!({"a": [1, 2]}));
        let tool = registry.resolve("echo").unwrap();
        let result = tool.execute(params.clone()).await.unwrap();

        assert_eq!(result, params);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_tool_invokes_nothing() {
        let mut registry = ToolRegistry::new();
        let (tool, calls) = echo("echo");
        registry.add(tool);

        let err = registry.resolve("missing").err().unwrap();
        assert!(matches!(err, Error::ToolNotFound(ref name) if name == "missing"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        let (first, first_calls) = echo("echo");
        let (second, second_calls) = echo("echo");

        assert!(registry.add(first).is_none());
        assert!(registry.add(second).is_some());
        registry.resolve("echo").unwrap().execute(Payload::new()).await.unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_names_sorted() {
        let mut registry = ToolRegistry::new();
        registry.add(echo("zeta").0);
        registry.add(echo("alpha").0);

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert!(registry.has_tool("zeta"));
        assert_eq!(registry.describe()[0].1, "Echo the parameters back");
    }
}
