//! Service collaborator interface and the in-process tool registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tg_protocol::{McpToolDef, ToolCallResult};

use crate::error::ToolCallError;

/// The external service the executor calls into. A deployment may back this
/// with the in-process [`ServiceRegistry`] or with a remote aggregator.
#[async_trait::async_trait]
pub trait ServiceManager: Send + Sync + 'static {
    /// Every tool the service can currently execute.
    async fn get_all_tools(&self) -> Result<Vec<McpToolDef>, ToolCallError>;

    /// Invoke one tool. Errors may be free-form; the executor classifies
    /// them by message.
    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, ToolCallError>;
}

/// Implement this to expose a tool through the [`ServiceRegistry`].
#[async_trait::async_trait]
pub trait ServiceTool: Send + Sync + 'static {
    fn definition(&self) -> McpToolDef;

    async fn call(&self, arguments: serde_json::Value) -> Result<ToolCallResult, ToolCallError>;
}

/// In-process [`ServiceManager`]: a name-keyed map of handlers.
///
/// Names are normalized to lowercase so lookup is case-insensitive and
/// stable regardless of caller casing.
#[derive(Default)]
pub struct ServiceRegistry {
    tools: RwLock<HashMap<String, Arc<dyn ServiceTool>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ServiceTool>(&self, tool: T) -> &Self {
        let def = tool.definition();
        self.tools
            .write()
            .insert(def.name.to_ascii_lowercase(), Arc::new(tool));
        self
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn get(&self, name: &str) -> Option<Arc<dyn ServiceTool>> {
        self.tools.read().get(&name.to_ascii_lowercase()).cloned()
    }
}

#[async_trait::async_trait]
impl ServiceManager for ServiceRegistry {
    async fn get_all_tools(&self) -> Result<Vec<McpToolDef>, ToolCallError> {
        let handlers: Vec<Arc<dyn ServiceTool>> = self.tools.read().values().cloned().collect();
        let mut defs: Vec<McpToolDef> = handlers.iter().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(defs)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, ToolCallError> {
        let handler = self
            .get(name)
            .ok_or_else(|| ToolCallError::ToolNotFound(format!("tool '{name}' not found")))?;
        handler.call(arguments).await
    }
}
