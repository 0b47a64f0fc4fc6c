use std::collections::BTreeMap;
use std::sync::Arc;

use agui_ai::ToolDefinition;

use crate::AgentTool;

#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    tool: Arc<dyn AgentTool>,
}

/// Immutable-after-startup mapping from tool name to implementation.
///
/// Built once at process start and shared between runs behind an `Arc`.
/// Definitions are captured at registration and listed in name order so every
/// provider request advertises tools deterministically.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tool`, replacing any earlier tool with the same name.
    pub fn register<T>(&mut self, tool: T) -> &mut Self
    where
        T: AgentTool + 'static,
    {
        let tool: Arc<dyn AgentTool> = Arc::new(tool);
        let definition = tool.definition();
        if self.tools.contains_key(&definition.name) {
            tracing::warn!(tool = %definition.name, "replacing previously registered tool");
        }
        self.tools
            .insert(definition.name.clone(), RegisteredTool { definition, tool });
        self
    }

    pub fn with_tool<T>(mut self, tool: T) -> Self
    where
        T: AgentTool + 'static,
    {
        self.register(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<(&ToolDefinition, Arc<dyn AgentTool>)> {
        self.tools
            .get(name)
            .map(|registered| (&registered.definition, Arc::clone(&registered.tool)))
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|registered| registered.definition.clone())
            .collect()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
