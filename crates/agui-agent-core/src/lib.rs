//! Tool-using agent loop that turns a provider conversation into a lazy
//! sequence of [`StreamPart`]s.
//!
//! The [`ProviderAdapter`] owns one provider client plus the shared
//! [`ToolRegistry`]; each call to [`ProviderAdapter::stream`] runs an
//! independent bounded tool loop on the runtime and yields parts as they are
//! produced.

mod provider_adapter;
mod runtime_tool_bridge;
mod tool_registry;

use agui_ai::{AiError, ToolDefinition};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use provider_adapter::{AdapterConfig, PartStream, ProviderAdapter};
pub use tool_registry::ToolRegistry;

pub const DEFAULT_MAX_STEPS: usize = 5;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. \
You can tell the current time and do basic math calculations. \
Be concise and friendly.";

/// One unit of provider output handed to the event sequencer.
///
/// Tool calls are always complete: argument fragments are assembled by the
/// provider client before a `ToolCall` part is produced. A `ToolResult`
/// answers the most recent `ToolCall`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamPart {
    TextDelta { fragment: String },
    ToolCall { name: String, arguments: Value },
    ToolResult { value: String },
}

impl StreamPart {
    pub fn text(fragment: impl Into<String>) -> Self {
        Self::TextDelta {
            fragment: fragment.into(),
        }
    }

    pub fn tool_call(name: impl Into<String>, arguments: Value) -> Self {
        Self::ToolCall {
            name: name.into(),
            arguments,
        }
    }

    pub fn tool_result(value: impl Into<String>) -> Self {
        Self::ToolResult {
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Outcome of a single tool execution.
pub struct ToolExecutionResult {
    pub content: Value,
    pub is_error: bool,
}

impl ToolExecutionResult {
    pub fn ok(content: Value) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    pub fn error(content: Value) -> Self {
        Self {
            content,
            is_error: true,
        }
    }

    /// Renders the payload as the plain string sent back to the model.
    pub fn as_text(&self) -> String {
        match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        }
    }
}

/// A function the model may invoke during a run.
///
/// # Examples
///
/// ```
/// use agui_agent_core::{AgentTool, ToolExecutionResult};
/// use agui_ai::ToolDefinition;
/// use async_trait::async_trait;
/// use serde_json::{json, Value};
///
/// struct Echo;
///
/// #[async_trait]
/// impl AgentTool for Echo {
///     fn definition(&self) -> ToolDefinition {
///         ToolDefinition {
///             name: "echo".to_string(),
///             description: "Echo the input".to_string(),
///             parameters: json!({"type": "object"}),
///         }
///     }
///
///     async fn execute(&self, arguments: Value) -> ToolExecutionResult {
///         ToolExecutionResult::ok(arguments)
///     }
/// }
///
/// assert_eq!(Echo.definition().name, "echo");
/// ```
#[async_trait]
pub trait AgentTool: Send + Sync {
    fn definition(&self) -> ToolDefinition;
    async fn execute(&self, arguments: Value) -> ToolExecutionResult;
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Ai(#[from] AiError),
    #[error("tool '{0}' is not registered")]
    UnknownTool(String),
    #[error("invalid arguments for '{tool}': {message}")]
    InvalidToolArguments { tool: String, message: String },
    #[error("tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },
    #[error("tool '{tool}' failed: {message}")]
    ToolFailed { tool: String, message: String },
    #[error("agent task failed: {0}")]
    TaskFailed(String),
}
