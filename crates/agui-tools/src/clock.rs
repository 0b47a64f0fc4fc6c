use agui_agent_core::{AgentTool, ToolExecutionResult};
use agui_ai::ToolDefinition;
use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Value};

pub const CLOCK_TOOL_NAME: &str = "get_current_time";
const CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Reports the server's local wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClockTool;

#[async_trait]
impl AgentTool for ClockTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CLOCK_TOOL_NAME.to_string(),
            description: "Get the current date and time".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    async fn execute(&self, _arguments: Value) -> ToolExecutionResult {
        ToolExecutionResult::ok(json!(Local::now().format(CLOCK_FORMAT).to_string()))
    }
}
