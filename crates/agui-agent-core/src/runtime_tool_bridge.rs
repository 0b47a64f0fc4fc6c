//! Argument validation and bounded execution of registered tools.

use std::time::Duration;

use agui_ai::{ToolCall, ToolDefinition};
use jsonschema::validator_for;
use serde_json::Value;

use crate::{AgentError, ToolRegistry};

/// Runs `call` against the registry and returns the text handed back to the model.
///
/// Unknown tools, schema violations, timeouts and error results all fail the
/// call; a tool that wants to report a soft failure returns it as ordinary
/// content instead.
pub(crate) async fn execute_tool_call(
    call: &ToolCall,
    registry: &ToolRegistry,
    tool_timeout: Option<Duration>,
) -> Result<String, AgentError> {
    let (definition, tool) = registry
        .get(&call.name)
        .ok_or_else(|| AgentError::UnknownTool(call.name.clone()))?;
    validate_tool_arguments(definition, &call.arguments)?;

    let execution = tool.execute(call.arguments.clone());
    let result = match tool_timeout {
        Some(timeout) => tokio::time::timeout(timeout, execution)
            .await
            .map_err(|_| AgentError::ToolTimeout {
                tool: call.name.clone(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            })?,
        None => execution.await,
    };

    if result.is_error {
        return Err(AgentError::ToolFailed {
            tool: call.name.clone(),
            message: result.as_text(),
        });
    }
    Ok(result.as_text())
}

pub(crate) fn validate_tool_arguments(
    definition: &ToolDefinition,
    arguments: &Value,
) -> Result<(), AgentError> {
    let invalid = |message: String| AgentError::InvalidToolArguments {
        tool: definition.name.clone(),
        message,
    };
    let validator = validator_for(&definition.parameters)
        .map_err(|error| invalid(format!("invalid JSON schema: {error}")))?;
    if let Some(first) = validator.iter_errors(arguments).next() {
        return Err(invalid(first.to_string()));
    }
    Ok(())
}
