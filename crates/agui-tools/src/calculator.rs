use agui_agent_core::{AgentTool, ToolExecutionResult};
use agui_ai::ToolDefinition;
use async_trait::async_trait;
use serde_json::{json, Value};

use crate::arithmetic::evaluate;

pub const CALCULATOR_TOOL_NAME: &str = "calculator";
pub const INVALID_EXPRESSION_MESSAGE: &str = "Invalid expression - only basic math allowed";

/// Evaluates basic arithmetic requested by the model.
///
/// Failures are reported as ordinary content so the model can read them and
/// recover; they never fail the run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CalculatorTool;

#[async_trait]
impl AgentTool for CalculatorTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: CALCULATOR_TOOL_NAME.to_string(),
            description: "Evaluate a mathematical expression".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "expression": {
                        "type": "string",
                        "description": "A math expression like '2 + 2' or '10 * 5'"
                    }
                },
                "required": ["expression"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> ToolExecutionResult {
        let expression = arguments
            .get("expression")
            .and_then(Value::as_str)
            .unwrap_or_default();
        ToolExecutionResult::ok(json!(calculate(expression)))
    }
}

/// Produces the calculator's textual answer for `expression`.
///
/// Only digits, `.`, `+ - * / ( )` and spaces are accepted.
pub fn calculate(expression: &str) -> String {
    if !is_basic_math(expression) {
        return INVALID_EXPRESSION_MESSAGE.to_string();
    }
    match evaluate(expression) {
        Ok(value) => format!("{expression} = {value}"),
        Err(error) => format!("Error: {error}"),
    }
}

fn is_basic_math(expression: &str) -> bool {
    expression
        .chars()
        .all(|symbol| symbol.is_ascii_digit() || " .+-*/()".contains(symbol))
}

#[cfg(test)]
mod tests {
    use agui_agent_core::AgentTool;
    use serde_json::json;

    use super::{calculate, CalculatorTool, INVALID_EXPRESSION_MESSAGE};

    #[test]
    fn formats_integral_and_fractional_results() {
        assert_eq!(calculate("2 + 2"), "2 + 2 = 4");
        assert_eq!(calculate("10 * 5"), "10 * 5 = 50");
        assert_eq!(calculate("7 / 2"), "7 / 2 = 3.5");
        assert_eq!(calculate("(1 + 2) * -3"), "(1 + 2) * -3 = -9");
    }

    #[test]
    fn rejects_anything_beyond_basic_math() {
        assert_eq!(calculate("DROP TABLE users"), INVALID_EXPRESSION_MESSAGE);
        assert_eq!(calculate("2 ^ 3"), INVALID_EXPRESSION_MESSAGE);
        assert_eq!(calculate("process.exit()"), INVALID_EXPRESSION_MESSAGE);
    }

    #[test]
    fn reports_evaluation_failures_as_content() {
        assert_eq!(calculate("2 +"), "Error: unexpected end of expression");
        assert_eq!(calculate("1 / 0"), "Error: division by zero");
        assert_eq!(calculate(""), "Error: empty expression");
    }

    #[tokio::test]
    async fn tool_reads_expression_argument() {
        let result = CalculatorTool
            .execute(json!({"expression": "3 * 4"}))
            .await;
        assert!(!result.is_error);
        assert_eq!(result.as_text(), "3 * 4 = 12");
    }

    #[test]
    fn definition_requires_expression_string() {
        let definition = CalculatorTool.definition();
        assert_eq!(definition.name, "calculator");
        assert_eq!(definition.parameters["required"], json!(["expression"]));
        assert_eq!(
            definition.parameters["properties"]["expression"]["type"],
            "string"
        );
    }
}
