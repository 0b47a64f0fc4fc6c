//! Built-in tools exposed to every provider: a local clock and a safe
//! arithmetic evaluator.

mod arithmetic;
mod calculator;
mod clock;

use agui_agent_core::ToolRegistry;

pub use arithmetic::{evaluate, ArithmeticError};
pub use calculator::{calculate, CalculatorTool, CALCULATOR_TOOL_NAME, INVALID_EXPRESSION_MESSAGE};
pub use clock::{ClockTool, CLOCK_TOOL_NAME};

/// Registry holding the built-in tools, built once at startup.
pub fn builtin_tool_registry() -> ToolRegistry {
    ToolRegistry::new()
        .with_tool(ClockTool)
        .with_tool(CalculatorTool)
}
