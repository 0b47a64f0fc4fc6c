//! Provider-neutral chat types and streaming HTTP clients for Anthropic,
//! OpenAI and Google Gemini.
mod anthropic;
mod google;
mod openai;
mod provider;
mod retry;
mod sse;
mod types;

pub use anthropic::{AnthropicClient, AnthropicConfig};
pub use google::{GoogleClient, GoogleConfig};
pub use openai::{OpenAiClient, OpenAiConfig};
pub use provider::{Provider, ProviderParseError};
pub use types::{
    AiError, ChatRequest, ChatResponse, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolCall, ToolDefinition,
};
