use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    retry::{send_with_retries, RetryPolicy},
    sse::{is_event_stream, read_sse_frames, SseFrame},
    types::parse_tool_arguments,
    AiError, ChatRequest, ChatResponse, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolDefinition,
};

const STREAM_DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Clone)]
/// Connection settings for the OpenAI Chat Completions API.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AiError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| AiError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );
        if let Some(organization) = config
            .organization
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(organization).map_err(|e| {
                    AiError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            retry_budget_ms: self.config.retry_budget_ms,
            jitter: self.config.retry_jitter,
        }
    }

    async fn complete_with_mode(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, AiError> {
        let mut body = build_chat_request_body(&request)?;
        if on_delta.is_some() {
            body["stream"] = json!(true);
        }
        let url = self.chat_completions_url();
        let response = send_with_retries("openai", self.retry_policy(), || {
            self.client.post(&url).json(&body)
        })
        .await?;

        match on_delta {
            Some(on_delta) if is_event_stream(&response) => {
                let mut state = OpenAiStreamState::default();
                read_sse_frames(response, |frame| state.apply(&frame, &on_delta)).await?;
                Ok(state.into_response())
            }
            Some(on_delta) => {
                let parsed = parse_chat_response(&response.text().await?)?;
                let text = parsed.message.text_content();
                if !text.is_empty() {
                    on_delta(text);
                }
                Ok(parsed)
            }
            None => parse_chat_response(&response.text().await?),
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.complete_with_mode(request, None).await
    }

    async fn complete_with_stream(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, AiError> {
        self.complete_with_mode(request, on_delta).await
    }
}

fn build_chat_request_body(request: &ChatRequest) -> Result<Value, AiError> {
    let mut body = json!({
        "model": request.model,
        "messages": to_openai_messages(&request.messages)?,
    });
    if !request.tools.is_empty() {
        body["tools"] = to_openai_tools(&request.tools);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_completion_tokens"] = json!(max_tokens);
    }
    Ok(body)
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Value {
    tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                }
            })
        })
        .collect()
}

fn to_openai_messages(messages: &[Message]) -> Result<Vec<Value>, AiError> {
    messages
        .iter()
        .map(|message| match message.role {
            MessageRole::System => Ok(json!({
                "role": "system",
                "content": message.text_content(),
            })),
            MessageRole::User => Ok(json!({
                "role": "user",
                "content": message.text_content(),
            })),
            MessageRole::Assistant => {
                let tool_calls: Vec<Value> = message
                    .tool_calls()
                    .into_iter()
                    .map(|call| {
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": {
                                "name": call.name,
                                "arguments": stringify_tool_arguments(&call.arguments),
                            }
                        })
                    })
                    .collect();
                let text = message.text_content();
                if tool_calls.is_empty() {
                    return Ok(json!({ "role": "assistant", "content": text }));
                }
                let content = if text.trim().is_empty() {
                    Value::Null
                } else {
                    Value::String(text)
                };
                Ok(json!({
                    "role": "assistant",
                    "content": content,
                    "tool_calls": tool_calls,
                }))
            }
            MessageRole::Tool => {
                let tool_call_id = message.tool_call_id.as_deref().ok_or_else(|| {
                    AiError::InvalidResponse("tool message is missing tool_call_id".to_string())
                })?;
                Ok(json!({
                    "role": "tool",
                    "tool_call_id": tool_call_id,
                    "content": message.text_content(),
                }))
            }
        })
        .collect()
}

fn stringify_tool_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(raw) => raw.clone(),
        value => value.to_string(),
    }
}

fn parse_chat_response(raw: &str) -> Result<ChatResponse, AiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| AiError::InvalidResponse("response contained no choices".to_string()))?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content.filter(|text| !text.trim().is_empty()) {
        content.push(ContentBlock::Text { text });
    }
    for tool_call in choice.message.tool_calls.unwrap_or_default() {
        if tool_call.call_type != "function" {
            continue;
        }
        content.push(ContentBlock::ToolCall {
            id: tool_call.id,
            name: tool_call.function.name,
            arguments: parse_tool_arguments(&tool_call.function.arguments),
        });
    }

    Ok(ChatResponse {
        message: Message::assistant_blocks(content),
        finish_reason: choice.finish_reason,
    })
}

#[derive(Debug, Default)]
struct OpenAiStreamState {
    text: String,
    tool_calls: BTreeMap<usize, OpenAiToolCallAccumulator>,
    finish_reason: Option<String>,
    done: bool,
}

#[derive(Debug, Default)]
struct OpenAiToolCallAccumulator {
    id: String,
    name: String,
    arguments: String,
}

impl OpenAiStreamState {
    fn apply(&mut self, frame: &SseFrame, on_delta: &StreamDeltaHandler) -> Result<(), AiError> {
        let data = frame.data.trim();
        if self.done || data.is_empty() {
            return Ok(());
        }
        if data == STREAM_DONE_MARKER {
            self.done = true;
            return Ok(());
        }

        let chunk: OpenAiStreamChunk = serde_json::from_str(data).map_err(|error| {
            AiError::InvalidResponse(format!("failed to parse OpenAI stream chunk: {error}"))
        })?;
        if let Some(error) = chunk.error {
            return Err(AiError::InvalidResponse(error.message));
        }

        for choice in chunk.choices {
            if choice.finish_reason.is_some() {
                self.finish_reason = choice.finish_reason;
            }
            let Some(delta) = choice.delta else {
                continue;
            };
            if let Some(fragment) = delta.content.filter(|fragment| !fragment.is_empty()) {
                self.text.push_str(&fragment);
                on_delta(fragment);
            }
            for call_delta in delta.tool_calls.unwrap_or_default() {
                let current = self.tool_calls.entry(call_delta.index).or_default();
                if let Some(id) = call_delta.id.filter(|id| !id.is_empty()) {
                    current.id = id;
                }
                if let Some(function) = call_delta.function {
                    if let Some(name) = function.name.filter(|name| !name.is_empty()) {
                        current.name = name;
                    }
                    if let Some(arguments) = function.arguments {
                        current.arguments.push_str(&arguments);
                    }
                }
            }
        }
        Ok(())
    }

    fn into_response(self) -> ChatResponse {
        let mut content = Vec::new();
        if !self.text.trim().is_empty() {
            content.push(ContentBlock::Text { text: self.text });
        }
        for (index, call) in self.tool_calls {
            if call.name.trim().is_empty() {
                continue;
            }
            let id = if call.id.trim().is_empty() {
                format!("stream_tool_call_{}", index + 1)
            } else {
                call.id
            };
            content.push(ContentBlock::ToolCall {
                id,
                name: call.name,
                arguments: parse_tool_arguments(&call.arguments),
            });
        }

        ChatResponse {
            message: Message::assistant_blocks(content),
            finish_reason: self.finish_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    error: Option<OpenAiStreamError>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
