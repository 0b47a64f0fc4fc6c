use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    retry::{send_with_retries, RetryPolicy},
    sse::{is_event_stream, read_sse_frames, SseFrame},
    types::{parse_tool_arguments, system_prompt_text},
    AiError, ChatRequest, ChatResponse, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolDefinition,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Clone)]
/// Connection settings for the Anthropic Messages API.
pub struct AnthropicConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    client: reqwest::Client,
    config: AnthropicConfig,
}

impl AnthropicClient {
    pub fn new(config: AnthropicConfig) -> Result<Self, AiError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key)
                .map_err(|e| AiError::InvalidResponse(format!("invalid API key header: {e}")))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(ANTHROPIC_VERSION));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn messages_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/messages") {
            return base.to_string();
        }
        format!("{base}/messages")
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
        let mut body = build_messages_request_body(&request);
        if on_delta.is_some() {
            body["stream"] = json!(true);
        }
        let url = self.messages_url();
        let response = send_with_retries("anthropic", self.retry_policy(), || {
            self.client.post(&url).json(&body)
        })
        .await?;

        match on_delta {
            Some(on_delta) if is_event_stream(&response) => {
                let mut state = AnthropicStreamState::default();
                read_sse_frames(response, |frame| state.apply(&frame, &on_delta)).await?;
                state.into_response()
            }
            Some(on_delta) => {
                let parsed = parse_messages_response(&response.text().await?)?;
                let text = parsed.message.text_content();
                if !text.is_empty() {
                    on_delta(text);
                }
                Ok(parsed)
            }
            None => parse_messages_response(&response.text().await?),
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
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

fn build_messages_request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": to_anthropic_messages(&request.messages),
        "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
    });

    let system = system_prompt_text(&request.messages);
    if !system.is_empty() {
        body["system"] = json!(system);
    }
    if !request.tools.is_empty() {
        body["tools"] = to_anthropic_tools(&request.tools);
    }
    body
}

fn to_anthropic_tools(tools: &[ToolDefinition]) -> Value {
    tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "input_schema": tool.parameters,
            })
        })
        .collect()
}

/// Encodes history for the Messages API.
///
/// Consecutive tool results are merged into a single `user` turn so the
/// request keeps strict user/assistant alternation.
fn to_anthropic_messages(messages: &[Message]) -> Value {
    let mut encoded: Vec<Value> = Vec::new();
    for message in messages {
        match message.role {
            MessageRole::System => {}
            MessageRole::User | MessageRole::Assistant => {
                let blocks = to_anthropic_blocks(message);
                if blocks.is_empty() {
                    continue;
                }
                let role = if message.role == MessageRole::User {
                    "user"
                } else {
                    "assistant"
                };
                encoded.push(json!({ "role": role, "content": blocks }));
            }
            MessageRole::Tool => {
                let result = json!({
                    "type": "tool_result",
                    "tool_use_id": message.tool_call_id.clone().unwrap_or_default(),
                    "content": message.text_content(),
                });
                let previous_is_tool_turn = encoded.last().is_some_and(|last| {
                    last["role"] == "user"
                        && last["content"][0]["type"] == "tool_result"
                });
                if previous_is_tool_turn {
                    if let Some(content) = encoded
                        .last_mut()
                        .and_then(|last| last["content"].as_array_mut())
                    {
                        content.push(result);
                        continue;
                    }
                }
                encoded.push(json!({ "role": "user", "content": [result] }));
            }
        }
    }
    Value::Array(encoded)
}

fn to_anthropic_blocks(message: &Message) -> Vec<Value> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                Some(json!({ "type": "text", "text": text }))
            }
            ContentBlock::Text { .. } => None,
            ContentBlock::ToolCall {
                id,
                name,
                arguments,
            } if message.role == MessageRole::Assistant => Some(json!({
                "type": "tool_use",
                "id": id,
                "name": name,
                "input": arguments,
            })),
            ContentBlock::ToolCall { .. } => None,
        })
        .collect()
}

fn parse_messages_response(raw: &str) -> Result<ChatResponse, AiError> {
    let parsed: AnthropicMessageResponse = serde_json::from_str(raw)?;
    let blocks = parsed
        .content
        .into_iter()
        .filter_map(|block| match block {
            AnthropicContent::Text { text } if !text.trim().is_empty() => {
                Some(ContentBlock::Text { text })
            }
            AnthropicContent::ToolUse { id, name, input } => Some(ContentBlock::ToolCall {
                id,
                name,
                arguments: input,
            }),
            _ => None,
        })
        .collect();

    Ok(ChatResponse {
        message: Message::assistant_blocks(blocks),
        finish_reason: parsed.stop_reason,
    })
}

#[derive(Debug, Default)]
struct AnthropicStreamState {
    text: String,
    tool_uses: BTreeMap<usize, AnthropicToolUse>,
    stop_reason: Option<String>,
    stopped: bool,
}

#[derive(Debug, Default)]
struct AnthropicToolUse {
    id: String,
    name: String,
    input: Option<Value>,
    partial_json: String,
}

impl AnthropicStreamState {
    fn apply(&mut self, frame: &SseFrame, on_delta: &StreamDeltaHandler) -> Result<(), AiError> {
        if frame.data.trim().is_empty() {
            return Ok(());
        }
        let event: AnthropicStreamEvent = serde_json::from_str(&frame.data).map_err(|error| {
            AiError::InvalidResponse(format!("failed to parse Anthropic stream chunk: {error}"))
        })?;

        match event {
            AnthropicStreamEvent::ContentBlockStart {
                index,
                content_block: AnthropicContent::ToolUse { id, name, input },
            } => {
                let tool_use = self.tool_uses.entry(index).or_default();
                tool_use.id = id;
                tool_use.name = name;
                tool_use.input = Some(input);
            }
            AnthropicStreamEvent::ContentBlockStart { .. } => {}
            AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
                AnthropicDelta::TextDelta { text } if !text.is_empty() => {
                    self.text.push_str(&text);
                    on_delta(text);
                }
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    self.tool_uses
                        .entry(index)
                        .or_default()
                        .partial_json
                        .push_str(&partial_json);
                }
                _ => {}
            },
            AnthropicStreamEvent::MessageDelta { delta } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
            }
            AnthropicStreamEvent::MessageStop => self.stopped = true,
            AnthropicStreamEvent::Error { error } => {
                let message = if error.message.is_empty() {
                    "anthropic stream returned error event".to_string()
                } else {
                    error.message
                };
                return Err(AiError::InvalidResponse(message));
            }
            AnthropicStreamEvent::Other => {}
        }
        Ok(())
    }

    /// Fails when the connection closed before `message_stop`, i.e. the reply was truncated.
    fn into_response(self) -> Result<ChatResponse, AiError> {
        if !self.stopped {
            return Err(AiError::InvalidResponse(
                "anthropic stream ended before message_stop".to_string(),
            ));
        }
        let mut blocks = Vec::new();
        if !self.text.trim().is_empty() {
            blocks.push(ContentBlock::Text { text: self.text });
        }
        for (index, tool_use) in self.tool_uses {
            if tool_use.name.trim().is_empty() {
                continue;
            }
            let id = if tool_use.id.trim().is_empty() {
                format!("anthropic_tool_{}", index + 1)
            } else {
                tool_use.id
            };
            // Streamed input arrives as `{}` on block start and is rebuilt from the deltas.
            let arguments = if tool_use.partial_json.trim().is_empty() {
                tool_use.input.unwrap_or_else(|| json!({}))
            } else {
                parse_tool_arguments(&tool_use.partial_json)
            };
            blocks.push(ContentBlock::ToolCall {
                id,
                name: tool_use.name,
                arguments,
            });
        }

        Ok(ChatResponse {
            message: Message::assistant_blocks(blocks),
            finish_reason: self.stop_reason,
        })
    }
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageResponse {
    content: Vec<AnthropicContent>,
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicContent {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicStreamEvent {
    ContentBlockStart {
        index: usize,
        content_block: AnthropicContent,
    },
    ContentBlockDelta {
        index: usize,
        delta: AnthropicDelta,
    },
    MessageDelta {
        delta: AnthropicMessageDelta,
    },
    MessageStop,
    Error {
        error: AnthropicErrorBody,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AnthropicDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicMessageDelta {
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicErrorBody {
    #[serde(default)]
    message: String,
}
