use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    retry::{send_with_retries, RetryPolicy},
    sse::{is_event_stream, read_sse_frames, SseFrame},
    types::system_prompt_text,
    AiError, ChatRequest, ChatResponse, ContentBlock, LlmClient, Message, MessageRole,
    StreamDeltaHandler, ToolDefinition,
};

#[derive(Debug, Clone)]
/// Connection settings for the Gemini `generateContent` API.
pub struct GoogleConfig {
    pub api_base: String,
    pub api_key: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone)]
pub struct GoogleClient {
    client: reqwest::Client,
    config: GoogleConfig,
}

impl GoogleClient {
    pub fn new(config: GoogleConfig) -> Result<Self, AiError> {
        if config.api_key.trim().is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self { client, config })
    }

    fn model_url(&self, model: &str, streaming: bool) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        let method = if streaming {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        format!("{base}/models/{model}:{method}")
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
        let body = build_generate_content_body(&request);
        let streaming = on_delta.is_some();
        let url = self.model_url(&request.model, streaming);
        let mut query = vec![("key", self.config.api_key.trim())];
        if streaming {
            query.push(("alt", "sse"));
        }
        let response = send_with_retries("google", self.retry_policy(), || {
            self.client.post(&url).query(&query).json(&body)
        })
        .await?;

        match on_delta {
            Some(on_delta) if is_event_stream(&response) => {
                let mut state = GoogleStreamState::default();
                read_sse_frames(response, |frame| state.apply(&frame, &on_delta)).await?;
                Ok(state.into_response())
            }
            Some(on_delta) => {
                let parsed = parse_generate_content_response(&response.text().await?)?;
                let text = parsed.message.text_content();
                if !text.is_empty() {
                    on_delta(text);
                }
                Ok(parsed)
            }
            None => parse_generate_content_response(&response.text().await?),
        }
    }
}

#[async_trait]
impl LlmClient for GoogleClient {
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

fn build_generate_content_body(request: &ChatRequest) -> Value {
    let mut body = json!({ "contents": to_google_contents(&request.messages) });

    let system = system_prompt_text(&request.messages);
    if !system.is_empty() {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }
    if !request.tools.is_empty() {
        body["tools"] = json!([{
            "functionDeclarations": request
                .tools
                .iter()
                .map(to_google_function_declaration)
                .collect::<Vec<_>>(),
        }]);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["generationConfig"] = json!({ "maxOutputTokens": max_tokens });
    }
    body
}

fn to_google_function_declaration(tool: &ToolDefinition) -> Value {
    let mut declaration = json!({
        "name": tool.name,
        "description": tool.description,
    });
    // Gemini rejects object schemas without properties.
    let has_properties = tool
        .parameters
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|properties| !properties.is_empty());
    if has_properties {
        declaration["parameters"] = sanitize_google_schema(&tool.parameters);
    }
    declaration
}

/// Strips JSON-Schema keywords the Gemini schema subset does not accept.
fn sanitize_google_schema(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| key.as_str() != "additionalProperties")
                .map(|(key, nested)| (key.clone(), sanitize_google_schema(nested)))
                .collect(),
        ),
        Value::Array(values) => values.iter().map(sanitize_google_schema).collect(),
        _ => value.clone(),
    }
}

fn to_google_contents(messages: &[Message]) -> Value {
    let mut contents: Vec<Value> = Vec::new();
    for message in messages {
        let (role, parts) = match message.role {
            MessageRole::System => continue,
            MessageRole::User => ("user", text_parts(message)),
            MessageRole::Assistant => {
                let mut parts = text_parts(message);
                parts.extend(message.tool_calls().into_iter().map(|call| {
                    json!({ "functionCall": { "name": call.name, "args": call.arguments } })
                }));
                ("model", parts)
            }
            MessageRole::Tool => (
                "user",
                vec![json!({
                    "functionResponse": {
                        "name": message.tool_name.as_deref().unwrap_or("unknown_tool"),
                        "response": { "content": message.text_content() },
                    }
                })],
            ),
        };
        if parts.is_empty() {
            continue;
        }

        // Parallel function responses belong to one turn.
        let extends_previous = message.role == MessageRole::Tool
            && contents
                .last()
                .is_some_and(|last| last["parts"][0].get("functionResponse").is_some());
        if extends_previous {
            if let Some(previous) = contents
                .last_mut()
                .and_then(|last| last["parts"].as_array_mut())
            {
                previous.extend(parts);
                continue;
            }
        }
        contents.push(json!({ "role": role, "parts": parts }));
    }
    Value::Array(contents)
}

fn text_parts(message: &Message) -> Vec<Value> {
    message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } if !text.trim().is_empty() => {
                Some(json!({ "text": text }))
            }
            _ => None,
        })
        .collect()
}

fn parse_generate_content_response(raw: &str) -> Result<ChatResponse, AiError> {
    let parsed: GenerateContentResponse = serde_json::from_str(raw)?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AiError::InvalidResponse("response contained no candidates".to_string()))?;

    let mut state = GoogleStreamState::default();
    state.absorb_candidate(candidate, None);
    Ok(state.into_response())
}

#[derive(Debug, Default)]
struct GoogleStreamState {
    text: String,
    function_calls: Vec<ContentBlock>,
    finish_reason: Option<String>,
}

impl GoogleStreamState {
    fn apply(&mut self, frame: &SseFrame, on_delta: &StreamDeltaHandler) -> Result<(), AiError> {
        let data = frame.data.trim();
        if data.is_empty() {
            return Ok(());
        }
        let chunk: GenerateContentResponse = serde_json::from_str(data).map_err(|error| {
            AiError::InvalidResponse(format!("failed to parse Google stream chunk: {error}"))
        })?;
        if let Some(error) = chunk.error {
            return Err(AiError::InvalidResponse(error.message));
        }
        for candidate in chunk.candidates {
            self.absorb_candidate(candidate, Some(on_delta));
        }
        Ok(())
    }

    fn absorb_candidate(
        &mut self,
        candidate: GenerateContentCandidate,
        on_delta: Option<&StreamDeltaHandler>,
    ) {
        if candidate.finish_reason.is_some() {
            self.finish_reason = candidate.finish_reason;
        }
        let parts = candidate
            .content
            .map(|content| content.parts)
            .unwrap_or_default();
        for part in parts {
            if let Some(fragment) = part.text.filter(|fragment| !fragment.is_empty()) {
                self.text.push_str(&fragment);
                if let Some(on_delta) = on_delta {
                    on_delta(fragment);
                }
            }
            if let Some(function_call) = part.function_call {
                self.function_calls.push(ContentBlock::ToolCall {
                    id: format!("google_call_{}", self.function_calls.len() + 1),
                    name: function_call.name,
                    arguments: function_call.args.unwrap_or_else(|| json!({})),
                });
            }
        }
    }

    fn into_response(self) -> ChatResponse {
        let mut blocks = Vec::new();
        if !self.text.trim().is_empty() {
            blocks.push(ContentBlock::Text { text: self.text });
        }
        blocks.extend(self.function_calls);
        ChatResponse {
            message: Message::assistant_blocks(blocks),
            finish_reason: self.finish_reason,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GenerateContentCandidate>,
    error: Option<GenerateContentError>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentError {
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentCandidate {
    content: Option<GenerateContentContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentContent {
    #[serde(default)]
    parts: Vec<GenerateContentPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentPart {
    text: Option<String>,
    function_call: Option<GenerateContentFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct GenerateContentFunctionCall {
    name: String,
    args: Option<Value>,
}
