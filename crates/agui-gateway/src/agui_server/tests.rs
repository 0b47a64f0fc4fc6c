//! AG-UI gateway tests exercising the HTTP surface end to end.
use std::collections::VecDeque;
use std::sync::Mutex;

use super::*;
use super::server_bootstrap::build_agui_router;
use agui_agent_core::{AdapterConfig, ToolRegistry};
use agui_ai::{
    AiError, ChatRequest, ChatResponse, ContentBlock, LlmClient, Message, StreamDeltaHandler,
};
use agui_tools::builtin_tool_registry;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

enum ScriptedStep {
    Reply {
        deltas: Vec<&'static str>,
        response: ChatResponse,
    },
    FailAfter {
        deltas: Vec<&'static str>,
        message: &'static str,
    },
    Hang,
}

#[derive(Clone, Default)]
struct ScriptedGatewayClient {
    steps: Arc<Mutex<VecDeque<ScriptedStep>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl ScriptedGatewayClient {
    fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Arc::new(Mutex::new(steps.into())),
            requests: Arc::default(),
        }
    }

    fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedGatewayClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse, AiError> {
        self.complete_with_stream(request, None).await
    }

    async fn complete_with_stream(
        &self,
        request: ChatRequest,
        on_delta: Option<StreamDeltaHandler>,
    ) -> Result<ChatResponse, AiError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        let step = self.steps.lock().ok().and_then(|mut steps| steps.pop_front());
        let emit = |deltas: &[&'static str]| {
            if let Some(handler) = &on_delta {
                for delta in deltas {
                    handler((*delta).to_string());
                }
            }
        };
        match step {
            Some(ScriptedStep::Reply { deltas, response }) => {
                emit(&deltas);
                Ok(response)
            }
            Some(ScriptedStep::FailAfter { deltas, message }) => {
                emit(&deltas);
                Err(AiError::InvalidResponse(message.to_string()))
            }
            Some(ScriptedStep::Hang) => {
                std::future::pending::<()>().await;
                Err(AiError::InvalidResponse("unreachable".to_string()))
            }
            None => Err(AiError::InvalidResponse("script exhausted".to_string())),
        }
    }
}

fn text_reply(deltas: Vec<&'static str>) -> ScriptedStep {
    let text = deltas.concat();
    ScriptedStep::Reply {
        deltas,
        response: ChatResponse {
            message: Message::assistant_text(text),
            finish_reason: Some("stop".to_string()),
        },
    }
}

fn tool_call_reply(name: &str, arguments: Value) -> ScriptedStep {
    ScriptedStep::Reply {
        deltas: Vec::new(),
        response: ChatResponse {
            message: Message::assistant_blocks(vec![ContentBlock::ToolCall {
                id: "call_1".to_string(),
                name: name.to_string(),
                arguments,
            }]),
            finish_reason: Some("tool_use".to_string()),
        },
    }
}

fn adapter(client: ScriptedGatewayClient, tools: ToolRegistry, model: &str) -> ProviderAdapter {
    ProviderAdapter::new(
        Arc::new(client),
        Arc::new(tools),
        AdapterConfig {
            model: model.to_string(),
            ..AdapterConfig::default()
        },
    )
}

fn test_config(adapters: Vec<(Provider, ProviderAdapter)>) -> AguiServerConfig {
    AguiServerConfig {
        service_name: "agui-test".to_string(),
        bind: "127.0.0.1:0".to_string(),
        default_provider: adapters
            .first()
            .map(|(provider, _)| *provider)
            .unwrap_or(Provider::Anthropic),
        adapters: adapters.into_iter().collect(),
        run_timeout_ms: 0,
        max_body_bytes: DEFAULT_MAX_BODY_BYTES,
    }
}

fn single_provider_config(client: ScriptedGatewayClient) -> AguiServerConfig {
    test_config(vec![(
        Provider::Anthropic,
        adapter(client, builtin_tool_registry(), "claude-test"),
    )])
}

async fn spawn_test_server(
    config: AguiServerConfig,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let app = build_agui_router(Arc::new(AguiServerState::new(config, addr)));
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, handle))
}

fn run_body(content: &str) -> Value {
    json!({
        "thread_id": "t1",
        "run_id": "r1",
        "messages": [{"role": "user", "content": content}]
    })
}

fn parse_sse_events(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .flat_map(|frame| frame.lines())
        .filter_map(|line| line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:")))
        .map(|payload| serde_json::from_str::<Value>(payload).expect("event json"))
        .collect()
}

fn event_types(events: &[Value]) -> Vec<String> {
    events
        .iter()
        .map(|event| event["type"].as_str().unwrap_or_default().to_string())
        .collect()
}

async fn post_run(addr: SocketAddr, path: &str, body: &Value) -> Vec<Value> {
    let response = Client::new()
        .post(format!("http://{addr}{path}"))
        .json(body)
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.contains("text/event-stream"));
    let cache_control = response
        .headers()
        .get("cache-control")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert_eq!(cache_control, "no-cache");
    let connection = response
        .headers()
        .get("connection")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_ascii_lowercase();
    assert_eq!(connection, "keep-alive");
    let body = response.text().await.expect("read sse body");
    parse_sse_events(&body)
}

#[tokio::test]
async fn integration_tool_call_then_text_streams_clock_scenario() {
    let client = ScriptedGatewayClient::new(vec![
        tool_call_reply("get_current_time", json!({})),
        text_reply(vec!["It is ", "noon."]),
    ]);
    let (addr, handle) = spawn_test_server(single_provider_config(client.clone()))
        .await
        .expect("spawn server");

    let events = post_run(addr, AGENT_ENDPOINT, &run_body("what time is it?")).await;
    assert_eq!(
        event_types(&events),
        vec![
            "RUN_STARTED",
            "TOOL_CALL_START",
            "TOOL_CALL_ARGS",
            "TOOL_CALL_END",
            "TOOL_CALL_RESULT",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );
    assert_eq!(events[0], json!({"type": "RUN_STARTED", "thread_id": "t1", "run_id": "r1"}));
    assert_eq!(events[1]["tool_call_id"], "tc-1");
    assert_eq!(events[1]["tool_call_name"], "get_current_time");
    assert_eq!(events[2]["delta"], "{}");
    assert_eq!(events[4]["tool_call_id"], "tc-1");
    assert_eq!(events[4]["result"].as_str().unwrap_or_default().len(), 19);
    assert_eq!(events[5]["role"], "assistant");
    assert_eq!(events[6]["delta"], "It is ");
    assert_eq!(events[6]["message_id"], events[5]["message_id"]);
    assert_eq!(events[9], json!({"type": "RUN_FINISHED", "thread_id": "t1", "run_id": "r1"}));

    let requests = client.recorded_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].model, "claude-test");
    assert_eq!(requests[0].tools.len(), 2);
    assert_eq!(requests[1].messages.len(), 4);

    handle.abort();
}

#[tokio::test]
async fn integration_calculator_result_is_forwarded_verbatim() {
    let client = ScriptedGatewayClient::new(vec![
        tool_call_reply("calculator", json!({"expression": "2 + 2"})),
        text_reply(vec!["Four."]),
    ]);
    let (addr, handle) = spawn_test_server(single_provider_config(client))
        .await
        .expect("spawn server");

    let events = post_run(addr, AGENT_ENDPOINT, &run_body("2 + 2?")).await;
    let result = events
        .iter()
        .find(|event| event["type"] == "TOOL_CALL_RESULT")
        .expect("tool result event");
    assert_eq!(result["result"], "2 + 2 = 4");
    let args = events
        .iter()
        .find(|event| event["type"] == "TOOL_CALL_ARGS")
        .expect("tool args event");
    assert_eq!(args["delta"], r#"{"expression":"2 + 2"}"#);

    handle.abort();
}

#[tokio::test]
async fn integration_provider_error_after_text_leaves_message_open() {
    let client = ScriptedGatewayClient::new(vec![ScriptedStep::FailAfter {
        deltas: vec!["Hel"],
        message: "stream interrupted",
    }]);
    let (addr, handle) = spawn_test_server(single_provider_config(client))
        .await
        .expect("spawn server");

    let events = post_run(addr, AGENT_ENDPOINT, &run_body("hello")).await;
    assert_eq!(
        event_types(&events),
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "RUN_ERROR",
            "RUN_FINISHED",
        ]
    );
    assert_eq!(events[3]["code"], "ANTHROPIC_ERROR");
    assert!(events[3]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("stream interrupted"));

    handle.abort();
}

#[tokio::test]
async fn integration_text_only_run_is_a_single_message_span() {
    let client = ScriptedGatewayClient::new(vec![text_reply(vec!["Hi", " there", "!"])]);
    let (addr, handle) = spawn_test_server(single_provider_config(client))
        .await
        .expect("spawn server");

    let events = post_run(addr, AGENT_ENDPOINT, &run_body("hello")).await;
    assert_eq!(
        event_types(&events),
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_CONTENT",
            "TEXT_MESSAGE_END",
            "RUN_FINISHED",
        ]
    );

    handle.abort();
}

#[tokio::test]
async fn functional_provider_route_uses_provider_error_code() {
    let anthropic = ScriptedGatewayClient::new(vec![text_reply(vec!["unused"])]);
    let openai = ScriptedGatewayClient::new(vec![ScriptedStep::FailAfter {
        deltas: Vec::new(),
        message: "quota exceeded",
    }]);
    let config = test_config(vec![
        (
            Provider::Anthropic,
            adapter(anthropic, ToolRegistry::new(), "claude-test"),
        ),
        (
            Provider::OpenAi,
            adapter(openai.clone(), ToolRegistry::new(), "gpt-test"),
        ),
    ]);
    let (addr, handle) = spawn_test_server(config).await.expect("spawn server");

    let events = post_run(addr, "/agent/openai", &run_body("hi")).await;
    assert_eq!(
        event_types(&events),
        vec!["RUN_STARTED", "RUN_ERROR", "RUN_FINISHED"]
    );
    assert_eq!(events[1]["code"], "OPENAI_ERROR");
    assert_eq!(openai.recorded_requests()[0].model, "gpt-test");

    handle.abort();
}

#[tokio::test]
async fn functional_google_route_reports_gemini_error_code() {
    let anthropic = ScriptedGatewayClient::new(vec![text_reply(vec!["unused"])]);
    let google = ScriptedGatewayClient::new(vec![ScriptedStep::FailAfter {
        deltas: vec!["partial"],
        message: "gemini stream reset",
    }]);
    let config = test_config(vec![
        (
            Provider::Anthropic,
            adapter(anthropic, ToolRegistry::new(), "claude-test"),
        ),
        (
            Provider::Google,
            adapter(google, ToolRegistry::new(), "gemini-test"),
        ),
    ]);
    let (addr, handle) = spawn_test_server(config).await.expect("spawn server");

    let events = post_run(addr, "/agent/google", &run_body("hi")).await;
    assert_eq!(
        event_types(&events),
        vec![
            "RUN_STARTED",
            "TEXT_MESSAGE_START",
            "TEXT_MESSAGE_CONTENT",
            "RUN_ERROR",
            "RUN_FINISHED",
        ]
    );
    assert_eq!(events[3]["code"], "GEMINI_ERROR");
    assert!(events[3]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("gemini stream reset"));

    handle.abort();
}

#[tokio::test]
async fn functional_run_timeout_emits_run_timeout_error() {
    let client = ScriptedGatewayClient::new(vec![ScriptedStep::Hang]);
    let mut config = single_provider_config(client);
    config.run_timeout_ms = 50;
    let (addr, handle) = spawn_test_server(config).await.expect("spawn server");

    let events = post_run(addr, AGENT_ENDPOINT, &run_body("hello")).await;
    assert_eq!(
        event_types(&events),
        vec!["RUN_STARTED", "RUN_ERROR", "RUN_FINISHED"]
    );
    assert_eq!(events[1]["code"], "RUN_TIMEOUT");

    handle.abort();
}

#[tokio::test]
async fn regression_invalid_requests_fail_before_streaming() {
    let client = ScriptedGatewayClient::default();
    let (addr, handle) = spawn_test_server(single_provider_config(client.clone()))
        .await
        .expect("spawn server");
    let http = Client::new();

    let response = http
        .post(format!("http://{addr}{AGENT_ENDPOINT}"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("send malformed");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = response.json::<Value>().await.expect("error json");
    assert_eq!(payload["error"]["code"], "malformed_json");
    assert_eq!(payload["error"]["type"], "invalid_request_error");

    let cases = [
        (
            json!({"run_id": "r1", "messages": [{"role": "user", "content": "hi"}]}),
            "missing_identifier",
        ),
        (
            json!({"thread_id": "t1", "run_id": "r1", "messages": []}),
            "missing_messages",
        ),
        (
            json!({"thread_id": "t1", "run_id": "r1", "messages": [{"role": "tool", "content": "x"}]}),
            "unsupported_role",
        ),
    ];
    for (body, code) in cases {
        let response = http
            .post(format!("http://{addr}{AGENT_ENDPOINT}"))
            .json(&body)
            .send()
            .await
            .expect("send invalid");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let payload = response.json::<Value>().await.expect("error json");
        assert_eq!(payload["error"]["code"], code);
    }
    assert!(client.recorded_requests().is_empty());

    handle.abort();
}

#[tokio::test]
async fn regression_unknown_or_unconfigured_provider_returns_not_found() {
    let (addr, handle) = spawn_test_server(single_provider_config(ScriptedGatewayClient::default()))
        .await
        .expect("spawn server");
    let http = Client::new();

    let response = http
        .post(format!("http://{addr}/agent/mistral"))
        .json(&run_body("hi"))
        .send()
        .await
        .expect("send unknown");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = response.json::<Value>().await.expect("error json");
    assert_eq!(payload["error"]["code"], "unknown_provider");

    let response = http
        .post(format!("http://{addr}/agent/google"))
        .json(&run_body("hi"))
        .send()
        .await
        .expect("send unconfigured");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = response.json::<Value>().await.expect("error json");
    assert_eq!(payload["error"]["code"], "provider_not_configured");

    handle.abort();
}

#[tokio::test]
async fn regression_oversized_body_is_rejected() {
    let mut config = single_provider_config(ScriptedGatewayClient::default());
    config.max_body_bytes = 64;
    let (addr, handle) = spawn_test_server(config).await.expect("spawn server");

    let response = Client::new()
        .post(format!("http://{addr}{AGENT_ENDPOINT}"))
        .json(&run_body(&"x".repeat(256)))
        .send()
        .await
        .expect("send oversized");
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let payload = response.json::<Value>().await.expect("error json");
    assert_eq!(payload["error"]["code"], "input_too_large");

    handle.abort();
}

#[tokio::test]
async fn functional_health_and_root_describe_mounted_providers() {
    let config = test_config(vec![
        (
            Provider::OpenAi,
            adapter(ScriptedGatewayClient::default(), ToolRegistry::new(), "gpt-test"),
        ),
        (
            Provider::Google,
            adapter(ScriptedGatewayClient::default(), ToolRegistry::new(), "gemini-test"),
        ),
    ]);
    let (addr, handle) = spawn_test_server(config).await.expect("spawn server");
    let http = Client::new();

    let health = http
        .get(format!("http://{addr}{HEALTH_ENDPOINT}"))
        .send()
        .await
        .expect("health")
        .json::<Value>()
        .await
        .expect("health json");
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["service"], "agui-test");
    assert_eq!(health["default_provider"], "openai");
    assert_eq!(health["agui_endpoint"], "/agent");
    assert_eq!(health["native_agui"], false);
    assert_eq!(health["framework"], "openai-raw");
    assert_eq!(health["port"], addr.port());
    assert_eq!(
        health["providers"],
        json!([
            {"provider": "openai", "framework": "openai-raw", "model": "gpt-test", "agui_endpoint": "/agent/openai"},
            {"provider": "google", "framework": "gemini-raw", "model": "gemini-test", "agui_endpoint": "/agent/google"}
        ])
    );
    assert!(health["uptime_seconds"].is_u64());

    let root = http
        .get(format!("http://{addr}/"))
        .send()
        .await
        .expect("root")
        .json::<Value>()
        .await
        .expect("root json");
    assert_eq!(root["name"], "agui-test");
    assert_eq!(root["framework"], "openai-raw");
    assert_eq!(root["agui_endpoint"], "POST /agent");
    assert_eq!(root["health_endpoint"], "GET /health");
    assert_eq!(
        root["provider_endpoints"],
        json!(["POST /agent/openai", "POST /agent/google"])
    );

    handle.abort();
}

#[test]
fn unit_config_validation_requires_configured_default_provider() {
    let empty = test_config(Vec::new());
    let error = empty.validate().expect_err("no providers");
    assert!(error.to_string().contains("no provider is configured"));

    let mut config = single_provider_config(ScriptedGatewayClient::default());
    config.default_provider = Provider::Google;
    let error = config.validate().expect_err("default missing");
    assert!(error.to_string().contains("default provider 'google'"));

    let config = single_provider_config(ScriptedGatewayClient::default());
    assert!(config.validate().is_ok());
}
