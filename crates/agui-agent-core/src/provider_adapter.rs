use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use agui_ai::{ChatRequest, LlmClient, Message, StreamDeltaHandler};
use futures_util::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::runtime_tool_bridge::execute_tool_call;
use crate::{AgentError, StreamPart, ToolRegistry, DEFAULT_MAX_STEPS, DEFAULT_SYSTEM_PROMPT};

type PartResult = Result<StreamPart, AgentError>;

#[derive(Debug, Clone, PartialEq)]
/// Per-provider settings for the tool loop.
pub struct AdapterConfig {
    pub model: String,
    pub system_prompt: String,
    /// Maximum number of model requests per run; tool calls requested by the
    /// last allowed request are still executed.
    pub max_steps: usize,
    pub max_tokens: Option<u32>,
    /// `0` disables the per-tool timeout.
    pub tool_timeout_ms: u64,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: None,
            tool_timeout_ms: 30_000,
        }
    }
}

/// Wraps one provider client and turns a conversation into a [`PartStream`].
#[derive(Clone)]
pub struct ProviderAdapter {
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    config: AdapterConfig,
}

impl ProviderAdapter {
    pub fn new(client: Arc<dyn LlmClient>, tools: Arc<ToolRegistry>, config: AdapterConfig) -> Self {
        Self {
            client,
            tools,
            config,
        }
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Starts the tool loop for `history` and returns its parts as they are produced.
    ///
    /// Must be called from within a Tokio runtime. Dropping the returned
    /// stream aborts the loop, including any in-flight provider request or
    /// tool execution.
    pub fn stream(&self, history: Vec<Message>) -> PartStream {
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Arc::clone(&self.client);
        let tools = Arc::clone(&self.tools);
        let config = self.config.clone();
        let task = tokio::spawn(async move {
            if let Err(error) = run_tool_loop(client, tools, config, history, &sender).await {
                let _ = sender.send(Err(error));
            }
        });
        PartStream {
            receiver,
            task,
            finished: false,
        }
    }
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("config", &self.config)
            .field("tools", &self.tools)
            .finish()
    }
}

async fn run_tool_loop(
    client: Arc<dyn LlmClient>,
    tools: Arc<ToolRegistry>,
    config: AdapterConfig,
    history: Vec<Message>,
    sender: &mpsc::UnboundedSender<PartResult>,
) -> Result<(), AgentError> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !config.system_prompt.trim().is_empty() {
        messages.push(Message::system(config.system_prompt.as_str()));
    }
    messages.extend(history);

    let definitions = tools.definitions();
    let tool_timeout = (config.tool_timeout_ms > 0).then(|| Duration::from_millis(config.tool_timeout_ms));
    let delta_sender = sender.clone();
    let on_delta: StreamDeltaHandler = Arc::new(move |fragment: String| {
        let _ = delta_sender.send(Ok(StreamPart::text(fragment)));
    });

    for step in 1..=config.max_steps.max(1) {
        let request = ChatRequest {
            model: config.model.clone(),
            messages: messages.clone(),
            tools: definitions.clone(),
            max_tokens: config.max_tokens,
        };
        let response = client
            .complete_with_stream(request, Some(Arc::clone(&on_delta)))
            .await?;
        let tool_calls = response.message.tool_calls();
        tracing::debug!(
            model = %config.model,
            step,
            tool_calls = tool_calls.len(),
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "provider step completed"
        );
        messages.push(response.message);
        if tool_calls.is_empty() {
            return Ok(());
        }

        for call in tool_calls {
            if sender
                .send(Ok(StreamPart::tool_call(call.name.clone(), call.arguments.clone())))
                .is_err()
            {
                return Ok(());
            }
            let output = execute_tool_call(&call, &tools, tool_timeout).await?;
            if sender.send(Ok(StreamPart::tool_result(output.clone()))).is_err() {
                return Ok(());
            }
            messages.push(Message::tool_result(call.id, call.name, output));
        }
    }

    tracing::debug!(
        model = %config.model,
        max_steps = config.max_steps,
        "tool loop reached its step limit"
    );
    Ok(())
}

/// Lazily produced parts of one run.
///
/// Ends after the final part, or after a single `Err` when the loop fails.
/// Dropping the stream aborts the background loop.
#[derive(Debug)]
pub struct PartStream {
    receiver: mpsc::UnboundedReceiver<PartResult>,
    task: JoinHandle<()>,
    finished: bool,
}

impl Stream for PartStream {
    type Item = PartResult;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        if let Some(part) = ready!(this.receiver.poll_recv(cx)) {
            return Poll::Ready(Some(part));
        }

        // Channel closed: surface a panicked loop instead of a silent clean end.
        let outcome = ready!(Pin::new(&mut this.task).poll(cx));
        this.finished = true;
        match outcome {
            Err(error) if error.is_panic() => {
                Poll::Ready(Some(Err(AgentError::TaskFailed(error.to_string()))))
            }
            _ => Poll::Ready(None),
        }
    }
}

impl Drop for PartStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}
