//! SSE transport for agent runs.

use super::*;

/// Spawns the run and returns the SSE response that carries its events.
///
/// The run task owns the only event sender, so the response body ends right
/// after the terminal `RUN_FINISHED`. When the client goes away the body and
/// its receiver are dropped, which stops the run and aborts the provider loop.
pub(super) fn stream_agent_run(
    state: &AguiServerState,
    provider: Provider,
    adapter: ProviderAdapter,
    request: AgentRunRequest,
) -> Response {
    let (tx, rx) = mpsc::unbounded_channel::<ProtocolEvent>();
    let timeout = state.config.run_timeout();
    tokio::spawn(async move {
        let AgentRunRequest {
            thread_id,
            run_id,
            history,
        } = request;
        tracing::debug!(
            %provider,
            model = adapter.model(),
            %thread_id,
            %run_id,
            messages = history.len(),
            "dispatching agent run"
        );
        let sequencer = RunEventSequencer::new(thread_id, run_id);
        let parts = adapter.stream(history);
        drive_run(sequencer, parts, provider.error_code(), timeout, &tx).await;
    });

    let stream = UnboundedReceiverStream::new(rx).map(|event| Ok::<Event, Infallible>(sse_event(&event)));
    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        Sse::new(stream).keep_alive(KeepAlive::default()),
    )
        .into_response()
}

fn sse_event(event: &ProtocolEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(payload) => Event::default().data(payload),
        Err(error) => {
            tracing::warn!(event = event.event_type(), %error, "failed to encode protocol event");
            Event::default().comment("event encoding failed")
        }
    }
}
