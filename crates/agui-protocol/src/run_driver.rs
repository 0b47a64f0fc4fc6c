use std::fmt::Display;
use std::time::Duration;

use agui_agent_core::StreamPart;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc::UnboundedSender;

use crate::{ProtocolEvent, RunEventSequencer};

pub const RUN_TIMEOUT_CODE: &str = "RUN_TIMEOUT";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Finished,
    Errored,
    TimedOut,
    /// The event receiver went away before the run completed.
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub outcome: RunOutcome,
    pub events_sent: usize,
}

/// Pumps `parts` through `sequencer` and forwards every event to `sink`.
///
/// Part-stream errors become `RUN_ERROR{code: error_code}` followed by
/// `RUN_FINISHED`; exceeding `timeout` does the same with
/// [`RUN_TIMEOUT_CODE`]. The part stream is dropped as soon as the run ends
/// or `sink` closes, which cancels whatever produced it.
pub async fn drive_run<S, E>(
    mut sequencer: RunEventSequencer,
    parts: S,
    error_code: &str,
    timeout: Option<Duration>,
    sink: &UnboundedSender<ProtocolEvent>,
) -> RunReport
where
    S: Stream<Item = Result<StreamPart, E>>,
    E: Display,
{
    let thread_id = sequencer.thread_id().to_string();
    let run_id = sequencer.run_id().to_string();
    let mut events_sent = 0usize;
    tracing::info!(%thread_id, %run_id, "run started");

    let report = |outcome: RunOutcome, events_sent: usize| {
        match outcome {
            RunOutcome::Finished | RunOutcome::Errored | RunOutcome::TimedOut => {
                tracing::info!(%thread_id, %run_id, ?outcome, events_sent, "run finished")
            }
            RunOutcome::Disconnected => {
                tracing::debug!(%thread_id, %run_id, events_sent, "client disconnected mid-run")
            }
        }
        RunReport {
            outcome,
            events_sent,
        }
    };

    if !forward(sink, sequencer.start(), &mut events_sent) {
        return report(RunOutcome::Disconnected, events_sent);
    }

    let expiry = async move {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(expiry);
    tokio::pin!(parts);

    loop {
        tokio::select! {
            biased;
            _ = sink.closed() => {
                return report(RunOutcome::Disconnected, events_sent);
            }
            _ = &mut expiry => {
                let limit_ms = timeout
                    .map(|limit| u64::try_from(limit.as_millis()).unwrap_or(u64::MAX))
                    .unwrap_or_default();
                tracing::warn!(%thread_id, %run_id, limit_ms, "run timed out");
                let events = sequencer.fail(format!("run exceeded {limit_ms}ms"), RUN_TIMEOUT_CODE);
                let outcome = if forward(sink, events, &mut events_sent) {
                    RunOutcome::TimedOut
                } else {
                    RunOutcome::Disconnected
                };
                return report(outcome, events_sent);
            }
            next = parts.next() => {
                let (events, terminal) = match next {
                    Some(Ok(part)) => (sequencer.on_part(&part), None),
                    Some(Err(error)) => {
                        let message = error.to_string();
                        tracing::warn!(%thread_id, %run_id, code = error_code, %message, "run failed");
                        (sequencer.fail(message, error_code), Some(RunOutcome::Errored))
                    }
                    None => (sequencer.finish(), Some(RunOutcome::Finished)),
                };
                if !forward(sink, events, &mut events_sent) {
                    return report(RunOutcome::Disconnected, events_sent);
                }
                if let Some(outcome) = terminal {
                    return report(outcome, events_sent);
                }
            }
        }
    }
}

fn forward(
    sink: &UnboundedSender<ProtocolEvent>,
    events: Vec<ProtocolEvent>,
    events_sent: &mut usize,
) -> bool {
    for event in events {
        if sink.send(event).is_err() {
            return false;
        }
        *events_sent += 1;
    }
    true
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use agui_agent_core::StreamPart;
    use futures_util::stream;
    use futures_util::StreamExt;
    use serde_json::json;
    use tokio::sync::mpsc;

    use super::{drive_run, RunOutcome, RUN_TIMEOUT_CODE};
    use crate::{ProtocolEvent, RunEventSequencer};

    fn sequencer() -> RunEventSequencer {
        RunEventSequencer::with_id_epoch("t1", "r1", 42)
    }

    fn drain(receiver: &mut mpsc::UnboundedReceiver<ProtocolEvent>) -> Vec<ProtocolEvent> {
        let mut events = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            events.push(event);
        }
        events
    }

    fn types(events: &[ProtocolEvent]) -> Vec<&'static str> {
        events.iter().map(ProtocolEvent::event_type).collect()
    }

    #[tokio::test]
    async fn forwards_parts_and_reports_finished() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let parts = stream::iter(vec![
            Ok::<_, String>(StreamPart::tool_call("calculator", json!({"expression": "2 + 2"}))),
            Ok(StreamPart::tool_result("2 + 2 = 4")),
            Ok(StreamPart::text("4")),
        ]);
        let report = drive_run(sequencer(), parts, "OPENAI_ERROR", None, &sender).await;
        assert_eq!(report.outcome, RunOutcome::Finished);
        let events = drain(&mut receiver);
        assert_eq!(report.events_sent, events.len());
        assert_eq!(
            types(&events),
            vec![
                "RUN_STARTED",
                "TOOL_CALL_START",
                "TOOL_CALL_ARGS",
                "TOOL_CALL_END",
                "TOOL_CALL_RESULT",
                "TEXT_MESSAGE_START",
                "TEXT_MESSAGE_CONTENT",
                "TEXT_MESSAGE_END",
                "RUN_FINISHED",
            ]
        );
    }

    #[tokio::test]
    async fn stream_error_becomes_run_error_with_provider_code() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let parts = stream::iter(vec![
            Ok(StreamPart::text("Hi")),
            Err("connection reset".to_string()),
            Ok(StreamPart::text("never seen")),
        ]);
        let report = drive_run(sequencer(), parts, "GEMINI_ERROR", None, &sender).await;
        assert_eq!(report.outcome, RunOutcome::Errored);
        let events = drain(&mut receiver);
        assert_eq!(
            types(&events),
            vec![
                "RUN_STARTED",
                "TEXT_MESSAGE_START",
                "TEXT_MESSAGE_CONTENT",
                "RUN_ERROR",
                "RUN_FINISHED",
            ]
        );
        assert_eq!(
            events[3],
            ProtocolEvent::RunError {
                message: "connection reset".to_string(),
                code: "GEMINI_ERROR".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn stalled_stream_times_out() {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let parts = stream::iter(vec![Ok::<_, String>(StreamPart::text("thinking"))])
            .chain(stream::pending());
        let report = drive_run(
            sequencer(),
            parts,
            "ANTHROPIC_ERROR",
            Some(Duration::from_millis(30)),
            &sender,
        )
        .await;
        assert_eq!(report.outcome, RunOutcome::TimedOut);
        let events = drain(&mut receiver);
        let error = &events[events.len() - 2];
        assert!(
            matches!(error, ProtocolEvent::RunError { code, .. } if code == RUN_TIMEOUT_CODE)
        );
        assert!(events[events.len() - 1].is_run_finished());
    }

    #[tokio::test]
    async fn closed_receiver_stops_the_run_and_drops_the_stream() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicBool::new(false));
        let flag = DropFlag(Arc::clone(&dropped));
        let parts = stream::pending::<Result<StreamPart, String>>().map(move |item| {
            let _keep = &flag;
            item
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        let closer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(receiver);
        });
        let report = drive_run(sequencer(), parts, "OPENAI_ERROR", None, &sender).await;
        closer.await.expect("closer task");
        assert_eq!(report.outcome, RunOutcome::Disconnected);
        assert_eq!(report.events_sent, 1);
        assert!(dropped.load(Ordering::SeqCst));
    }
}
