use agui_agent_core::StreamPart;
use agui_core::current_unix_timestamp_ms;

use crate::{AssistantRole, ProtocolEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Idle,
    Started,
    Finished,
    Errored,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Errored)
    }
}

/// Span-tracking state machine for a single run.
///
/// Each transition returns the events to emit, in order. Calls after a
/// terminal transition return nothing, so a run can never emit a second
/// `RUN_FINISHED`. Ending a run that was never started emits `RUN_STARTED`
/// first.
#[derive(Debug, Clone)]
pub struct RunEventSequencer {
    thread_id: String,
    run_id: String,
    phase: RunPhase,
    id_epoch_ms: u64,
    message_count: u64,
    tool_call_count: u64,
    open_message_id: Option<String>,
    current_tool_call_id: Option<String>,
}

impl RunEventSequencer {
    pub fn new(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Self::with_id_epoch(thread_id, run_id, current_unix_timestamp_ms())
    }

    /// Uses `id_epoch_ms` as the timestamp component of generated message ids.
    pub fn with_id_epoch(
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        id_epoch_ms: u64,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            run_id: run_id.into(),
            phase: RunPhase::Idle,
            id_epoch_ms,
            message_count: 0,
            tool_call_count: 0,
            open_message_id: None,
            current_tool_call_id: None,
        }
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn open_message_id(&self) -> Option<&str> {
        self.open_message_id.as_deref()
    }

    pub fn current_tool_call_id(&self) -> Option<&str> {
        self.current_tool_call_id.as_deref()
    }

    pub fn start(&mut self) -> Vec<ProtocolEvent> {
        if self.phase != RunPhase::Idle {
            return Vec::new();
        }
        self.phase = RunPhase::Started;
        vec![ProtocolEvent::RunStarted {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }]
    }

    pub fn on_part(&mut self, part: &StreamPart) -> Vec<ProtocolEvent> {
        let mut events = self.start();
        if self.phase != RunPhase::Started {
            return events;
        }
        match part {
            StreamPart::TextDelta { fragment } => self.push_text(fragment, &mut events),
            StreamPart::ToolCall { name, arguments } => {
                self.close_message(&mut events);
                self.tool_call_count += 1;
                let tool_call_id = format!("tc-{}", self.tool_call_count);
                events.push(ProtocolEvent::ToolCallStart {
                    tool_call_id: tool_call_id.clone(),
                    tool_call_name: name.clone(),
                });
                events.push(ProtocolEvent::ToolCallArgs {
                    tool_call_id: tool_call_id.clone(),
                    delta: arguments.to_string(),
                });
                events.push(ProtocolEvent::ToolCallEnd {
                    tool_call_id: tool_call_id.clone(),
                });
                self.current_tool_call_id = Some(tool_call_id);
            }
            StreamPart::ToolResult { value } => match &self.current_tool_call_id {
                Some(tool_call_id) => events.push(ProtocolEvent::ToolCallResult {
                    tool_call_id: tool_call_id.clone(),
                    result: value.clone(),
                }),
                None => {
                    tracing::warn!(
                        thread_id = %self.thread_id,
                        run_id = %self.run_id,
                        "dropping tool result that has no preceding tool call"
                    );
                }
            },
        }
        events
    }

    /// Successful end of the part stream.
    pub fn finish(&mut self) -> Vec<ProtocolEvent> {
        let mut events = self.start();
        if self.phase != RunPhase::Started {
            return events;
        }
        self.close_message(&mut events);
        events.push(self.run_finished());
        self.phase = RunPhase::Finished;
        events
    }

    /// Failed run: `RUN_ERROR` then `RUN_FINISHED`. An open message is left
    /// unterminated.
    pub fn fail(&mut self, message: impl Into<String>, code: impl Into<String>) -> Vec<ProtocolEvent> {
        let mut events = self.start();
        if self.phase != RunPhase::Started {
            return events;
        }
        events.push(ProtocolEvent::RunError {
            message: message.into(),
            code: code.into(),
        });
        events.push(self.run_finished());
        self.open_message_id = None;
        self.phase = RunPhase::Errored;
        events
    }

    fn push_text(&mut self, fragment: &str, events: &mut Vec<ProtocolEvent>) {
        if fragment.is_empty() {
            return;
        }
        let message_id = match &self.open_message_id {
            Some(message_id) => message_id.clone(),
            None => {
                self.message_count += 1;
                let message_id = format!("msg-{}-{}", self.id_epoch_ms, self.message_count);
                events.push(ProtocolEvent::TextMessageStart {
                    message_id: message_id.clone(),
                    role: AssistantRole::Assistant,
                });
                self.open_message_id = Some(message_id.clone());
                message_id
            }
        };
        events.push(ProtocolEvent::TextMessageContent {
            message_id,
            delta: fragment.to_string(),
        });
    }

    fn close_message(&mut self, events: &mut Vec<ProtocolEvent>) {
        if let Some(message_id) = self.open_message_id.take() {
            events.push(ProtocolEvent::TextMessageEnd { message_id });
        }
    }

    fn run_finished(&self) -> ProtocolEvent {
        ProtocolEvent::RunFinished {
            thread_id: self.thread_id.clone(),
            run_id: self.run_id.clone(),
        }
    }
}
