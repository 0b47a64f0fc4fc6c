//! Request translation helpers converting `RunAgentInput` bodies into provider history.

use agui_ai::Message;

use super::types::{RunAgentInput, RunAgentMessage};
use super::*;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct AgentRunRequest {
    pub(super) thread_id: String,
    pub(super) run_id: String,
    pub(super) history: Vec<Message>,
}

pub(super) async fn read_run_agent_input(
    body: Body,
    max_body_bytes: usize,
) -> Result<RunAgentInput, ApiError> {
    let bytes = axum::body::to_bytes(body, max_body_bytes)
        .await
        .map_err(|error| {
            ApiError::payload_too_large(format!(
                "request body could not be read within the {max_body_bytes} byte limit: {error}"
            ))
        })?;
    serde_json::from_slice::<RunAgentInput>(&bytes).map_err(|error| {
        ApiError::bad_request(
            "malformed_json",
            format!("failed to parse request body: {error}"),
        )
    })
}

pub(super) fn translate_run_agent_input(
    input: RunAgentInput,
) -> Result<AgentRunRequest, ApiError> {
    let thread_id = required_identifier(input.thread_id, "thread_id")?;
    let run_id = required_identifier(input.run_id, "run_id")?;

    let messages = input.messages.unwrap_or_default();
    if messages.is_empty() {
        return Err(ApiError::bad_request(
            "missing_messages",
            "messages must contain at least one message",
        ));
    }

    let ignored = [
        ("state", input.state.is_some()),
        ("tools", input.tools.is_some()),
        ("context", input.context.is_some()),
        ("forwardedProps", input.forwarded_props.is_some()),
    ]
    .into_iter()
    .filter_map(|(field, present)| present.then_some(field))
    .collect::<Vec<_>>();
    if !ignored.is_empty() {
        tracing::debug!(%thread_id, %run_id, ?ignored, "ignoring unsupported run input fields");
    }

    let history = messages
        .into_iter()
        .enumerate()
        .map(|(index, message)| translate_message(index, message))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(AgentRunRequest {
        thread_id,
        run_id,
        history,
    })
}

fn required_identifier(value: Option<String>, field: &'static str) -> Result<String, ApiError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(ApiError::bad_request(
            "invalid_identifier",
            format!("{field} must not be empty"),
        )),
        None => Err(ApiError::bad_request(
            "missing_identifier",
            format!("{field} is required"),
        )),
    }
}

fn translate_message(index: usize, message: RunAgentMessage) -> Result<Message, ApiError> {
    match message.role.trim() {
        "user" => Ok(Message::user(message.content)),
        "assistant" => Ok(Message::assistant_text(message.content)),
        other => Err(ApiError::bad_request(
            "unsupported_role",
            format!(
                "messages[{index}]{} has unsupported role '{other}' (expected user or assistant)",
                message
                    .id
                    .as_deref()
                    .map(|id| format!(" (id {id})"))
                    .unwrap_or_default()
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use agui_ai::{Message, MessageRole};
    use serde_json::json;

    use super::translate_run_agent_input;
    use crate::agui_server::types::RunAgentInput;

    fn input(value: serde_json::Value) -> RunAgentInput {
        serde_json::from_value(value).expect("valid run input")
    }

    #[test]
    fn translates_roles_in_order() {
        let request = translate_run_agent_input(input(json!({
            "thread_id": "t1",
            "run_id": "r1",
            "messages": [
                {"id": "m1", "role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "what time is it?"}
            ],
            "forwardedProps": {"ui": true}
        })))
        .expect("translate");
        assert_eq!(request.thread_id, "t1");
        assert_eq!(request.run_id, "r1");
        let roles: Vec<MessageRole> = request.history.iter().map(|message| message.role).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::User]
        );
        assert_eq!(request.history[2], Message::user("what time is it?"));
    }

    #[test]
    fn rejects_missing_and_blank_identifiers() {
        let error = translate_run_agent_input(input(json!({
            "run_id": "r1",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .expect_err("missing thread id");
        assert_eq!(error.code, "missing_identifier");
        assert!(error.message.contains("thread_id"));

        let error = translate_run_agent_input(input(json!({
            "thread_id": "t1",
            "run_id": "  ",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .expect_err("blank run id");
        assert_eq!(error.code, "invalid_identifier");
    }

    #[test]
    fn rejects_empty_messages_and_unknown_roles() {
        let error = translate_run_agent_input(input(json!({
            "thread_id": "t1",
            "run_id": "r1",
            "messages": []
        })))
        .expect_err("empty messages");
        assert_eq!(error.code, "missing_messages");

        let error = translate_run_agent_input(input(json!({
            "thread_id": "t1",
            "run_id": "r1",
            "messages": [{"id": "m9", "role": "system", "content": "obey"}]
        })))
        .expect_err("system role");
        assert_eq!(error.code, "unsupported_role");
        assert!(error.message.contains("messages[0] (id m9)"));
    }
}
