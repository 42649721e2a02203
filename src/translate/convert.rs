//! JSON-level entry points: detect the shape of a payload and translate it
//! in the requested direction.
//!
//! These are what the CLI and the proxy call. A payload that already has the
//! target shape is returned unchanged.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{TranslateError, TranslateResult};
use crate::translate::messages_types::{ErrorResponse, MessagesRequest, MessagesResponse};
use crate::translate::responses_types::{
    ResponseStatus, ResponsesErrorResponse, ResponsesRequest, ResponsesResponse,
};
use crate::translate::{request, response, ConvertOptions, Direction, Protocol};

pub use crate::translate::streaming::stream_convert;

/// Guess which protocol a request body belongs to.
pub fn detect_request_protocol(payload: &Value) -> Option<Protocol> {
    let obj = payload.as_object()?;
    if obj.get("messages").is_some_and(Value::is_array) {
        Some(Protocol::Messages)
    } else if obj.contains_key("input")
        || obj.contains_key("instructions")
        || obj.contains_key("max_output_tokens")
        || obj.contains_key("previous_response_id")
    {
        Some(Protocol::Responses)
    } else {
        None
    }
}

/// Guess which protocol a response body (or error body) belongs to.
pub fn detect_response_protocol(payload: &Value) -> Option<Protocol> {
    let obj = payload.as_object()?;
    match obj.get("type").and_then(Value::as_str) {
        Some("message") | Some("error") => return Some(Protocol::Messages),
        _ => {}
    }
    if obj.get("object").and_then(Value::as_str) == Some("response")
        || obj.get("output").is_some_and(Value::is_array)
        || obj.get("error").is_some_and(Value::is_object)
    {
        Some(Protocol::Responses)
    } else if obj.get("content").is_some_and(Value::is_array) && obj.contains_key("role") {
        Some(Protocol::Messages)
    } else {
        None
    }
}

/// Guess which protocol a single stream event belongs to.
pub fn detect_event_protocol(payload: &Value) -> Option<Protocol> {
    let kind = payload.get("type")?.as_str()?;
    if kind.starts_with("response.") {
        return Some(Protocol::Responses);
    }
    match kind {
        // Both protocols name their error event "error"; Messages nests the body.
        "error" if payload.get("error").is_some_and(Value::is_object) => Some(Protocol::Messages),
        "error" => Some(Protocol::Responses),
        "message_start" | "content_block_start" | "content_block_delta" | "content_block_stop"
        | "message_delta" | "message_stop" | "ping" => Some(Protocol::Messages),
        _ => None,
    }
}

/// Translate a request body.
pub fn request_convert(
    direction: Direction,
    payload: &Value,
    opts: &ConvertOptions,
) -> TranslateResult<Value> {
    if detect_request_protocol(payload) == Some(direction.target()) {
        tracing::debug!(%direction, "Request already in target shape; passing through");
        return Ok(payload.clone());
    }

    match direction {
        Direction::ResponsesToMessages => {
            let req: ResponsesRequest = parse(payload, "request")?;
            let mut converted = request::responses_to_messages(&req, opts)?;
            if let Some(ref model) = opts.model {
                converted.model = model.clone();
            }
            to_value(&converted)
        }
        Direction::MessagesToResponses => {
            let req: MessagesRequest = parse(payload, "request")?;
            let mut converted = request::messages_to_responses(&req)?;
            if let Some(ref model) = opts.model {
                converted.model = model.clone();
            }
            to_value(&converted)
        }
    }
}

/// Translate a completed (non-streaming) response body, including error bodies.
pub fn response_convert(
    direction: Direction,
    payload: &Value,
    opts: &ConvertOptions,
) -> TranslateResult<Value> {
    if detect_response_protocol(payload) == Some(direction.target()) {
        tracing::debug!(%direction, "Response already in target shape; passing through");
        return Ok(payload.clone());
    }

    match direction {
        Direction::ResponsesToMessages => {
            if is_responses_error(payload) {
                let err: ResponsesErrorResponse = parse(payload, "error")?;
                return to_value(&response::responses_error_to_messages(&err, 0));
            }
            let resp: ResponsesResponse = parse(payload, "response")?;
            if resp.status == ResponseStatus::Failed {
                return to_value(&ErrorResponse {
                    error_type: "error".to_string(),
                    error: response::failure_to_error(resp.error.as_ref()),
                });
            }
            let mut converted = response::responses_to_messages(&resp)?;
            if let Some(ref model) = opts.model {
                converted.model = model.clone();
            }
            if let Some(ref id) = opts.message_id {
                converted.id = id.clone();
            }
            to_value(&converted)
        }
        Direction::MessagesToResponses => {
            if payload.get("type").and_then(Value::as_str) == Some("error") {
                let err: ErrorResponse = parse(payload, "error")?;
                return to_value(&response::messages_error_to_responses(&err));
            }
            let resp: MessagesResponse = parse(payload, "response")?;
            let mut converted = response::messages_to_responses(&resp);
            if let Some(ref model) = opts.model {
                converted.model = model.clone();
            }
            to_value(&converted)
        }
    }
}

fn is_responses_error(payload: &Value) -> bool {
    payload.get("error").is_some_and(Value::is_object) && payload.get("output").is_none()
}

fn parse<T: DeserializeOwned>(payload: &Value, field: &str) -> TranslateResult<T> {
    T::deserialize(payload).map_err(|e| TranslateError::schema(field, e.to_string()))
}

fn to_value<T: Serialize>(value: &T) -> TranslateResult<Value> {
    serde_json::to_value(value).map_err(|e| TranslateError::schema("output", e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detects_protocols() {
        assert_eq!(
            detect_request_protocol(&json!({"model": "m", "max_tokens": 5, "messages": []})),
            Some(Protocol::Messages)
        );
        assert_eq!(
            detect_request_protocol(&json!({"model": "m", "input": "hi"})),
            Some(Protocol::Responses)
        );
        assert_eq!(detect_request_protocol(&json!({"model": "m"})), None);

        assert_eq!(
            detect_response_protocol(&json!({"object": "response", "output": []})),
            Some(Protocol::Responses)
        );
        assert_eq!(
            detect_response_protocol(&json!({"type": "message", "content": []})),
            Some(Protocol::Messages)
        );
        assert_eq!(
            detect_event_protocol(&json!({"type": "error", "error": {"type": "api_error"}})),
            Some(Protocol::Messages)
        );
        assert_eq!(
            detect_event_protocol(&json!({"type": "response.output_text.delta"})),
            Some(Protocol::Responses)
        );
    }

    #[test]
    fn test_request_convert_passes_through_target_shape() {
        let payload = json!({"model": "claude", "max_tokens": 10,
                             "messages": [{"role": "user", "content": "hi"}]});
        let out = request_convert(
            Direction::ResponsesToMessages,
            &payload,
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn test_request_convert_responses_to_messages() {
        let payload = json!({"model": "gpt-4.1", "instructions": "Be brief.",
                             "input": "hello", "max_output_tokens": 64});
        let out = request_convert(
            Direction::ResponsesToMessages,
            &payload,
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out["max_tokens"], 64);
        assert_eq!(out["system"], "Be brief.");
        assert_eq!(out["messages"][0]["role"], "user");
    }

    #[test]
    fn test_request_convert_reports_schema_violation() {
        let payload = json!({"model": "claude", "max_tokens": "many", "messages": []});
        let err = request_convert(
            Direction::MessagesToResponses,
            &payload,
            &ConvertOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, TranslateError::SchemaViolation { .. }));
    }

    #[test]
    fn test_response_convert_failed_response_becomes_error() {
        let payload = json!({"id": "resp_1", "object": "response", "status": "failed", "output": [],
                             "error": {"code": "server_error", "message": "upstream broke"}});
        let out = response_convert(
            Direction::ResponsesToMessages,
            &payload,
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out["type"], "error");
        assert_eq!(out["error"]["type"], "api_error");
        assert_eq!(out["error"]["message"], "server_error: upstream broke");
    }

    #[test]
    fn test_request_convert_applies_model_override_both_ways() {
        let opts = ConvertOptions {
            model: Some("target-model".to_string()),
            default_max_tokens: Some(128),
            ..ConvertOptions::default()
        };
        let responses = json!({"model": "gpt-4.1", "input": "hi"});
        let out = request_convert(Direction::ResponsesToMessages, &responses, &opts).unwrap();
        assert_eq!(out["model"], "target-model");
        assert_eq!(out["max_tokens"], 128);

        let messages = json!({"model": "claude", "max_tokens": 10,
                              "messages": [{"role": "user", "content": "hi"}]});
        let out = request_convert(Direction::MessagesToResponses, &messages, &opts).unwrap();
        assert_eq!(out["model"], "target-model");
    }

    #[test]
    fn test_response_convert_error_bodies() {
        let openai = json!({"error": {"type": "invalid_request_error", "message": "bad"}});
        let out = response_convert(
            Direction::ResponsesToMessages,
            &openai,
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out["error"]["type"], "invalid_request_error");

        let anthropic = json!({"type": "error", "error": {"type": "overloaded_error", "message": "busy"}});
        let out = response_convert(
            Direction::MessagesToResponses,
            &anthropic,
            &ConvertOptions::default(),
        )
        .unwrap();
        assert_eq!(out["error"]["type"], "server_error");
        assert_eq!(out["error"]["message"], "busy");
    }

    #[test]
    fn test_response_convert_overrides_model() {
        let payload = json!({"id": "resp_9", "object": "response", "status": "completed", "model": "gpt-4.1",
                             "output": [{"type": "message", "id": "msg_1", "role": "assistant",
                                         "content": [{"type": "output_text", "text": "ok"}]}]});
        let opts = ConvertOptions {
            model: Some("claude-sonnet-4".to_string()),
            ..ConvertOptions::default()
        };
        let out = response_convert(Direction::ResponsesToMessages, &payload, &opts).unwrap();
        assert_eq!(out["model"], "claude-sonnet-4");
        assert_eq!(out["content"][0]["text"], "ok");
        assert_eq!(out["stop_reason"], "end_turn");
    }
}
