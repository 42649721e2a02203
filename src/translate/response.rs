use serde_json::{json, Value};

use super::messages_types::{
    ErrorBody, ErrorResponse, MessagesResponse, ResponseContentBlock, StopReason, Usage,
};
use super::responses_types::{
    FunctionCallItem, IncompleteDetails, InputTokensDetails, OutputContent,
    OutputItem, OutputMessage, OutputTokensDetails, ReasoningItem, ResponseError, ResponseStatus,
    ResponsesErrorBody, ResponsesErrorResponse, ResponsesResponse, ResponsesUsage, SummaryPart,
};
use crate::error::{TranslateError, TranslateResult};

/// Translate a completed OpenAI Responses payload into an Anthropic Messages response.
pub fn responses_to_messages(resp: &ResponsesResponse) -> TranslateResult<MessagesResponse> {
    let mut content: Vec<ResponseContentBlock> = Vec::new();

    for item in &resp.output {
        match item {
            OutputItem::Message(msg) => {
                for part in &msg.content {
                    match part {
                        OutputContent::OutputText { text, .. } => {
                            content.push(ResponseContentBlock::Text { text: text.clone() })
                        }
                        OutputContent::Refusal { refusal } => {
                            content.push(ResponseContentBlock::Text {
                                text: refusal.clone(),
                            })
                        }
                        OutputContent::Unknown => {}
                    }
                }
            }
            OutputItem::FunctionCall(call) => content.push(ResponseContentBlock::ToolUse {
                id: call.call_id.clone(),
                name: call.name.clone(),
                input: parse_arguments(&call.arguments),
            }),
            OutputItem::CustomToolCall(call) => content.push(ResponseContentBlock::ToolUse {
                id: call.call_id.clone(),
                name: call.name.clone(),
                input: json!({ "input": call.input }),
            }),
            OutputItem::Reasoning(reasoning) => {
                if let Some(block) = reasoning_to_block(reasoning) {
                    content.push(block);
                }
            }
            OutputItem::Unsupported { item_type, .. } => {
                return Err(TranslateError::unsupported(item_type.clone(), "response output"));
            }
        }
    }

    // Claude clients expect non-empty content
    if content.is_empty() {
        content.push(ResponseContentBlock::Text {
            text: String::new(),
        });
    }

    let stop_sequence = resp
        .metadata
        .as_ref()
        .and_then(|m| m.get("stop_sequence"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let ends_with_tool_call = resp.output.last().is_some_and(OutputItem::is_tool_call);
    let stop_reason = if stop_sequence.is_some() {
        StopReason::StopSequence
    } else {
        map_status(resp.incomplete_details.as_ref(), ends_with_tool_call)
    };

    Ok(MessagesResponse {
        id: message_id_from(&resp.id),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: resp.model.clone(),
        stop_reason: Some(stop_reason),
        stop_sequence,
        usage: resp.usage.as_ref().map_or_else(Usage::default, usage_to_messages),
    })
}

/// Translate an Anthropic Messages response into an OpenAI Responses payload.
pub fn messages_to_responses(resp: &MessagesResponse) -> ResponsesResponse {
    let mut output: Vec<OutputItem> = Vec::new();
    let mut pending_text: Vec<OutputContent> = Vec::new();

    let flush = |pending: &mut Vec<OutputContent>, output: &mut Vec<OutputItem>| {
        if !pending.is_empty() {
            output.push(OutputItem::Message(OutputMessage {
                id: new_item_id("msg"),
                role: "assistant".to_string(),
                status: Some("completed".to_string()),
                content: std::mem::take(pending),
            }));
        }
    };

    for block in &resp.content {
        match block {
            ResponseContentBlock::Text { text } => pending_text.push(OutputContent::OutputText {
                text: text.clone(),
                annotations: Vec::new(),
            }),
            ResponseContentBlock::ToolUse { id, name, input } => {
                flush(&mut pending_text, &mut output);
                output.push(OutputItem::FunctionCall(FunctionCallItem {
                    id: Some(new_item_id("fc")),
                    call_id: id.clone(),
                    name: name.clone(),
                    arguments: input.to_string(),
                    status: Some("completed".to_string()),
                }));
            }
            ResponseContentBlock::Thinking {
                thinking,
                signature,
            } => {
                flush(&mut pending_text, &mut output);
                output.push(OutputItem::Reasoning(ReasoningItem {
                    id: new_item_id("rs"),
                    summary: vec![SummaryPart {
                        text: thinking.clone(),
                    }],
                    encrypted_content: (!signature.is_empty()).then(|| signature.clone()),
                    content: None,
                }));
            }
            ResponseContentBlock::RedactedThinking { data } => {
                flush(&mut pending_text, &mut output);
                output.push(OutputItem::Reasoning(ReasoningItem {
                    id: new_item_id("rs"),
                    summary: Vec::new(),
                    encrypted_content: Some(data.clone()),
                    content: None,
                }));
            }
            ResponseContentBlock::Unknown => {
                tracing::debug!("Skipping content block with no Responses counterpart");
            }
        }
    }
    flush(&mut pending_text, &mut output);

    let (status, incomplete_details) = map_stop_reason(resp.stop_reason);
    let metadata = resp
        .stop_sequence
        .as_ref()
        .map(|s| [("stop_sequence".to_string(), Value::String(s.clone()))].into_iter().collect());

    ResponsesResponse {
        id: response_id_from(&resp.id),
        object: "response".to_string(),
        created_at: chrono::Utc::now().timestamp(),
        status,
        model: resp.model.clone(),
        output,
        usage: Some(usage_to_responses(&resp.usage)),
        incomplete_details,
        error: None,
        metadata,
    }
}

fn reasoning_to_block(reasoning: &ReasoningItem) -> Option<ResponseContentBlock> {
    let mut texts: Vec<&str> = reasoning.summary.iter().map(|s| s.text.as_str()).collect();
    if texts.is_empty() {
        if let Some(ref content) = reasoning.content {
            texts = content.iter().map(|c| c.text.as_str()).collect();
        }
    }

    if texts.is_empty() {
        return reasoning
            .encrypted_content
            .as_ref()
            .map(|data| ResponseContentBlock::RedactedThinking { data: data.clone() });
    }

    Some(ResponseContentBlock::Thinking {
        thinking: texts.join("\n\n"),
        signature: reasoning.encrypted_content.clone().unwrap_or_default(),
    })
}

/// Tool arguments that are not a JSON object are kept verbatim under `_raw`.
pub fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return json!({});
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(v @ Value::Object(_)) => v,
        _ => json!({ "_raw": arguments }),
    }
}

/// Map a Responses completion state to an Anthropic stop_reason.
pub fn map_status(incomplete: Option<&IncompleteDetails>, ends_with_tool_call: bool) -> StopReason {
    match incomplete.map(|d| d.reason.as_str()) {
        Some("max_output_tokens") | Some("max_tokens") => StopReason::MaxTokens,
        Some("content_filter") => StopReason::Refusal,
        _ if ends_with_tool_call => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

/// Map an Anthropic stop_reason to a Responses status and incomplete reason.
pub fn map_stop_reason(reason: Option<StopReason>) -> (ResponseStatus, Option<IncompleteDetails>) {
    let incomplete = |reason: &str| {
        (
            ResponseStatus::Incomplete,
            Some(IncompleteDetails {
                reason: reason.to_string(),
            }),
        )
    };
    match reason {
        Some(StopReason::MaxTokens) => incomplete("max_output_tokens"),
        Some(StopReason::Refusal) => incomplete("content_filter"),
        Some(StopReason::EndTurn)
        | Some(StopReason::PauseTurn)
        | Some(StopReason::ToolUse)
        | Some(StopReason::StopSequence)
        | Some(StopReason::Other)
        | None => (ResponseStatus::Completed, None),
    }
}

/// Responses counts cached tokens inside `input_tokens`; Anthropic reports them separately.
pub fn usage_to_messages(usage: &ResponsesUsage) -> Usage {
    let cached = usage.cached_tokens();
    Usage {
        input_tokens: usage.input_tokens.saturating_sub(cached),
        output_tokens: usage.output_tokens,
        cache_creation_input_tokens: None,
        cache_read_input_tokens: (cached > 0).then_some(cached),
    }
}

pub fn usage_to_responses(usage: &Usage) -> ResponsesUsage {
    let cache_read = usage.cache_read_input_tokens.unwrap_or(0);
    let input_tokens =
        usage.input_tokens + cache_read + usage.cache_creation_input_tokens.unwrap_or(0);
    ResponsesUsage {
        input_tokens,
        output_tokens: usage.output_tokens,
        total_tokens: input_tokens + usage.output_tokens,
        input_tokens_details: Some(InputTokensDetails {
            cached_tokens: cache_read,
        }),
        output_tokens_details: Some(OutputTokensDetails::default()),
    }
}

/// Translate an OpenAI error body into an Anthropic error response.
pub fn responses_error_to_messages(err: &ResponsesErrorResponse, status: u16) -> ErrorResponse {
    let kind = err
        .error
        .error_type
        .as_deref()
        .or(err.error.code.as_deref())
        .unwrap_or("");
    let error_type = match (kind, status) {
        ("invalid_request_error", _) => "invalid_request_error",
        ("rate_limit_error" | "rate_limit_exceeded" | "insufficient_quota", _) | (_, 429) => {
            "rate_limit_error"
        }
        ("authentication_error" | "invalid_api_key", _) | (_, 401) => "authentication_error",
        (_, 403) => "permission_error",
        (_, 404) => "not_found_error",
        (_, 400 | 422) => "invalid_request_error",
        (_, 503 | 529) => "overloaded_error",
        _ => "api_error",
    };

    ErrorResponse::new(error_type, &err.error.message)
}

/// Translate an Anthropic error response into an OpenAI error body.
pub fn messages_error_to_responses(err: &ErrorResponse) -> ResponsesErrorResponse {
    let error_type = match err.error.error_type.as_str() {
        "api_error" | "overloaded_error" => "server_error",
        other => other,
    };
    ResponsesErrorResponse {
        error: ResponsesErrorBody {
            error_type: Some(error_type.to_string()),
            code: None,
            message: err.error.message.clone(),
            param: None,
        },
    }
}

/// Error body for a `failed` response (or `response.failed` event).
pub fn failure_to_error(error: Option<&ResponseError>) -> ErrorBody {
    let message = error
        .map(|e| match e.code {
            Some(ref code) => format!("{}: {}", code, e.message),
            None => e.message.clone(),
        })
        .unwrap_or_else(|| "upstream response failed".to_string());
    ErrorBody {
        error_type: "api_error".to_string(),
        message,
    }
}

pub fn message_id_from(response_id: &str) -> String {
    if response_id.is_empty() {
        return new_item_id("msg");
    }
    format!("msg_{}", response_id.trim_start_matches("resp_"))
}

pub fn response_id_from(message_id: &str) -> String {
    if message_id.is_empty() {
        return new_item_id("resp");
    }
    format!("resp_{}", message_id.trim_start_matches("msg_"))
}

pub(crate) fn new_item_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4().simple())
}
