use crate::config::responses_url;
use crate::error::{ProxyError, Result, TranslateError};
use crate::logging::Stage;
use crate::server::AppState;
use crate::translate::messages_types::{ErrorResponse, MessagesRequest, MessagesResponse};
use crate::translate::request::messages_to_responses;
use crate::translate::response::{
    failure_to_error, responses_error_to_messages, responses_to_messages,
};
use crate::translate::responses_types::{
    ResponseStatus, ResponsesErrorResponse, ResponsesResponse, ResponsesStreamEvent,
};
use crate::translate::sse::{decode_byte_stream, SseFrame};
use crate::translate::streaming::stream_convert;
use crate::translate::{ConvertOptions, Direction};

use futures::stream::{self, Stream};
use futures::StreamExt;
use serde_json::{Map, Value};
use std::pin::Pin;

/// Outcome of proxying a non-streaming request
pub enum ProxyResult {
    Success(MessagesResponse),
    Error(ErrorResponse, u16),
}

/// Anthropic SSE frames for the client.
pub type SseStream = Pin<Box<dyn Stream<Item = SseFrame> + Send>>;

/// Per-request overrides taken from `x-openai-api-key` / `x-openai-api-url`.
#[derive(Debug, Clone, Default)]
pub struct UpstreamOverrides {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

/// Where and how to reach the Responses endpoint for one request.
#[derive(Debug, Clone)]
pub struct UpstreamTarget {
    pub url: String,
    pub api_key: String,
}

impl UpstreamTarget {
    pub fn resolve(state: &AppState, overrides: &UpstreamOverrides) -> Result<Self> {
        let api_key = match overrides.api_key {
            Some(ref key) if !key.is_empty() => key.clone(),
            _ => state.config.resolve_api_key()?,
        };
        let url = match overrides.base_url {
            Some(ref base) if !base.is_empty() => responses_url(base),
            _ => state.config.responses_url(),
        };
        Ok(Self { url, api_key })
    }
}

/// Translate the client request into the upstream JSON body.
pub fn build_upstream_body(req: &MessagesRequest, state: &AppState, stream: bool) -> Result<Value> {
    let mut translated = messages_to_responses(req)?;
    let resolved = state.models.resolve(&req.model);
    translated.model = resolved.model;
    translated.stream = Some(stream);

    let mut body = serde_json::to_value(&translated)?;
    deep_merge(&mut body, &resolved.extra);
    if let Value::Object(ref mut map) = body {
        for key in &state.config.params.drop {
            map.remove(key);
        }
    }
    Ok(body)
}

/// Merge `extra` into `target`; nested objects merge, everything else replaces.
pub fn deep_merge(target: &mut Value, extra: &Map<String, Value>) {
    let Value::Object(map) = target else {
        return;
    };
    for (key, value) in extra {
        let nested = matches!((map.get(key), value), (Some(Value::Object(_)), Value::Object(_)));
        if !nested {
            map.insert(key.clone(), value.clone());
        } else if let (Some(existing), Value::Object(inner)) = (map.get_mut(key), value) {
            deep_merge(existing, inner);
        }
    }
}

fn new_request_id() -> String {
    format!("req_{}", uuid::Uuid::new_v4().simple())
}

async fn send(
    state: &AppState,
    target: &UpstreamTarget,
    body: &Value,
    request_id: &str,
) -> Result<reqwest::Response> {
    let model = body.get("model").and_then(Value::as_str).unwrap_or_default();
    tracing::info!(url = %target.url, model, request_id, "POST upstream");
    state
        .log
        .info(Stage::UpstreamRequest, format!("POST {} model={}", target.url, model));
    state
        .log
        .payload(Stage::UpstreamRequest, request_id, "upstream request", body);

    state
        .client
        .post(&target.url)
        .header("Authorization", format!("Bearer {}", target.api_key))
        .header("Content-Type", "application/json")
        .json(body)
        .send()
        .await
        .map_err(|e| ProxyError::provider(format!("Request failed: {}", e)))
}

/// Map an upstream HTTP error body to an Anthropic error.
fn upstream_error(status: u16, body: &str) -> ErrorResponse {
    match serde_json::from_str::<ResponsesErrorResponse>(body) {
        Ok(err) => responses_error_to_messages(&err, status),
        Err(_) => responses_error_to_messages(
            &ResponsesErrorResponse {
                error: crate::translate::responses_types::ResponsesErrorBody {
                    error_type: None,
                    code: None,
                    message: format!(
                        "Provider returned status {}: {}",
                        status,
                        truncate(body, 500)
                    ),
                    param: None,
                },
            },
            status,
        ),
    }
}

/// Forward a non-streaming Messages request through the Responses endpoint.
pub async fn proxy_non_streaming(
    req: &MessagesRequest,
    state: &AppState,
    overrides: &UpstreamOverrides,
) -> Result<ProxyResult> {
    let request_id = new_request_id();
    let target = UpstreamTarget::resolve(state, overrides)?;
    let force_stream = state.config.upstream.force_stream;
    let body = build_upstream_body(req, state, force_stream)?;

    let response = send(state, &target, &body, &request_id).await?;
    let status = response.status().as_u16();

    if status >= 400 {
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(status, "Upstream returned an error");
        state
            .log
            .warn(
                Stage::UpstreamResponse,
                format!("status={} body={}", status, truncate(&text, 300)),
            );
        return Ok(ProxyResult::Error(upstream_error(status, &text), status));
    }

    let upstream: ResponsesResponse = if force_stream {
        collect_final_response(decode_byte_stream(response.bytes_stream())).await?
    } else {
        let text = response
            .text()
            .await
            .map_err(|e| ProxyError::provider(format!("Failed to read response body: {}", e)))?;
        serde_json::from_str(&text).map_err(|e| {
            ProxyError::provider(format!(
                "Failed to parse provider response: {}. Body: {}",
                e,
                truncate(&text, 300)
            ))
        })?
    };

    if let Ok(raw) = serde_json::to_value(&upstream) {
        state
            .log
            .payload(Stage::UpstreamResponse, &request_id, "upstream response", &raw);
    }

    if upstream.status == ResponseStatus::Failed {
        let error = failure_to_error(upstream.error.as_ref());
        state.log.warn(Stage::UpstreamResponse, format!("Response failed: {}", error.message));
        return Ok(ProxyResult::Error(
            ErrorResponse {
                error_type: "error".to_string(),
                error,
            },
            502,
        ));
    }

    let mut translated = responses_to_messages(&upstream)?;
    translated.model = req.model.clone();

    state.log.info(
        Stage::ClientResponse,
        format!(
            "Completed: in={} out={} tokens stop={:?}",
            translated.usage.input_tokens, translated.usage.output_tokens, translated.stop_reason
        ),
    );

    Ok(ProxyResult::Success(translated))
}

/// Read a Responses event stream until its terminal event and return the
/// final response it carries.
pub async fn collect_final_response<S>(frames: S) -> Result<ResponsesResponse>
where
    S: Stream<Item = std::result::Result<SseFrame, TranslateError>>,
{
    futures::pin_mut!(frames);
    while let Some(frame) = frames.next().await {
        let frame = frame?;
        if frame.is_done() {
            break;
        }
        let Ok(payload) = frame.payload() else {
            continue;
        };
        match serde_json::from_value::<ResponsesStreamEvent>(payload) {
            Ok(ResponsesStreamEvent::Completed { response, .. })
            | Ok(ResponsesStreamEvent::Incomplete { response, .. })
            | Ok(ResponsesStreamEvent::Failed { response, .. }) => return Ok(response),
            Ok(ResponsesStreamEvent::Error { message, .. }) => {
                return Err(ProxyError::provider(format!("Upstream stream error: {}", message)));
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(error = %e, "Skipping unparseable event"),
        }
    }
    Err(TranslateError::interrupted("upstream stream ended without a terminal event").into())
}

/// Forward a streaming Messages request; the reply is a stream of Anthropic SSE frames.
pub async fn proxy_streaming(
    req: &MessagesRequest,
    state: &AppState,
    overrides: &UpstreamOverrides,
) -> Result<SseStream> {
    let request_id = new_request_id();
    let target = UpstreamTarget::resolve(state, overrides)?;
    let body = build_upstream_body(req, state, true)?;

    let response = send(state, &target, &body, &request_id).await?;
    let status = response.status().as_u16();

    if status >= 400 {
        let text = response.text().await.unwrap_or_default();
        tracing::warn!(status, "Upstream returned an error for a streaming request");
        state
            .log
            .warn(
                Stage::Stream,
                format!("Streaming error status={}: {}", status, truncate(&text, 300)),
            );
        let frame = SseFrame::json("error", &upstream_error(status, &text))?;
        return Ok(Box::pin(stream::once(async move { frame })));
    }

    let opts = ConvertOptions {
        model: Some(req.model.clone()),
        ..ConvertOptions::default()
    };
    let frames = stream_convert(
        Direction::ResponsesToMessages,
        decode_byte_stream(response.bytes_stream()),
        opts,
    );

    let log = state.log.clone();
    let summarized = async_stream::stream! {
        futures::pin_mut!(frames);
        let mut count = 0usize;
        let mut errored = false;
        while let Some(frame) = frames.next().await {
            count += 1;
            errored |= frame.event.as_deref() == Some("error");
            yield frame;
        }
        if errored {
            log.warn(
                Stage::Stream,
                format!("Stream {} ended with an error after {} events", request_id, count),
            );
        } else {
            log.info(Stage::Stream, format!("Stream {} completed: {} events", request_id, count));
        }
    };

    Ok(Box::pin(summarized))
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
