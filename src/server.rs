use crate::config::{ModelMap, ProxyConfig};
use crate::logging::{SharedLog, Stage};
use crate::proxy::{self, UpstreamOverrides};
use crate::translate::messages_types::{ErrorResponse, MessagesRequest};

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub const API_KEY_HEADER: &str = "x-openai-api-key";
pub const API_URL_HEADER: &str = "x-openai-api-url";

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub models: ModelMap,
    pub client: reqwest::Client,
    pub log: SharedLog,
}

impl AppState {
    pub fn new(
        config: ProxyConfig,
        client: reqwest::Client,
        log: SharedLog,
    ) -> crate::Result<Self> {
        let models = ModelMap::from_config(&config)?;
        Ok(Self {
            config,
            models,
            client,
            log,
        })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/v1/message", post(handle_messages))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/v1/log", get(handle_log))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn overrides_from_headers(headers: &HeaderMap) -> UpstreamOverrides {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    UpstreamOverrides {
        api_key: get(API_KEY_HEADER),
        base_url: get(API_URL_HEADER),
    }
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let req: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected malformed request");
            state
                .log
                .error(Stage::ClientRequest, format!("Failed to parse request: {}", e));
            let err = ErrorResponse::invalid_request(format!("Invalid request body: {}", e));
            return (StatusCode::BAD_REQUEST, Json(err)).into_response();
        }
    };

    let is_streaming = req.stream.unwrap_or(false);
    let overrides = overrides_from_headers(&headers);

    state.log.info(
        Stage::ClientRequest,
        format!(
            "Request: model={} streaming={} messages={}",
            req.model,
            is_streaming,
            req.messages.len()
        ),
    );

    if is_streaming {
        handle_streaming(state, &req, &overrides).await
    } else {
        handle_non_streaming(state, &req, &overrides).await
    }
}

fn proxy_error_response(state: &AppState, err: crate::ProxyError) -> Response {
    state.log.error(Stage::ClientResponse, format!("Proxy error: {}", err));
    match err {
        crate::ProxyError::Translate(ref e) if e.is_client_error() => {
            (StatusCode::BAD_REQUEST, Json(e.to_error_response())).into_response()
        }
        crate::ProxyError::Config { .. } => {
            let body = ErrorResponse::new("authentication_error", err.to_string());
            (StatusCode::UNAUTHORIZED, Json(body)).into_response()
        }
        other => {
            let body = ErrorResponse::api_error(format!("Proxy error: {}", other));
            (StatusCode::BAD_GATEWAY, Json(body)).into_response()
        }
    }
}

async fn handle_non_streaming(
    state: Arc<AppState>,
    req: &MessagesRequest,
    overrides: &UpstreamOverrides,
) -> Response {
    match proxy::proxy_non_streaming(req, &state, overrides).await {
        Ok(proxy::ProxyResult::Success(resp)) => Json(resp).into_response(),
        Ok(proxy::ProxyResult::Error(err, status_code)) => {
            let status = StatusCode::from_u16(status_code).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, Json(err)).into_response()
        }
        Err(e) => proxy_error_response(&state, e),
    }
}

async fn handle_streaming(
    state: Arc<AppState>,
    req: &MessagesRequest,
    overrides: &UpstreamOverrides,
) -> Response {
    let frames = match proxy::proxy_streaming(req, &state, overrides).await {
        Ok(s) => s,
        Err(e) => return proxy_error_response(&state, e),
    };

    let events = frames.map(|frame| -> std::result::Result<Event, Infallible> {
        let event = Event::default().data(frame.data);
        Ok(match frame.event {
            Some(name) => event.event(name),
            None => event,
        })
    });

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut names: Vec<&String> = state.config.models.keys().filter(|k| !k.contains('*')).collect();
    names.sort();
    let models: Vec<serde_json::Value> = names
        .into_iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "type": "model",
                "display_name": name,
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "has_more": false }))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    limit: Option<usize>,
}

async fn handle_log(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogQuery>,
) -> Json<serde_json::Value> {
    let entries = state.log.recent(query.limit.unwrap_or(100).min(1000));
    Json(serde_json::json!({ "entries": entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, "sk-test".parse().unwrap());
        headers.insert(API_URL_HEADER, " ".parse().unwrap());
        let overrides = overrides_from_headers(&headers);
        assert_eq!(overrides.api_key.as_deref(), Some("sk-test"));
        assert_eq!(overrides.base_url, None);
    }
}
