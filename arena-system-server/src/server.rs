//! HTTP surface of a system server: `/health`, `/generate`, `/prompt_support`.

use crate::batcher::{
    BatchError, BatcherHandle, BatchQueue, EnqueueError, PendingRequest, Phase,
};
use crate::model::ModelCapabilities;
use anyhow::Result;
use arena_common::{DetailedTextToMusicPrompt, GenerateResponseBody, PromptSupport};
use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::{oneshot, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Server-side deadline for a single generate request.
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            request_timeout: Duration::from_secs(170),
        }
    }
}

#[derive(Clone)]
pub struct ServerState {
    pub queue: BatchQueue,
    pub phase: Arc<RwLock<Phase>>,
    pub warm: Arc<Notify>,
    pub capabilities: ModelCapabilities,
    pub config: ServerConfig,
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
    code: String,
}

fn error_response(status: StatusCode, code: &str, detail: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            detail: detail.into(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct HealthQuery {
    #[serde(default)]
    warm: Option<u8>,
}

#[derive(Serialize)]
struct HealthBody {
    status: String,
}

async fn health(State(state): State<ServerState>, Query(query): Query<HealthQuery>) -> Response {
    let phase = state.phase.read().map(|p| *p).unwrap_or(Phase::Stopped);

    if query.warm == Some(1) && phase == Phase::Cold {
        state.warm.notify_one();
    }

    let body = Json(HealthBody {
        status: if phase == Phase::Ready {
            "ok".to_string()
        } else {
            phase.to_string()
        },
    });
    if phase == Phase::Ready {
        (StatusCode::OK, body).into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, body).into_response()
    }
}

#[derive(Serialize)]
struct PromptSupportBody {
    support: PromptSupport,
}

async fn prompt_support(
    State(state): State<ServerState>,
    Json(prompt): Json<DetailedTextToMusicPrompt>,
) -> Response {
    if let Err(e) = prompt.validate() {
        return error_response(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
    }
    Json(PromptSupportBody {
        support: state.capabilities.prompt_support(&prompt),
    })
    .into_response()
}

async fn generate(
    State(state): State<ServerState>,
    Json(prompt): Json<DetailedTextToMusicPrompt>,
) -> Response {
    if let Err(e) = prompt.validate() {
        return error_response(StatusCode::BAD_REQUEST, "validation_error", e.to_string());
    }
    if !state.capabilities.prompt_support(&prompt).is_supported() {
        return error_response(
            StatusCode::CONFLICT,
            "unsupported",
            "prompt is not supported by this system",
        );
    }
    match state.phase.read().map(|p| *p).unwrap_or(Phase::Stopped) {
        Phase::Draining | Phase::Stopped => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "draining",
                "server is shutting down",
            );
        }
        _ => {}
    }

    let seed = prompt.seed.unwrap_or_else(rand::random);
    let now = Instant::now();
    let deadline = now + state.config.request_timeout;
    let cancel = CancellationToken::new();
    // Cancels the queued request if this handler is dropped (client gone).
    let _cancel_guard = cancel.clone().drop_guard();
    let (reply, result) = oneshot::channel();

    let request = PendingRequest {
        prompt,
        seed,
        enqueued: now,
        deadline,
        cancel,
        reply,
    };
    match state.queue.try_enqueue(request) {
        Ok(()) => {}
        Err(EnqueueError::Full) => {
            let mut response = error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "busy",
                "batch queue is full",
            );
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            return response;
        }
        Err(EnqueueError::Closed) => {
            return error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "draining",
                "server is shutting down",
            );
        }
    }

    match tokio::time::timeout_at(deadline.into(), result).await {
        Ok(Ok(Ok(completed))) => Json(GenerateResponseBody::from_response(
            &completed.response,
            completed.telemetry,
        ))
        .into_response(),
        Ok(Ok(Err(BatchError::Timeout))) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "batch_timeout",
            "request expired in the batch queue",
        ),
        Ok(Ok(Err(BatchError::Draining))) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "draining",
            "server is shutting down",
        ),
        Ok(Ok(Err(BatchError::Model(detail)))) => {
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", detail)
        }
        Ok(Err(_closed)) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "internal_error",
            "batcher dropped the request",
        ),
        Err(_elapsed) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "batch_timeout",
            "request deadline exceeded",
        ),
    }
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/generate", post(generate))
        .route("/prompt_support", post(prompt_support))
        .with_state(state)
}

/// Serve until `shutdown` fires, then let the batcher drain and release.
pub async fn run_server(
    handle: BatcherHandle,
    config: ServerConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let state = ServerState {
        queue: handle.queue.clone(),
        phase: handle.phase.clone(),
        warm: handle.warm.clone(),
        capabilities: handle.capabilities,
        config: config.clone(),
    };
    let app = make_app(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("system server listening on port {}", config.port);

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await?;

    shutdown.cancel();
    if let Err(e) = handle.task.await {
        warn!("batcher task ended abnormally: {}", e);
    }
    Ok(())
}
