//! Route handlers and app construction for the gateway.

use super::error::ApiError;
use super::state::ServerState;
use crate::battle::{BattleGenerator, BattlePromptRequest};
use crate::config::GatewayConfig;
use crate::prebaked::PrebakedPrompts;
use crate::store::StoreError;
use anyhow::Result;
use arena_common::{
    BattleRecord, DetailedTextToMusicPrompt, Session, SystemKey, SystemMetadata, User, Vote,
};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct GenerateBattleRequest {
    pub session: Session,
    pub user: User,
    pub prompt: BattlePromptRequest,
}

/// The anonymized battle returned to the frontend.
#[derive(Debug, Serialize)]
pub struct BattleResponse {
    pub uuid: Uuid,
    pub a_audio_url: String,
    pub b_audio_url: String,
    pub a_metadata: SystemMetadata,
    pub b_metadata: SystemMetadata,
    pub prompt_detailed: DetailedTextToMusicPrompt,
}

impl BattleResponse {
    /// Build the pre-vote view: audio URLs plus fully redacted metadata.
    fn redacted(record: &BattleRecord) -> Self {
        Self {
            uuid: record.uuid,
            a_audio_url: record.a_audio_uri.clone(),
            b_audio_url: record.b_audio_uri.clone(),
            a_metadata: SystemMetadata::redacted(),
            b_metadata: SystemMetadata::redacted(),
            prompt_detailed: record.prompt_detailed.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RecordVoteRequest {
    pub session: Session,
    pub user: User,
    pub battle_uuid: Uuid,
    pub vote: Vote,
}

/// The de-anonymized reveal returned after a vote lands.
#[derive(Debug, Serialize)]
pub struct VoteResponse {
    pub acknowledged: bool,
    pub winner: Option<SystemKey>,
    pub a_metadata: SystemMetadata,
    pub b_metadata: SystemMetadata,
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    uptime_secs: u64,
}

async fn health(State(state): State<ServerState>) -> Json<HealthBody> {
    Json(HealthBody {
        status: "ok",
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

async fn systems(State(battles): State<Arc<BattleGenerator>>) -> Json<Vec<(String, String)>> {
    Json(
        battles
            .systems()
            .iter()
            .map(|key| (key.system_tag.clone(), key.variant_tag.clone()))
            .collect(),
    )
}

async fn prebaked(
    State(prebaked): State<Arc<PrebakedPrompts>>,
) -> Json<BTreeMap<String, DetailedTextToMusicPrompt>> {
    Json(prebaked.map().clone())
}

async fn serve_audio(
    State(state): State<ServerState>,
    Path((battle, file)): Path<(String, String)>,
) -> Response {
    let key = format!("{}/{}", battle, file);
    match state.blobs.get(&key).await {
        Ok(bytes) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "audio/wav")],
            bytes,
        )
            .into_response(),
        Err(StoreError::NotFound(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!("audio fetch failed for {}: {}", key, e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn validate_session(session: &Session) -> Result<(), ApiError> {
    if !session.ack_tos {
        return Err(ApiError::bad_request(
            "session has not acknowledged the terms of service",
        ));
    }
    Ok(())
}

async fn generate_battle(
    State(state): State<ServerState>,
    Json(request): Json<GenerateBattleRequest>,
) -> Result<Json<BattleResponse>, ApiError> {
    validate_session(&request.session)?;
    if request.user.is_anonymous() {
        warn!("battle request carries no user tracking information");
    }

    // Test-mode fault injection to exercise client retry paths.
    if state.config.flakiness > 0.0 && rand::random::<f64>() < state.config.flakiness {
        warn!("injecting flaky error on /generate_battle");
        return Err(ApiError::internal("flaky error"));
    }

    let record = state
        .battles
        .generate_battle(request.session, request.user, request.prompt)
        .await?;
    Ok(Json(BattleResponse::redacted(&record)))
}

async fn record_vote(
    State(state): State<ServerState>,
    Json(request): Json<RecordVoteRequest>,
) -> Result<Json<VoteResponse>, ApiError> {
    validate_session(&request.session)?;

    let record = state
        .battles
        .record_vote(
            request.battle_uuid,
            request.session,
            request.user,
            request.vote,
        )
        .await?;
    Ok(Json(VoteResponse {
        acknowledged: true,
        winner: record.winner().cloned(),
        a_metadata: record.a_metadata,
        b_metadata: record.b_metadata,
    }))
}

pub fn make_app(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/systems", get(systems))
        .route("/prebaked", get(prebaked))
        .route("/audio/{battle}/{file}", get(serve_audio))
        .route("/generate_battle", post(generate_battle))
        .route("/record_vote", post(record_vote))
        .with_state(state)
}

pub async fn run_server(state: ServerState, config: &GatewayConfig) -> Result<()> {
    let app = make_app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("gateway listening on port {}", config.port);
    Ok(axum::serve(listener, app).await?)
}
