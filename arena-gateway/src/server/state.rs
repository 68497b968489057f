//! Shared state threaded through the gateway's axum handlers.

use crate::battle::BattleGenerator;
use crate::config::GatewayConfig;
use crate::prebaked::PrebakedPrompts;
use crate::store::BlobStore;
use axum::extract::FromRef;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct ServerState {
    pub battles: Arc<BattleGenerator>,
    pub blobs: Arc<dyn BlobStore>,
    pub prebaked: Arc<PrebakedPrompts>,
    pub config: GatewayConfig,
    pub start_time: Instant,
}

impl FromRef<ServerState> for Arc<BattleGenerator> {
    fn from_ref(input: &ServerState) -> Self {
        input.battles.clone()
    }
}

impl FromRef<ServerState> for Arc<PrebakedPrompts> {
    fn from_ref(input: &ServerState) -> Self {
        input.prebaked.clone()
    }
}

impl FromRef<ServerState> for GatewayConfig {
    fn from_ref(input: &ServerState) -> Self {
        input.config.clone()
    }
}
