//! Shared harness for gateway end-to-end tests.
//!
//! Spawns real system servers (noise/sine DSP models) and a real gateway
//! app, all in-process on ephemeral ports, with a scripted chat provider
//! standing in for the external LLM.

#![allow(dead_code)]

use arena_common::{Registry, SecretStore, SystemKey};
use arena_gateway::battle::BattleGenerator;
use arena_gateway::chat::{ChatError, ChatProvider, CompletionOptions, PromptPipeline};
use arena_gateway::config::{ConfigOverrides, GatewayConfig};
use arena_gateway::matchup::MatchupWeights;
use arena_gateway::prebaked::PrebakedPrompts;
use arena_gateway::server::{make_app, ServerState};
use arena_gateway::store::{LocalBlobStore, MemoryDocStore};
use arena_system_server::batcher::{spawn_batcher, BatcherConfig};
use arena_system_server::model::build_model;
use arena_system_server::server as system_server;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const TEST_REGISTRY: &str = r#"
noise:
  display_name: Noise
  description: Seeded white noise.
  organization: Music Arena
  access: OPEN
  supports_lyrics: false
  requires_gpu: false
  model_type: dsp
  variants:
    quiet:
      module_name: dsp
      class_name: Noise
      init_kwargs: {gain: 0.01, duration: 0.2, sample_rate: 8000}
    loud:
      module_name: dsp
      class_name: Noise
      init_kwargs: {gain: 0.1, duration: 0.2, sample_rate: 8000}
sine:
  display_name: Sine
  description: Seeded sine tone.
  organization: Music Arena
  access: OPEN
  supports_lyrics: false
  requires_gpu: false
  model_type: dsp
  variants:
    pure:
      module_name: dsp
      class_name: Sine
      init_kwargs: {duration: 0.2, sample_rate: 8000}
songsmith:
  display_name: Songsmith
  organization: Example Labs
  access: PROPRIETARY
  supports_lyrics: true
  variants:
    v1:
      module_name: remote
      class_name: Songsmith
"#;

/// Canned chat responses; no network involved.
pub struct ScriptedChatProvider {
    /// When set, moderation and routing reject with this rationale.
    pub reject: Option<String>,
    pub instrumental: bool,
    pub duration: Option<f64>,
    pub lyrics: String,
}

impl Default for ScriptedChatProvider {
    fn default() -> Self {
        Self {
            reject: None,
            instrumental: true,
            duration: None,
            lyrics: "Scripted lyrics".to_string(),
        }
    }
}

#[async_trait]
impl ChatProvider for ScriptedChatProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(
        &self,
        input: &str,
        _options: &CompletionOptions,
    ) -> Result<String, ChatError> {
        if input.contains("transforms brief text prompts") {
            return Ok(self.lyrics.clone());
        }
        if let Some(rationale) = &self.reject {
            return Ok(json!({"is_okay": false, "rationale": rationale}).to_string());
        }
        if input.contains("structured representation") {
            return Ok(json!({
                "is_okay": true,
                "instrumental": self.instrumental,
                "duration": self.duration,
            })
            .to_string());
        }
        Ok(json!({"is_okay": true}).to_string())
    }
}

pub struct SystemServerHandle {
    pub key: SystemKey,
    pub base_url: String,
    pub shutdown: CancellationToken,
}

/// Spawn a real system server for a registry variant.
pub async fn spawn_system(registry: &Registry, key: &SystemKey) -> SystemServerHandle {
    let entry = registry.lookup(key).expect("key must be registered");
    let model = build_model(&entry.variant).expect("test registry uses built-in models");

    let shutdown = CancellationToken::new();
    let handle = spawn_batcher(
        model,
        BatcherConfig {
            max_batch_size: 4,
            max_delay: Duration::from_millis(30),
            queue_cap: 64,
            gpu_total_gb: None,
        },
        shutdown.clone(),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = system_server::ServerState {
        queue: handle.queue.clone(),
        phase: handle.phase.clone(),
        warm: handle.warm.clone(),
        capabilities: handle.capabilities,
        config: system_server::ServerConfig {
            port: addr.port(),
            request_timeout: Duration::from_secs(30),
        },
    };
    let app = system_server::make_app(state);
    let serve_shutdown = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
            .await
            .unwrap();
    });

    SystemServerHandle {
        key: key.clone(),
        base_url: format!("http://{}", addr),
        shutdown,
    }
}

pub struct TestGateway {
    pub base_url: String,
    pub client: reqwest::Client,
    _audio_dir: tempfile::TempDir,
}

pub struct GatewayOptions {
    pub enabled: Vec<&'static str>,
    pub weights: Option<&'static str>,
    pub provider: ScriptedChatProvider,
    pub minimum_listen_time: f64,
    pub flakiness: f64,
    /// Systems whose URL points at a dead port instead of a live server.
    pub dead: Vec<&'static str>,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            enabled: vec!["noise:quiet", "noise:loud"],
            weights: Some("noise:quiet/noise:loud=1.0"),
            provider: ScriptedChatProvider::default(),
            minimum_listen_time: 0.5,
            flakiness: 0.0,
            dead: vec![],
        }
    }
}

impl TestGateway {
    pub async fn spawn(options: GatewayOptions) -> Self {
        let registry = Arc::new(
            Registry::parse(TEST_REGISTRY, &SecretStore::from_env()).unwrap(),
        );

        let enabled: Vec<SystemKey> = options
            .enabled
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();

        let mut system_urls: HashMap<SystemKey, String> = HashMap::new();
        for key in &enabled {
            if options.dead.contains(&key.to_string().as_str()) {
                // Nothing listens here; generation will fail fast.
                system_urls.insert(key.clone(), "http://127.0.0.1:9".to_string());
            } else if registry.lookup(key).map(|e| e.variant.module_name.as_str())
                == Some("dsp")
            {
                let server = spawn_system(&registry, key).await;
                system_urls.insert(key.clone(), server.base_url.clone());
            } else {
                // Lyrics-capable stand-in with no live server; the sampler
                // is expected to filter it out before dispatch.
                system_urls.insert(key.clone(), "http://127.0.0.1:9".to_string());
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let config = GatewayConfig::resolve(&ConfigOverrides {
            port: Some(addr.port()),
            public_base_url: Some(base_url.clone()),
            systems_base_url: Some("http://127.0.0.1".to_string()),
            minimum_listen_time: Some(options.minimum_listen_time),
            flakiness: Some(options.flakiness),
            generate_deadline_secs: Some(20),
            route_config: Some("scripted-v00".to_string()),
        })
        .unwrap();

        let audio_dir = tempfile::tempdir().unwrap();
        let blobs = Arc::new(LocalBlobStore::new(
            audio_dir.path().to_path_buf(),
            format!("{}/audio", base_url),
        ));
        let docs = Arc::new(MemoryDocStore::new());
        let pipeline = Arc::new(PromptPipeline::new(
            Arc::new(options.provider),
            config.route_config.clone(),
        ));

        let weights = match options.weights {
            Some(spec) => MatchupWeights::parse(spec).unwrap(),
            None => MatchupWeights::default(),
        };

        let battles = BattleGenerator::new(
            registry,
            enabled,
            system_urls,
            weights,
            pipeline,
            blobs.clone(),
            docs,
            config.generate_deadline,
            config.minimum_listen_time,
        )
        .unwrap();

        let state = ServerState {
            battles: Arc::new(battles),
            blobs,
            prebaked: Arc::new(PrebakedPrompts::empty()),
            config,
            start_time: Instant::now(),
        };
        let app = make_app(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            client: reqwest::Client::new(),
            _audio_dir: audio_dir,
        }
    }

    pub async fn generate_battle(&self, prompt: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/generate_battle", self.base_url))
            .json(&battle_request(prompt))
            .send()
            .await
            .unwrap()
    }

    pub async fn record_vote(&self, body: serde_json::Value) -> reqwest::Response {
        self.client
            .post(format!("{}/record_vote", self.base_url))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

pub fn session_json() -> serde_json::Value {
    json!({
        "uuid": uuid::Uuid::new_v4(),
        "create_time": 1700000000.0,
        "frontend_git_hash": "deadbeef",
        "ack_tos": true,
    })
}

pub fn user_json() -> serde_json::Value {
    json!({
        "salted_ip": "a1b2c3",
        "salted_fingerprint": "d4e5f6",
    })
}

pub fn battle_request(prompt: &str) -> serde_json::Value {
    json!({
        "session": session_json(),
        "user": user_json(),
        "prompt": {"prompt": prompt},
    })
}

/// A vote with `seconds` of PLAY time on each side.
pub fn vote_request(battle_uuid: &str, preference: &str, seconds: f64) -> serde_json::Value {
    json!({
        "session": session_json(),
        "user": user_json(),
        "battle_uuid": battle_uuid,
        "vote": {
            "preference": preference,
            "preference_time": 1700000100.0,
            "a_listen_data": [["PLAY", 1700000050.0], ["PAUSE", 1700000050.0 + seconds]],
            "b_listen_data": [["PLAY", 1700000060.0], ["PAUSE", 1700000060.0 + seconds]],
        },
    })
}
