//! Shared harness for system server end-to-end tests.
//!
//! Spawns the real axum app with a real batcher on an ephemeral port.

#![allow(dead_code)]

use arena_system_server::batcher::{spawn_batcher, BatcherConfig};
use arena_system_server::model::{
    ModelCapabilities, ModelError, ModelOutput, TextToMusicModel,
};
use arena_system_server::models::dsp::{Noise, NoiseConfig};
use arena_system_server::server::{make_app, ServerConfig, ServerState};
use arena_system_server::audio::AudioBuffer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct TestServer {
    pub base_url: String,
    pub shutdown: CancellationToken,
}

impl TestServer {
    pub async fn spawn(model: Box<dyn TextToMusicModel>, batcher_config: BatcherConfig) -> Self {
        Self::spawn_with_timeout(model, batcher_config, Duration::from_secs(30)).await
    }

    pub async fn spawn_with_timeout(
        model: Box<dyn TextToMusicModel>,
        batcher_config: BatcherConfig,
        request_timeout: Duration,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let handle = spawn_batcher(model, batcher_config, shutdown.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let state = ServerState {
            queue: handle.queue.clone(),
            phase: handle.phase.clone(),
            warm: handle.warm.clone(),
            capabilities: handle.capabilities,
            config: ServerConfig {
                port: addr.port(),
                request_timeout,
            },
        };
        let app = make_app(state);

        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
                .await
                .unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            shutdown,
        }
    }
}

/// A fast deterministic model for most tests.
pub fn quick_noise() -> Box<dyn TextToMusicModel> {
    Box::new(Noise::new(NoiseConfig {
        gain: 0.05,
        duration: 0.2,
        sample_rate: 8000,
    }))
}

/// A model that sleeps before answering, for back-pressure and timeout tests.
pub struct SlowModel {
    pub delay: Duration,
}

impl TextToMusicModel for SlowModel {
    fn capabilities(&self) -> ModelCapabilities {
        ModelCapabilities {
            supports_lyrics: false,
            max_duration: None,
            max_batch_size: None,
            gpu_mem_gb_per_item: None,
        }
    }

    fn generate_batch(
        &mut self,
        prompts: &[arena_common::DetailedTextToMusicPrompt],
        _seed: u32,
    ) -> Result<Vec<ModelOutput>, ModelError> {
        std::thread::sleep(self.delay);
        Ok(prompts
            .iter()
            .map(|_| ModelOutput {
                audio: AudioBuffer::mono(vec![0.1; 256], 8000),
                lyrics: None,
            })
            .collect())
    }
}

pub fn instrumental_prompt(seed: Option<u32>) -> serde_json::Value {
    serde_json::json!({
        "overall_prompt": "upbeat electronic",
        "instrumental": true,
        "duration": 0.2,
        "seed": seed,
    })
}
