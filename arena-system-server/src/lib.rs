//! Single-model generation server with dynamic micro-batching.

pub mod audio;
pub mod batcher;
pub mod model;
pub mod models;
pub mod server;

pub use batcher::{spawn_batcher, BatcherConfig, BatcherHandle, Phase};
pub use model::{build_model, ModelCapabilities, ModelError, ModelOutput, TextToMusicModel};
pub use server::{make_app, run_server, ServerConfig, ServerState};
