//! The model seam: one trait, concrete implementations registered by name.

use crate::audio::AudioBuffer;
use crate::models::dsp::{Noise, Sine};
use arena_common::{DetailedTextToMusicPrompt, PromptSupport, VariantSpec};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model {module}::{class}")]
    UnknownModel { module: String, class: String },

    #[error("invalid init kwargs: {0}")]
    InvalidKwargs(String),

    #[error("model failed to load: {0}")]
    PrepareFailed(String),

    #[error("generation failed: {0}")]
    GenerateFailed(String),
}

/// Static capability summary, queried once at startup so request handlers
/// never contend with the batcher for the model lock.
#[derive(Debug, Clone, Copy)]
pub struct ModelCapabilities {
    pub supports_lyrics: bool,
    pub max_duration: Option<f64>,
    pub max_batch_size: Option<usize>,
    pub gpu_mem_gb_per_item: Option<f64>,
}

impl ModelCapabilities {
    pub fn prompt_support(&self, prompt: &DetailedTextToMusicPrompt) -> PromptSupport {
        if !prompt.instrumental && !self.supports_lyrics {
            return PromptSupport::UnsupportedLyrics;
        }
        if let (Some(requested), Some(max)) = (prompt.duration, self.max_duration) {
            if requested > max {
                return PromptSupport::UnsupportedDuration;
            }
        }
        PromptSupport::Supported
    }
}

/// One generated clip before wire encoding.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    pub audio: AudioBuffer,
    pub lyrics: Option<String>,
}

/// A text-to-music model hosted by this server.
///
/// All methods run on the batcher's blocking thread; implementations are
/// free to hold GPU state without further synchronization. `generate_batch`
/// receives prompts that all share `seed` and must return one output per
/// prompt, in order.
pub trait TextToMusicModel: Send {
    fn capabilities(&self) -> ModelCapabilities;

    /// Load weights. Called once, lazily, before the first batch.
    fn prepare(&mut self) -> Result<(), ModelError> {
        Ok(())
    }

    /// Free resources on graceful shutdown.
    fn release(&mut self) {}

    fn generate_batch(
        &mut self,
        prompts: &[DetailedTextToMusicPrompt],
        seed: u32,
    ) -> Result<Vec<ModelOutput>, ModelError>;
}

/// Instantiate the model a registry variant names.
pub fn build_model(spec: &VariantSpec) -> Result<Box<dyn TextToMusicModel>, ModelError> {
    match (spec.module_name.as_str(), spec.class_name.as_str()) {
        ("dsp", "Noise") => Ok(Box::new(Noise::from_kwargs(&spec.init_kwargs)?)),
        ("dsp", "Sine") => Ok(Box::new(Sine::from_kwargs(&spec.init_kwargs)?)),
        _ => Err(ModelError::UnknownModel {
            module: spec.module_name.clone(),
            class: spec.class_name.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_known_models() {
        let spec = VariantSpec {
            module_name: "dsp".to_string(),
            class_name: "Noise".to_string(),
            secrets: vec![],
            init_kwargs: serde_json::json!({"gain": 0.05}),
        };
        let model = build_model(&spec).unwrap();
        assert!(!model.capabilities().supports_lyrics);
    }

    #[test]
    fn test_unknown_model_is_an_error() {
        let spec = VariantSpec {
            module_name: "nonexistent".to_string(),
            class_name: "Thing".to_string(),
            secrets: vec![],
            init_kwargs: serde_json::Value::Null,
        };
        assert!(matches!(
            build_model(&spec),
            Err(ModelError::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_capability_prompt_support() {
        let caps = ModelCapabilities {
            supports_lyrics: false,
            max_duration: Some(30.0),
            max_batch_size: None,
            gpu_mem_gb_per_item: None,
        };
        let lyrical = DetailedTextToMusicPrompt::lyrical("ballad", None);
        assert_eq!(caps.prompt_support(&lyrical), PromptSupport::UnsupportedLyrics);

        let long = DetailedTextToMusicPrompt {
            duration: Some(60.0),
            ..DetailedTextToMusicPrompt::instrumental("drone")
        };
        assert_eq!(caps.prompt_support(&long), PromptSupport::UnsupportedDuration);
    }
}
