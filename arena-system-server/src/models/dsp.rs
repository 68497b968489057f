//! Cheap deterministic DSP models used for load testing and e2e tests.
//!
//! Both models synthesize audio from the request seed alone, so replaying a
//! request reproduces the exact same bytes.

use crate::audio::AudioBuffer;
use crate::model::{ModelCapabilities, ModelError, ModelOutput, TextToMusicModel};
use arena_common::DetailedTextToMusicPrompt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

const DEFAULT_DURATION_SECS: f64 = 10.0;
const DEFAULT_SAMPLE_RATE: u32 = 44100;

fn parse_kwargs<T: for<'de> Deserialize<'de> + Default>(
    kwargs: &serde_json::Value,
) -> Result<T, ModelError> {
    if kwargs.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(kwargs.clone()).map_err(|e| ModelError::InvalidKwargs(e.to_string()))
}

fn clip_duration(requested: Option<f64>, default: f64) -> f64 {
    requested.unwrap_or(default).clamp(0.5, 300.0)
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NoiseConfig {
    pub gain: f32,
    pub duration: f64,
    pub sample_rate: u32,
}

impl Default for NoiseConfig {
    fn default() -> Self {
        Self {
            gain: 0.01,
            duration: DEFAULT_DURATION_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// Seeded white noise at a fixed gain.
#[derive(Debug)]
pub struct Noise {
    config: NoiseConfig,
}

impl Noise {
    pub fn new(config: NoiseConfig) -> Self {
        Self { config }
    }

    pub fn from_kwargs(kwargs: &serde_json::Value) -> Result<Self, ModelError> {
        Ok(Self::new(parse_kwargs(kwargs)?))
    }
}

impl TextToMusicModel for Noise {
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
        prompts: &[DetailedTextToMusicPrompt],
        seed: u32,
    ) -> Result<Vec<ModelOutput>, ModelError> {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let mut outputs = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            let duration = clip_duration(prompt.duration, self.config.duration);
            let num_samples = (self.config.sample_rate as f64 * duration) as usize;
            let samples: Vec<f32> = (0..num_samples)
                .map(|_| rng.gen_range(-1.0f32..1.0) * self.config.gain)
                .collect();
            outputs.push(ModelOutput {
                audio: AudioBuffer::mono(samples, self.config.sample_rate),
                lyrics: None,
            });
        }
        Ok(outputs)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SineConfig {
    pub gain: f32,
    pub base_freq: f32,
    pub duration: f64,
    pub sample_rate: u32,
}

impl Default for SineConfig {
    fn default() -> Self {
        Self {
            gain: 0.1,
            base_freq: 220.0,
            duration: DEFAULT_DURATION_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

/// A sine tone whose pitch is detuned by the seed.
pub struct Sine {
    config: SineConfig,
}

impl Sine {
    pub fn new(config: SineConfig) -> Self {
        Self { config }
    }

    pub fn from_kwargs(kwargs: &serde_json::Value) -> Result<Self, ModelError> {
        Ok(Self::new(parse_kwargs(kwargs)?))
    }
}

impl TextToMusicModel for Sine {
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
        prompts: &[DetailedTextToMusicPrompt],
        seed: u32,
    ) -> Result<Vec<ModelOutput>, ModelError> {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        let mut outputs = Vec::with_capacity(prompts.len());
        for prompt in prompts {
            // Detune up to a semitone per item so batch members differ.
            let freq = self.config.base_freq * rng.gen_range(1.0f32..1.06);
            let duration = clip_duration(prompt.duration, self.config.duration);
            let num_samples = (self.config.sample_rate as f64 * duration) as usize;
            let step = std::f32::consts::TAU * freq / self.config.sample_rate as f32;
            let samples: Vec<f32> = (0..num_samples)
                .map(|i| (i as f32 * step).sin() * self.config.gain)
                .collect();
            outputs.push(ModelOutput {
                audio: AudioBuffer::mono(samples, self.config.sample_rate),
                lyrics: None,
            });
        }
        Ok(outputs)
    }
}
