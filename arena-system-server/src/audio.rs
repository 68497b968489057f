//! In-memory audio buffers and WAV encoding.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AudioError {
    #[error("audio buffer is empty")]
    Empty,

    #[error("invalid audio format: {0}")]
    InvalidFormat(String),
}

/// Interleaved float samples in [-1, 1].
#[derive(Debug, Clone)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioBuffer {
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            channels: 1,
            sample_rate,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / (self.sample_rate as f64 * self.channels as f64)
    }

    /// Encode as a 16-bit PCM RIFF/WAVE file.
    pub fn encode_wav(&self) -> Result<Vec<u8>, AudioError> {
        if self.samples.is_empty() {
            return Err(AudioError::Empty);
        }
        if self.channels == 0 || self.sample_rate == 0 {
            return Err(AudioError::InvalidFormat(format!(
                "channels={} sample_rate={}",
                self.channels, self.sample_rate
            )));
        }

        let pcm = samples_to_pcm16(&self.samples);
        let data_size = pcm.len() as u32;
        let byte_rate = self.sample_rate * self.channels as u32 * 2;
        let block_align = self.channels * 2;

        let mut out = Vec::with_capacity(44 + pcm.len());
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_size).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes()); // PCM
        out.extend_from_slice(&self.channels.to_le_bytes());
        out.extend_from_slice(&self.sample_rate.to_le_bytes());
        out.extend_from_slice(&byte_rate.to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_size.to_le_bytes());
        out.extend_from_slice(&pcm);
        Ok(out)
    }
}

fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clipped = sample.clamp(-1.0, 1.0);
        let value = (clipped * 32767.0).round() as i16;
        pcm.extend_from_slice(&value.to_le_bytes());
    }
    pcm
}
