//! Generation responses and the `/generate` wire format.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("audio_b64 is not valid base64: {0}")]
    InvalidAudio(#[from] base64::DecodeError),
}

/// One system's answer to one prompt, with decoded audio bytes.
#[derive(Debug, Clone)]
pub struct TextToMusicResponse {
    pub audio: Vec<u8>,
    pub content_type: String,
    pub sample_rate: u32,
    pub lyrics: Option<String>,
}

/// Per-request telemetry the system server reports back.
///
/// `queue_wait_ms` covers enqueue to batch start; `generate_ms` covers the
/// model call for the batch that carried this request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerateTelemetry {
    pub batch_size: usize,
    pub queue_wait_ms: u64,
    pub generate_ms: u64,
    pub model_warm: bool,
}

/// JSON body of a successful `POST /generate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponseBody {
    pub audio_b64: String,
    pub sample_rate: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    pub metadata: GenerateTelemetry,
}

impl GenerateResponseBody {
    pub fn from_response(
        response: &TextToMusicResponse,
        metadata: GenerateTelemetry,
    ) -> Self {
        Self {
            audio_b64: BASE64.encode(&response.audio),
            sample_rate: response.sample_rate,
            lyrics: response.lyrics.clone(),
            metadata,
        }
    }

    pub fn decode_audio(&self) -> Result<Vec<u8>, ResponseError> {
        Ok(BASE64.decode(&self.audio_b64)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_round_trip() {
        let response = TextToMusicResponse {
            audio: vec![0u8, 1, 2, 254, 255],
            content_type: "audio/wav".to_string(),
            sample_rate: 44100,
            lyrics: Some("Noise".to_string()),
        };
        let body = GenerateResponseBody::from_response(
            &response,
            GenerateTelemetry {
                batch_size: 1,
                queue_wait_ms: 3,
                generate_ms: 20,
                model_warm: true,
            },
        );
        assert_eq!(body.decode_audio().unwrap(), response.audio);
        assert_eq!(body.sample_rate, 44100);
    }

    #[test]
    fn test_rejects_bad_base64() {
        let body = GenerateResponseBody {
            audio_b64: "not base64!!".to_string(),
            sample_rate: 44100,
            lyrics: None,
            metadata: GenerateTelemetry {
                batch_size: 1,
                queue_wait_ms: 0,
                generate_ms: 0,
                model_warm: false,
            },
        };
        assert!(body.decode_audio().is_err());
    }
}
