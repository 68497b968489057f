//! Prompt types exchanged between the frontend, gateway, and system servers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Longest song any system is allowed to be asked for, in seconds.
pub const MAX_DURATION_SECS: f64 = 300.0;

#[derive(Debug, Error, PartialEq)]
pub enum PromptError {
    #[error("duration must be in (0, {MAX_DURATION_SECS}] seconds, got {0}")]
    InvalidDuration(f64),

    #[error("instrumental prompts cannot carry lyrics")]
    InstrumentalWithLyrics,
}

/// The raw free-text prompt as typed by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleTextToMusicPrompt {
    pub prompt: String,
}

impl SimpleTextToMusicPrompt {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            prompt: text.into(),
        }
    }

    pub fn checksum(&self) -> String {
        checksum_json(self)
    }
}

/// The structured prompt consumed by generation systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailedTextToMusicPrompt {
    pub overall_prompt: String,
    pub instrumental: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics_theme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lyrics_style: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
}

impl DetailedTextToMusicPrompt {
    pub fn instrumental(overall_prompt: impl Into<String>) -> Self {
        Self {
            overall_prompt: overall_prompt.into(),
            instrumental: true,
            duration: None,
            lyrics: None,
            lyrics_theme: None,
            lyrics_style: None,
            seed: None,
        }
    }

    pub fn lyrical(overall_prompt: impl Into<String>, lyrics: Option<String>) -> Self {
        Self {
            overall_prompt: overall_prompt.into(),
            instrumental: false,
            duration: None,
            lyrics,
            lyrics_theme: None,
            lyrics_style: None,
            seed: None,
        }
    }

    /// Check the structural invariants: duration in range, lyrics only on
    /// non-instrumental prompts.
    pub fn validate(&self) -> Result<(), PromptError> {
        if let Some(duration) = self.duration {
            if !duration.is_finite() || duration <= 0.0 || duration > MAX_DURATION_SECS {
                return Err(PromptError::InvalidDuration(duration));
            }
        }
        if self.instrumental && self.lyrics.is_some() {
            return Err(PromptError::InstrumentalWithLyrics);
        }
        Ok(())
    }

    /// True when a lyric-capable system would need lyrics generated for it.
    pub fn needs_lyrics(&self) -> bool {
        !self.instrumental && self.lyrics.is_none()
    }

    pub fn checksum(&self) -> String {
        checksum_json(self)
    }
}

/// Whether a system can serve a given prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptSupport {
    Supported,
    Unsupported,
    UnsupportedLyrics,
    UnsupportedDuration,
}

impl PromptSupport {
    pub fn is_supported(&self) -> bool {
        matches!(self, PromptSupport::Supported)
    }
}

/// Hex SHA-256 of the canonical JSON form, with nulls stripped.
///
/// serde_json sorts object keys, so two prompts with equal content always
/// hash equally regardless of field declaration order.
fn checksum_json<T: Serialize>(value: &T) -> String {
    let mut json = serde_json::to_value(value).unwrap_or_default();
    if let Some(object) = json.as_object_mut() {
        object.retain(|_, v| !v.is_null());
    }
    let canonical = serde_json::to_string(&json).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}
