//! Per-system metadata and capability predicates.

use crate::key::SystemKey;
use crate::prompt::{DetailedTextToMusicPrompt, PromptSupport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemAccess {
    Open,
    Proprietary,
}

/// Descriptor for the corpus a system was trained on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingData {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_tracks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_hours: Option<f64>,
}

/// Immutable public metadata for one (system, variant).
///
/// Frozen at registry parse time. The gateway redacts this before a vote and
/// reveals it after.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemMetadata {
    pub key: SystemKey,
    pub display_name: String,
    pub description: String,
    pub organization: String,
    pub access: SystemAccess,
    pub supports_lyrics: bool,
    pub requires_gpu: bool,
    pub release_audio_publicly: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub training_data: Option<TrainingData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub links: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<f64>,
}

impl SystemMetadata {
    /// Copy with every identifying field blanked out.
    ///
    /// Returned to clients before a vote is recorded; nothing in the result
    /// can be mapped back to the underlying SystemKey.
    pub fn redacted() -> Self {
        Self {
            key: SystemKey {
                system_tag: crate::battle::ANONYMIZED_TAG.to_string(),
                variant_tag: crate::battle::ANONYMIZED_TAG.to_string(),
            },
            display_name: crate::battle::ANONYMIZED_TAG.to_string(),
            description: String::new(),
            organization: String::new(),
            access: SystemAccess::Open,
            supports_lyrics: false,
            requires_gpu: false,
            release_audio_publicly: false,
            model_type: None,
            training_data: None,
            citation: None,
            links: BTreeMap::new(),
            max_duration: None,
        }
    }
}

/// Variant launch parameters, opaque to the routing core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantSpec {
    pub module_name: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secrets: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub init_kwargs: serde_json::Value,
}

/// Capability check derivable from registry metadata alone.
///
/// The gateway uses this to filter candidates without a network round trip;
/// the system server remains the authority via its `/prompt_support` probe.
pub fn prompt_support(
    metadata: &SystemMetadata,
    prompt: &DetailedTextToMusicPrompt,
) -> PromptSupport {
    if !prompt.instrumental && !metadata.supports_lyrics {
        return PromptSupport::UnsupportedLyrics;
    }
    if let (Some(requested), Some(max)) = (prompt.duration, metadata.max_duration) {
        if requested > max {
            return PromptSupport::UnsupportedDuration;
        }
    }
    PromptSupport::Supported
}
