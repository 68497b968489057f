//! The system catalog, parsed once at startup from a YAML file.

use crate::key::SystemKey;
use crate::metadata::{SystemAccess, SystemMetadata, TrainingData, VariantSpec};
use crate::secret::SecretStore;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry file not found: {0}")]
    NotFound(String),

    #[error("failed to parse registry: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid system key {tag}:{variant}: {reason}")]
    InvalidKey {
        tag: String,
        variant: String,
        reason: String,
    },

    #[error("system {0} declares no variants")]
    NoVariants(String),

    #[error("port collision on {port}: {first} and {second}")]
    PortCollision {
        port: u16,
        first: SystemKey,
        second: SystemKey,
    },

    #[error("variant {key} requires secret {secret:?} which is not resolvable")]
    MissingSecret { key: SystemKey, secret: String },
}

#[derive(Debug, Deserialize)]
struct RawVariant {
    module_name: String,
    class_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    secrets: Vec<String>,
    #[serde(default)]
    init_kwargs: serde_json::Value,
    #[serde(default)]
    max_duration: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawSystem {
    display_name: String,
    #[serde(default)]
    description: String,
    organization: String,
    access: SystemAccess,
    supports_lyrics: bool,
    #[serde(default)]
    requires_gpu: Option<bool>,
    #[serde(default)]
    model_type: Option<String>,
    #[serde(default)]
    training_data: Option<TrainingData>,
    #[serde(default)]
    citation: Option<String>,
    #[serde(default)]
    links: BTreeMap<String, String>,
    #[serde(default)]
    release_audio_publicly: Option<bool>,
    #[serde(default)]
    max_duration: Option<f64>,
    #[serde(default)]
    variants: BTreeMap<String, RawVariant>,
}

/// Metadata plus launch parameters for one registered (system, variant).
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub metadata: SystemMetadata,
    pub variant: VariantSpec,
}

/// Immutable catalog of every registered system variant.
#[derive(Debug, Default)]
pub struct Registry {
    entries: BTreeMap<SystemKey, RegistryEntry>,
}

impl Registry {
    pub fn load(path: &Path, secrets: &SecretStore) -> Result<Self, RegistryError> {
        let text = std::fs::read_to_string(path)
            .map_err(|_| RegistryError::NotFound(path.display().to_string()))?;
        Self::parse(&text, secrets)
    }

    pub fn parse(yaml: &str, secrets: &SecretStore) -> Result<Self, RegistryError> {
        let raw: BTreeMap<String, RawSystem> = serde_yaml::from_str(yaml)?;
        let mut entries = BTreeMap::new();

        for (system_tag, system) in raw {
            if system.variants.is_empty() {
                return Err(RegistryError::NoVariants(system_tag));
            }
            for (variant_tag, variant) in system.variants {
                let key = SystemKey::new(&system_tag, &variant_tag).map_err(|e| {
                    RegistryError::InvalidKey {
                        tag: system_tag.clone(),
                        variant: variant_tag.clone(),
                        reason: e.to_string(),
                    }
                })?;

                // Variant description is appended to the system description.
                let description = match &variant.description {
                    Some(extra) if !system.description.is_empty() => {
                        format!("{} {}", system.description, extra)
                    }
                    Some(extra) => extra.clone(),
                    None => system.description.clone(),
                };

                let metadata = SystemMetadata {
                    key: key.clone(),
                    display_name: system.display_name.clone(),
                    description,
                    organization: system.organization.clone(),
                    access: system.access,
                    supports_lyrics: system.supports_lyrics,
                    // Open-weight systems run on our GPUs unless stated
                    // otherwise; proprietary ones are remote APIs.
                    requires_gpu: system
                        .requires_gpu
                        .unwrap_or(system.access == SystemAccess::Open),
                    release_audio_publicly: system.release_audio_publicly.unwrap_or(true),
                    model_type: system.model_type.clone(),
                    training_data: system.training_data.clone(),
                    citation: system.citation.clone(),
                    links: system.links.clone(),
                    max_duration: variant.max_duration.or(system.max_duration),
                };
                let spec = VariantSpec {
                    module_name: variant.module_name,
                    class_name: variant.class_name,
                    secrets: variant.secrets,
                    init_kwargs: variant.init_kwargs,
                };
                entries.insert(
                    key,
                    RegistryEntry {
                        metadata,
                        variant: spec,
                    },
                );
            }
        }

        let registry = Self { entries };
        registry.validate(secrets)?;
        Ok(registry)
    }

    fn validate(&self, secrets: &SecretStore) -> Result<(), RegistryError> {
        let mut ports: BTreeMap<u16, SystemKey> = BTreeMap::new();
        for (key, entry) in &self.entries {
            let port = key.port();
            if let Some(first) = ports.get(&port) {
                return Err(RegistryError::PortCollision {
                    port,
                    first: first.clone(),
                    second: key.clone(),
                });
            }
            ports.insert(port, key.clone());

            for secret in &entry.variant.secrets {
                if !secrets.contains(secret) {
                    return Err(RegistryError::MissingSecret {
                        key: key.clone(),
                        secret: secret.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, key: &SystemKey) -> Option<&RegistryEntry> {
        self.entries.get(key)
    }

    /// Every registered key in lexicographic order.
    pub fn all(&self) -> Vec<SystemKey> {
        self.entries.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SystemKey, &RegistryEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGISTRY_YAML: &str = r#"
noise:
  display_name: Noise
  description: Seeded white noise.
  organization: Music Arena
  access: OPEN
  supports_lyrics: false
  requires_gpu: false
  model_type: dsp
  links:
    code: https://example.com/noise
  variants:
    quiet:
      module_name: dsp
      class_name: Noise
      description: Low gain.
      init_kwargs:
        gain: 0.01
    loud:
      module_name: dsp
      class_name: Noise
      init_kwargs:
        gain: 0.1
songsmith:
  display_name: Songsmith
  organization: Example Labs
  access: PROPRIETARY
  supports_lyrics: true
  max_duration: 120
  variants:
    v1:
      module_name: remote
      class_name: Songsmith
      secrets: [songsmith-api-key]
"#;

    fn secrets() -> SecretStore {
        SecretStore::from_env().with_override("songsmith-api-key", "k")
    }

    #[test]
    fn test_parse_and_lookup() {
        let registry = Registry::parse(REGISTRY_YAML, &secrets()).unwrap();
        assert_eq!(registry.len(), 3);

        let key = SystemKey::new("noise", "quiet").unwrap();
        let entry = registry.lookup(&key).unwrap();
        assert_eq!(entry.metadata.display_name, "Noise");
        assert_eq!(entry.metadata.description, "Seeded white noise. Low gain.");
        assert!(!entry.metadata.requires_gpu);
        assert_eq!(entry.variant.class_name, "Noise");
        assert_eq!(entry.variant.init_kwargs["gain"], 0.01);
    }

    #[test]
    fn test_all_is_sorted() {
        let registry = Registry::parse(REGISTRY_YAML, &secrets()).unwrap();
        let keys: Vec<String> = registry.all().iter().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["noise:loud", "noise:quiet", "songsmith:v1"]);
    }

    #[test]
    fn test_requires_gpu_defaults_from_access() {
        let registry = Registry::parse(REGISTRY_YAML, &secrets()).unwrap();
        let songsmith = registry
            .lookup(&SystemKey::new("songsmith", "v1").unwrap())
            .unwrap();
        assert!(!songsmith.metadata.requires_gpu);
        assert_eq!(songsmith.metadata.max_duration, Some(120.0));
    }

    #[test]
    fn test_missing_secret_fails_validation() {
        let err = Registry::parse(REGISTRY_YAML, &SecretStore::from_env()).unwrap_err();
        assert!(matches!(err, RegistryError::MissingSecret { .. }));
    }

    #[test]
    fn test_system_without_variants_rejected() {
        let yaml = r#"
empty:
  display_name: Empty
  organization: Nobody
  access: OPEN
  supports_lyrics: false
"#;
        let err = Registry::parse(yaml, &SecretStore::from_env()).unwrap_err();
        assert!(matches!(err, RegistryError::NoVariants(tag) if tag == "empty"));
    }

    #[test]
    fn test_bad_tag_rejected() {
        let yaml = r#"
BadTag:
  display_name: Bad
  organization: Nobody
  access: OPEN
  supports_lyrics: false
  variants:
    v0:
      module_name: m
      class_name: C
"#;
        let err = Registry::parse(yaml, &SecretStore::from_env()).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidKey { .. }));
    }
}
