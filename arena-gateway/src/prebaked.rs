//! Prebaked example prompts served to the frontend.

use arena_common::DetailedTextToMusicPrompt;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

/// Curated prompts keyed by their checksum, loaded once at startup.
#[derive(Debug, Default)]
pub struct PrebakedPrompts {
    map: BTreeMap<String, DetailedTextToMusicPrompt>,
}

impl PrebakedPrompts {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a JSON array of prompts. A missing file is not an error,
    /// just an empty catalog.
    pub fn load(path: &Path) -> Self {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(_) => {
                warn!("prebaked prompts file {:?} not found, serving none", path);
                return Self::empty();
            }
        };
        let prompts: Vec<DetailedTextToMusicPrompt> = match serde_json::from_str(&text) {
            Ok(prompts) => prompts,
            Err(e) => {
                warn!("failed to parse prebaked prompts {:?}: {}", path, e);
                return Self::empty();
            }
        };
        let mut map = BTreeMap::new();
        for prompt in prompts {
            map.insert(prompt.checksum(), prompt);
        }
        Self { map }
    }

    pub fn map(&self) -> &BTreeMap<String, DetailedTextToMusicPrompt> {
        &self.map
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.map.contains_key(checksum)
    }
}
