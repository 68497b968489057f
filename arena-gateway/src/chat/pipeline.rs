//! The prompt pipeline: moderate, route, and (when needed) write lyrics.

use super::provider::ChatProvider;
use super::{generate_lyrics, moderate, route, PipelineError};
use arena_common::{DetailedTextToMusicPrompt, SimpleTextToMusicPrompt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Runs prompts through the chat provider, caching successful routings so a
/// battle retried within this process never pays for the same call twice.
pub struct PromptPipeline {
    provider: Arc<dyn ChatProvider>,
    config_tag: String,
    routed: Mutex<HashMap<String, DetailedTextToMusicPrompt>>,
    lyrics: Mutex<HashMap<String, String>>,
}

impl PromptPipeline {
    pub fn new(provider: Arc<dyn ChatProvider>, config_tag: impl Into<String>) -> Self {
        Self {
            provider,
            config_tag: config_tag.into(),
            routed: Mutex::new(HashMap::new()),
            lyrics: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(&self, checksum: &str) -> String {
        format!("{}:{}:{}", self.provider.name(), self.config_tag, checksum)
    }

    /// Moderate and route free text into a structured prompt.
    pub async fn run(
        &self,
        prompt: &SimpleTextToMusicPrompt,
    ) -> Result<DetailedTextToMusicPrompt, PipelineError> {
        let key = self.cache_key(&prompt.checksum());
        if let Some(hit) = self.routed.lock().unwrap().get(&key) {
            debug!("prompt pipeline cache hit");
            return Ok(hit.clone());
        }

        moderate(self.provider.as_ref(), &prompt.prompt).await?;
        let detailed = route(self.provider.as_ref(), prompt).await?;
        info!(
            instrumental = detailed.instrumental,
            duration = detailed.duration,
            "routed prompt"
        );

        self.routed.lock().unwrap().insert(key, detailed.clone());
        Ok(detailed)
    }

    /// Fill in lyrics if the prompt wants them and does not have them.
    pub async fn ensure_lyrics(
        &self,
        prompt: &mut DetailedTextToMusicPrompt,
    ) -> Result<(), PipelineError> {
        if !prompt.needs_lyrics() {
            return Ok(());
        }
        let key = self.cache_key(&prompt.checksum());
        if let Some(hit) = self.lyrics.lock().unwrap().get(&key) {
            prompt.lyrics = Some(hit.clone());
            return Ok(());
        }

        let lyrics = generate_lyrics(self.provider.as_ref(), prompt).await?;
        self.lyrics.lock().unwrap().insert(key, lyrics.clone());
        prompt.lyrics = Some(lyrics);
        Ok(())
    }
}
