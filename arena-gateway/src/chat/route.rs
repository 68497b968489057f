//! Routing stage: turn moderated free text into a structured prompt.

use super::provider::{ChatProvider, CompletionOptions};
use super::PipelineError;
use arena_common::{DetailedTextToMusicPrompt, SimpleTextToMusicPrompt};
use serde::Deserialize;

const ROUTING_RULES: &str = r#"
For prompts that pass moderation, your goals in priority order are to:

1. Determine if the user intends for their prompt to be *instrumental-only*,
   or if they want it to contain lyrics. If there is ambiguity, err on the
   side of instrumental.
2. Determine if the user has suggested a specific *duration* for the song.
   If so, output the duration in *seconds*. Otherwise, output null. Unless
   the user has been very specific, err on the side of null.
"#;

const ROUTING_FORMAT: &str = r#"
For prompts that fail moderation, respond with a valid JSON object matching:

{"is_okay": false, "rationale": str}

For prompts that pass moderation, respond with a valid JSON object matching:

{"is_okay": true, "instrumental": bool, "duration": number | null}

Respond with the JSON object only.
"#;

#[derive(Debug, Deserialize)]
struct RouteResult {
    is_okay: bool,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    instrumental: Option<bool>,
    #[serde(default)]
    duration: Option<f64>,
}

/// Moderate and structure a prompt in a single provider call.
pub async fn route(
    provider: &dyn ChatProvider,
    prompt: &SimpleTextToMusicPrompt,
) -> Result<DetailedTextToMusicPrompt, PipelineError> {
    let input = format!(
        "You are a specialized AI assistant performing two tasks: (1) moderate \
         natural language text prompts from users, and (2) for prompts that \
         pass moderation, convert them to a structured representation.\n{}\n{}\n{}\nInput:\n{}\n\nOutput (JSON only):",
        super::moderate::moderation_rules(),
        ROUTING_RULES,
        ROUTING_FORMAT,
        prompt.prompt
    );
    let options = CompletionOptions {
        max_tokens: 64,
        force_json: true,
        ..CompletionOptions::default()
    };
    let raw = provider.complete(&input, &options).await?;
    let result: RouteResult =
        serde_json::from_str(raw.trim()).map_err(|e| PipelineError::Malformed(e.to_string()))?;

    if !result.is_okay {
        return Err(PipelineError::Rejected {
            rationale: result
                .rationale
                .unwrap_or_else(|| "content policy".to_string()),
        });
    }
    let instrumental = result.instrumental.ok_or_else(|| {
        PipelineError::Malformed("routing output missing 'instrumental'".to_string())
    })?;

    Ok(DetailedTextToMusicPrompt {
        overall_prompt: prompt.prompt.clone(),
        instrumental,
        duration: result.duration,
        lyrics: None,
        lyrics_theme: None,
        lyrics_style: None,
        seed: None,
    })
}
