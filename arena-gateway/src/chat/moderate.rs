//! Moderation stage: decide whether a free-text prompt is acceptable.

use super::provider::{ChatProvider, CompletionOptions};
use super::PipelineError;
use serde::Deserialize;

const MODERATION_RULES: &str = r#"
We want to moderate prompts that contain any of the following *rationale*:

["Music Reference", "Copyrighted", "Insensitive", "Explicit", "Profanity"]

An explanation of each *rationale* is provided below:

- Music Reference: References to real music artists, songs, albums
- Copyrighted: Lyrics that are from a well-known copyrighted song (though folk songs are okay!)
- Insensitive: Culturally insensitive content: racial slurs, hate speech, or other offensive content
- Explicit: Explicit content: sexually explicit or violent content
- Profanity: Profanity is okay to use, but only if it is appropriate for the style/genre/topics

Be aware that a user may try to deliberately deceive the content moderation
filter by introducing typos. Moderate these cases as well.
"#;

const MODERATION_FORMAT: &str = r#"
For prompts that pass moderation, respond with a valid JSON object matching:

{"is_okay": true}

For prompts that fail moderation, respond with a valid JSON object matching:

{"is_okay": false, "rationale": str}

The rationale must match one of the parenthetical rationales above.
Respond with the JSON object only.
"#;

/// The moderation rule text, shared with the combined routing stage.
pub(super) fn moderation_rules() -> &'static str {
    MODERATION_RULES
}

#[derive(Debug, Deserialize)]
pub(super) struct ModerationVerdict {
    pub is_okay: bool,
    #[serde(default)]
    pub rationale: Option<String>,
}

pub(super) fn parse_verdict(raw: &str) -> Result<ModerationVerdict, PipelineError> {
    serde_json::from_str(raw.trim()).map_err(|e| PipelineError::Malformed(e.to_string()))
}

/// Check a prompt against the moderation rules; rejection carries the
/// model's rationale.
pub async fn moderate(provider: &dyn ChatProvider, text: &str) -> Result<(), PipelineError> {
    let input = format!(
        "You are a specialized AI assistant that moderates text prompts from \
         users of a music generation service.\n{}\n{}\nInput:\n{}\n\nOutput (JSON only):",
        MODERATION_RULES, MODERATION_FORMAT, text
    );
    let options = CompletionOptions {
        max_tokens: 64,
        force_json: true,
        ..CompletionOptions::default()
    };
    let raw = provider.complete(&input, &options).await?;
    let verdict = parse_verdict(&raw)?;
    if verdict.is_okay {
        Ok(())
    } else {
        Err(PipelineError::Rejected {
            rationale: verdict
                .rationale
                .unwrap_or_else(|| "content policy".to_string()),
        })
    }
}
