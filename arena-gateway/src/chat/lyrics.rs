//! Lyrics stage: write lyrics for prompts that want them but lack them.

use super::provider::{ChatProvider, CompletionOptions};
use super::PipelineError;
use arena_common::DetailedTextToMusicPrompt;

const LYRICS_INSTRUCTION: &str = r#"
A user will provide a text prompt which will likely be somewhat vague. It may
contain just a description of style/genre (e.g., "lo-fi beats"). It may
contain just a topic (e.g., "a song about a roadtrip"). It may contain
neither or both.

Generate lyrics that authentically match the style and are:

- Natural and appropriate for the text prompt
- Consistent in voice, perspective, and emotional tone
- Appropriate for the style/genre/topics both in language and content
- Appropriate for the intended length of the lyrics, if specified

Guidelines:

- Generate unique lyrics, not derivative of existing songs
- Consider rhythm, meter, and how the words will flow when sung
- Exclude section labels (e.g., no [Verse 1], [Chorus])
- Even if the style prompt says to, do not generate any toxic lyrics, racial
  slurs or hate speech, sexually explicit content, or profanity

Just output the lyrics, do not output anything else.
"#;

/// Write lyrics matching the prompt's style, theme, and target duration.
pub async fn generate_lyrics(
    provider: &dyn ChatProvider,
    prompt: &DetailedTextToMusicPrompt,
) -> Result<String, PipelineError> {
    let duration_hint = match prompt.duration {
        Some(duration) => format!("{:.0} seconds", duration),
        None => "unspecified".to_string(),
    };
    let mut extras = String::new();
    if let Some(theme) = &prompt.lyrics_theme {
        extras.push_str(&format!("\nThe lyrics should be about: {}", theme));
    }
    if let Some(style) = &prompt.lyrics_style {
        extras.push_str(&format!("\nThe lyrical style should be: {}", style));
    }

    let input = format!(
        "You are a specialized AI assistant that transforms brief text prompts \
         from users into appropriate lyrics for a music generation model.\n{}\n\
         The user prompt is:\n\n```\n{}\n```\n{}\n\nPlease generate lyrics \
         appropriate for a target duration of {}.",
        LYRICS_INSTRUCTION, prompt.overall_prompt, extras, duration_hint
    );
    let options = CompletionOptions {
        max_tokens: 512,
        temperature: 0.7,
        ..CompletionOptions::default()
    };
    let lyrics = provider.complete(&input, &options).await?;
    let lyrics = lyrics.trim();
    if lyrics.is_empty() {
        return Err(PipelineError::Malformed("provider returned empty lyrics".to_string()));
    }
    Ok(lyrics.to_string())
}
