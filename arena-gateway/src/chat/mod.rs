//! Chat provider abstraction and the prompt pipeline built on it.
//!
//! The provider trait keeps the external LLM behind a narrow seam so the
//! pipeline is testable with scripted fakes.

mod lyrics;
mod moderate;
mod openai;
mod pipeline;
mod provider;
mod route;

pub use lyrics::generate_lyrics;
pub use moderate::moderate;
pub use openai::OpenAiChatProvider;
pub use pipeline::PromptPipeline;
pub use provider::{ChatError, ChatProvider, CompletionOptions};
pub use route::route;

use thiserror::Error;

/// Failure of a pipeline stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("prompt rejected: {rationale}")]
    Rejected { rationale: String },

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("provider returned malformed output: {0}")]
    Malformed(String),
}
