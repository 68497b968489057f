//! Shared data model for the Music Arena core.
//!
//! Everything that crosses a component boundary lives here: system keys and
//! metadata, prompts and generation responses, battle records and votes, the
//! system registry, and secret resolution.

pub mod battle;
pub mod key;
pub mod metadata;
pub mod prompt;
pub mod registry;
pub mod response;
pub mod secret;

pub use battle::{
    listen_time, BattleRecord, ListenEvent, Preference, Session, User, Vote, ANONYMIZED_TAG,
};
pub use key::SystemKey;
pub use metadata::{prompt_support, SystemAccess, SystemMetadata, TrainingData, VariantSpec};
pub use prompt::{DetailedTextToMusicPrompt, PromptSupport, SimpleTextToMusicPrompt};
pub use registry::{Registry, RegistryEntry, RegistryError};
pub use response::{GenerateResponseBody, GenerateTelemetry, TextToMusicResponse};
pub use secret::{SecretError, SecretStore};
