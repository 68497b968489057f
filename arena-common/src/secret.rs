//! Secret resolution from the process environment.
//!
//! Secrets are named by tag; the launcher exports each one as
//! `MUSIC_ARENA_SECRET_<TAG>`. Tests inject values through overrides instead
//! of touching the environment.

use std::collections::HashMap;
use thiserror::Error;

pub const SECRET_VAR_PREFIX: &str = "MUSIC_ARENA_SECRET_";

#[derive(Debug, Error, PartialEq)]
pub enum SecretError {
    #[error("secret {tag:?} not found (expected env var {var})")]
    NotFound { tag: String, var: String },
}

pub fn secret_var_name(tag: &str) -> String {
    format!("{}{}", SECRET_VAR_PREFIX, tag.to_uppercase().replace('-', "_"))
}

#[derive(Debug, Clone, Default)]
pub struct SecretStore {
    overrides: HashMap<String, String>,
}

impl SecretStore {
    pub fn from_env() -> Self {
        Self::default()
    }

    /// Add a fixed value for a tag, shadowing the environment.
    pub fn with_override(mut self, tag: &str, value: &str) -> Self {
        self.overrides.insert(tag.to_string(), value.to_string());
        self
    }

    pub fn get(&self, tag: &str) -> Result<String, SecretError> {
        if let Some(value) = self.overrides.get(tag) {
            return Ok(value.clone());
        }
        let var = secret_var_name(tag);
        std::env::var(&var).map_err(|_| SecretError::NotFound {
            tag: tag.to_string(),
            var,
        })
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.get(tag).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_var_name_mapping() {
        assert_eq!(
            secret_var_name("openai-api-key"),
            "MUSIC_ARENA_SECRET_OPENAI_API_KEY"
        );
    }

    #[test]
    fn test_override_wins() {
        let store = SecretStore::from_env().with_override("test-tag", "sekrit");
        assert_eq!(store.get("test-tag").unwrap(), "sekrit");
        assert!(store.contains("test-tag"));
    }

    #[test]
    fn test_missing_secret_errors() {
        let store = SecretStore::from_env();
        let err = store.get("definitely-not-set").unwrap_err();
        assert_eq!(
            err,
            SecretError::NotFound {
                tag: "definitely-not-set".to_string(),
                var: "MUSIC_ARENA_SECRET_DEFINITELY_NOT_SET".to_string(),
            }
        );
    }
}
