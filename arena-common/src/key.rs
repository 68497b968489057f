//! System identity: the `(system_tag, variant_tag)` pair.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("tag must be non-empty lowercase alphanumeric or '-': {0:?}")]
    InvalidTag(String),

    #[error("system key must have the form system:variant, got {0:?}")]
    InvalidForm(String),
}

fn validate_tag(tag: &str) -> Result<(), KeyError> {
    if tag.is_empty()
        || !tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(KeyError::InvalidTag(tag.to_string()));
    }
    Ok(())
}

/// Identifies one variant of one generation system.
///
/// The string form is `system_tag:variant_tag`. Ordering is lexicographic on
/// the system tag, then the variant tag, which is the ordering every listing
/// endpoint exposes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SystemKey {
    pub system_tag: String,
    pub variant_tag: String,
}

impl SystemKey {
    pub fn new(system_tag: &str, variant_tag: &str) -> Result<Self, KeyError> {
        validate_tag(system_tag)?;
        validate_tag(variant_tag)?;
        Ok(Self {
            system_tag: system_tag.to_string(),
            variant_tag: variant_tag.to_string(),
        })
    }

    /// Default port for this system's server, used by deployment tooling.
    ///
    /// Stable hash of `system.variant` mapped into [15000, 25000). The
    /// gateway never assumes this; it reads addresses from configuration.
    pub fn port(&self) -> u16 {
        let mut hasher = Sha256::new();
        hasher.update(format!("{}.{}", self.system_tag, self.variant_tag).as_bytes());
        let digest = hasher.finalize();
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let hash = u64::from_be_bytes(prefix);
        15000 + (hash % 10000) as u16
    }
}

impl fmt::Display for SystemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.system_tag, self.variant_tag)
    }
}

impl FromStr for SystemKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((system_tag, variant_tag)) if !variant_tag.contains(':') => {
                SystemKey::new(system_tag, variant_tag)
            }
            _ => Err(KeyError::InvalidForm(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        let key = SystemKey::new("musicgen", "large").unwrap();
        assert_eq!(key.to_string(), "musicgen:large");
        assert_eq!("musicgen:large".parse::<SystemKey>().unwrap(), key);
    }

    #[test]
    fn test_rejects_bad_tags() {
        assert!(SystemKey::new("", "v0").is_err());
        assert!(SystemKey::new("MusicGen", "v0").is_err());
        assert!(SystemKey::new("music gen", "v0").is_err());
        assert!(SystemKey::new("musicgen", "v_0").is_err());
        assert!("musicgen".parse::<SystemKey>().is_err());
        assert!("a:b:c".parse::<SystemKey>().is_err());
    }

    #[test]
    fn test_ordering_is_lexicographic() {
        let mut keys = vec![
            SystemKey::new("noise", "loud").unwrap(),
            SystemKey::new("musicgen", "small").unwrap(),
            SystemKey::new("noise", "quiet").unwrap(),
        ];
        keys.sort();
        assert_eq!(
            keys.iter().map(|k| k.to_string()).collect::<Vec<_>>(),
            vec!["musicgen:small", "noise:loud", "noise:quiet"]
        );
    }

    #[test]
    fn test_port_is_stable_and_in_range() {
        let key = SystemKey::new("noise", "quiet").unwrap();
        let port = key.port();
        assert_eq!(port, key.port());
        assert!((15000..25000).contains(&port));

        let other = SystemKey::new("noise", "loud").unwrap();
        assert_ne!(port, other.port());
    }
}
