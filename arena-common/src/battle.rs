//! Battle records, votes, and listen-time accounting.

use crate::key::SystemKey;
use crate::metadata::SystemMetadata;
use crate::prompt::{DetailedTextToMusicPrompt, SimpleTextToMusicPrompt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Tag substituted for both system identities until the vote is recorded.
pub const ANONYMIZED_TAG: &str = "anonymized";

/// One frontend session, as reported by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub uuid: Uuid,
    pub create_time: f64,
    pub frontend_git_hash: String,
    pub ack_tos: bool,
}

/// A user identified only by salted fingerprints.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salted_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salted_fingerprint: Option<String>,
}

impl User {
    pub fn is_anonymous(&self) -> bool {
        self.salted_ip.is_none() && self.salted_fingerprint.is_none()
    }
}

/// Salt-and-hash a raw identifier (IP, browser fingerprint) for storage.
pub fn salted_checksum(value: &str, salt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    hasher.update(salt.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Preference {
    A,
    B,
    Tie,
    BothBad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListenEvent {
    Play,
    Pause,
    Seek,
}

/// A recorded preference plus the playback evidence behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub preference: Preference,
    pub preference_time: f64,
    #[serde(default)]
    pub a_listen_data: Vec<(ListenEvent, f64)>,
    #[serde(default)]
    pub b_listen_data: Vec<(ListenEvent, f64)>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub a_feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub b_feedback: Option<String>,
}

impl Vote {
    pub fn a_listen_time(&self) -> f64 {
        listen_time(&self.a_listen_data, self.preference_time)
    }

    pub fn b_listen_time(&self) -> f64 {
        listen_time(&self.b_listen_data, self.preference_time)
    }
}

/// Total seconds of playback in an event stream.
///
/// PLAY starts (or restarts) the clock, PAUSE stops it, SEEK credits the
/// elapsed stretch and re-anchors at the seek point. An unmatched PLAY keeps
/// accruing until `end_time` (normally the vote timestamp). Negative
/// stretches from out-of-order timestamps are discarded.
pub fn listen_time(events: &[(ListenEvent, f64)], end_time: f64) -> f64 {
    let mut total = 0.0;
    let mut playing_since: Option<f64> = None;
    for &(event, timestamp) in events {
        match event {
            ListenEvent::Play => {
                playing_since = Some(timestamp);
            }
            ListenEvent::Pause => {
                if let Some(anchor) = playing_since.take() {
                    let stretch = timestamp - anchor;
                    if stretch > 0.0 {
                        total += stretch;
                    }
                }
            }
            ListenEvent::Seek => {
                if let Some(anchor) = playing_since {
                    let stretch = timestamp - anchor;
                    if stretch > 0.0 {
                        total += stretch;
                    }
                    playing_since = Some(timestamp);
                }
            }
        }
    }
    if let Some(anchor) = playing_since {
        let stretch = end_time - anchor;
        if stretch > 0.0 {
            total += stretch;
        }
    }
    total
}

/// The persisted record of one battle.
///
/// Created once on generation success, mutated exactly once when a vote
/// lands, never deleted. Keys and metadata are stored unredacted; redaction
/// happens only on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleRecord {
    pub uuid: Uuid,
    pub create_time: DateTime<Utc>,
    pub session: Session,
    pub user: User,
    pub prompt: SimpleTextToMusicPrompt,
    pub prompt_detailed: DetailedTextToMusicPrompt,
    pub a_system_key: SystemKey,
    pub b_system_key: SystemKey,
    pub a_metadata: SystemMetadata,
    pub b_metadata: SystemMetadata,
    pub a_audio_uri: String,
    pub b_audio_uri: String,
    pub a_gen_ms: u64,
    pub b_gen_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vote: Option<Vote>,
}

impl BattleRecord {
    /// The winning system, if the vote expressed one.
    pub fn winner(&self) -> Option<&SystemKey> {
        match self.vote.as_ref()?.preference {
            Preference::A => Some(&self.a_system_key),
            Preference::B => Some(&self.b_system_key),
            Preference::Tie | Preference::BothBad => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_time_play_pause() {
        let events = vec![
            (ListenEvent::Play, 10.0),
            (ListenEvent::Pause, 14.0),
            (ListenEvent::Play, 20.0),
            (ListenEvent::Pause, 21.5),
        ];
        assert!((listen_time(&events, 100.0) - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_unmatched_play_runs_until_end() {
        let events = vec![(ListenEvent::Play, 10.0)];
        assert!((listen_time(&events, 17.0) - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_double_play_reanchors() {
        // Second PLAY replaces the anchor; the gap before it is not counted.
        let events = vec![
            (ListenEvent::Play, 10.0),
            (ListenEvent::Play, 30.0),
            (ListenEvent::Pause, 33.0),
        ];
        assert!((listen_time(&events, 100.0) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_credits_and_reanchors() {
        let events = vec![
            (ListenEvent::Play, 10.0),
            (ListenEvent::Seek, 15.0),
            (ListenEvent::Pause, 18.0),
        ];
        assert!((listen_time(&events, 100.0) - 8.0).abs() < 1e-9);
    }

    #[test]
    fn test_seek_while_paused_is_ignored() {
        let events = vec![(ListenEvent::Seek, 5.0), (ListenEvent::Play, 10.0)];
        assert!((listen_time(&events, 12.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_out_of_order_timestamps_do_not_go_negative() {
        let events = vec![(ListenEvent::Play, 50.0), (ListenEvent::Pause, 40.0)];
        assert_eq!(listen_time(&events, 45.0), 0.0);
    }

    #[test]
    fn test_salted_checksum_depends_on_salt() {
        let a = salted_checksum("203.0.113.7", "salt-one");
        let b = salted_checksum("203.0.113.7", "salt-two");
        assert_ne!(a, b);
        assert_eq!(a, salted_checksum("203.0.113.7", "salt-one"));
    }
}
