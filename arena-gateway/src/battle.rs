//! Battle orchestration: route the prompt, pick a pair, generate both sides,
//! persist the record, and later fold in the vote.

use crate::chat::{PipelineError, PromptPipeline};
use crate::generator::{BreakerConfig, GenerateError, GeneratedAudio, GeneratorClient};
use crate::matchup::{sample_pair, MatchupWeights, SamplerError};
use crate::store::{BlobStore, DocStore, StoreError};
use arena_common::{
    prompt_support, BattleRecord, DetailedTextToMusicPrompt, Registry, Session,
    SimpleTextToMusicPrompt, SystemKey, User, Vote,
};
use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const BATTLES_COLLECTION: &str = "battles";

#[derive(Debug, Error)]
pub enum BattleError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("prompt rejected: {0}")]
    PromptRejected(String),

    #[error("no eligible systems for this prompt")]
    NoEligibleSystems,

    #[error("audio generation failed ({side})")]
    GenerateFailed { side: &'static str },

    #[error("battle not found")]
    NotFound,

    #[error("insufficient listen time on side {side}: {listened:.1}s of {required:.1}s")]
    InsufficientListenTime {
        side: char,
        listened: f64,
        required: f64,
    },

    #[error("chat provider failed: {0}")]
    Provider(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<PipelineError> for BattleError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Rejected { rationale } => BattleError::PromptRejected(rationale),
            other => BattleError::Provider(other.to_string()),
        }
    }
}

/// The prompt block of a `/generate_battle` request. Explicit duration or
/// instrumental flags override whatever the router inferred.
#[derive(Debug, Clone, Deserialize)]
pub struct BattlePromptRequest {
    pub prompt: String,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub instrumental: Option<bool>,
}

/// Everything the gateway needs to run battles.
pub struct BattleGenerator {
    registry: Arc<Registry>,
    enabled: Vec<SystemKey>,
    weights: MatchupWeights,
    pipeline: Arc<PromptPipeline>,
    clients: HashMap<SystemKey, Arc<GeneratorClient>>,
    blobs: Arc<dyn BlobStore>,
    docs: Arc<dyn DocStore>,
    minimum_listen_time: f64,
    rng: Mutex<StdRng>,
}

impl BattleGenerator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<Registry>,
        enabled: Vec<SystemKey>,
        system_urls: HashMap<SystemKey, String>,
        weights: MatchupWeights,
        pipeline: Arc<PromptPipeline>,
        blobs: Arc<dyn BlobStore>,
        docs: Arc<dyn DocStore>,
        generate_deadline: Duration,
        minimum_listen_time: f64,
    ) -> Result<Self, BattleError> {
        if enabled.len() < 2 {
            return Err(BattleError::Validation(
                "at least two systems must be enabled".to_string(),
            ));
        }
        let mut clients = HashMap::new();
        for key in &enabled {
            if registry.lookup(key).is_none() {
                return Err(BattleError::Validation(format!(
                    "system {} is not in the registry",
                    key
                )));
            }
            let url = system_urls.get(key).cloned().ok_or_else(|| {
                BattleError::Validation(format!("no address configured for system {}", key))
            })?;
            clients.insert(
                key.clone(),
                Arc::new(GeneratorClient::new(
                    url,
                    generate_deadline,
                    BreakerConfig::default(),
                )),
            );
        }
        let mut enabled = enabled;
        enabled.sort();
        Ok(Self {
            registry,
            enabled,
            weights,
            pipeline,
            clients,
            blobs,
            docs,
            minimum_listen_time,
            rng: Mutex::new(StdRng::from_entropy()),
        })
    }

    /// Enabled system keys in lexicographic order.
    pub fn systems(&self) -> &[SystemKey] {
        &self.enabled
    }

    /// Systems able to serve this prompt.
    ///
    /// Registry metadata answers most capability questions locally; when a
    /// requested duration cannot be judged from metadata the system's own
    /// probe is consulted. An unreachable probe keeps the candidate in: the
    /// sampler never judges liveness, dispatch failures resample instead.
    async fn candidates(&self, prompt: &DetailedTextToMusicPrompt) -> Vec<SystemKey> {
        let mut result = Vec::new();
        for key in &self.enabled {
            let Some(entry) = self.registry.lookup(key) else {
                continue;
            };
            if !prompt_support(&entry.metadata, prompt).is_supported() {
                continue;
            }
            if prompt.duration.is_some() && entry.metadata.max_duration.is_none() {
                if let Some(client) = self.clients.get(key) {
                    match client.prompt_support(prompt).await {
                        Ok(support) if !support.is_supported() => continue,
                        Ok(_) => {}
                        Err(e) => {
                            debug!("prompt_support probe for {} failed: {}", key, e);
                        }
                    }
                }
            }
            result.push(key.clone());
        }
        result
    }

    async fn generate_side(
        &self,
        key: &SystemKey,
        prompt: &DetailedTextToMusicPrompt,
    ) -> Result<GeneratedAudio, GenerateError> {
        let client = self.clients.get(key).ok_or(GenerateError::Unreachable)?;
        client.generate(prompt).await.map_err(|e| {
            // Identity stays out of client-visible errors; log it here only.
            warn!("generation failed on {}: {}", key, e);
            e
        })
    }

    fn pick_replacement(
        &self,
        candidates: &[SystemKey],
        excluded: &[&SystemKey],
    ) -> Option<SystemKey> {
        let pool: Vec<&SystemKey> = candidates
            .iter()
            .filter(|k| !excluded.contains(k))
            .collect();
        let mut rng = self.rng.lock().ok()?;
        pool.choose(&mut *rng).map(|k| (*k).clone())
    }

    /// Run one battle end to end and persist its record.
    pub async fn generate_battle(
        &self,
        session: Session,
        user: User,
        request: BattlePromptRequest,
    ) -> Result<BattleRecord, BattleError> {
        if request.prompt.trim().is_empty() {
            return Err(BattleError::Validation("prompt must be non-empty".to_string()));
        }
        let simple = SimpleTextToMusicPrompt::from_text(request.prompt.clone());

        let mut detailed = self.pipeline.run(&simple).await?;
        if let Some(duration) = request.duration {
            detailed.duration = Some(duration);
        }
        if let Some(instrumental) = request.instrumental {
            detailed.instrumental = instrumental;
            if instrumental {
                detailed.lyrics = None;
            }
        }
        detailed
            .validate()
            .map_err(|e| BattleError::Validation(e.to_string()))?;

        let candidates = self.candidates(&detailed).await;
        let (initial_a, initial_b) = {
            let mut rng = self
                .rng
                .lock()
                .map_err(|e| BattleError::Internal(e.to_string()))?;
            sample_pair(&candidates, &self.weights, &mut *rng)
        }
        .map_err(|e| match e {
            SamplerError::NoEligibleSystems => BattleError::NoEligibleSystems,
            SamplerError::InvalidSpec(detail) => BattleError::Internal(detail),
        })?;
        info!("sampled pair {} vs {}", initial_a, initial_b);

        self.pipeline.ensure_lyrics(&mut detailed).await?;

        let (a_result, b_result) = tokio::join!(
            self.generate_side(&initial_a, &detailed),
            self.generate_side(&initial_b, &detailed)
        );

        let mut a_key = initial_a.clone();
        let mut b_key = initial_b.clone();
        let (a_audio, b_audio) = match (a_result, b_result) {
            (Ok(a_audio), Ok(b_audio)) => (a_audio, b_audio),
            (Err(_), Ok(b_audio)) => {
                let replacement = self
                    .pick_replacement(&candidates, &[&initial_a, &initial_b])
                    .ok_or(BattleError::GenerateFailed { side: "a" })?;
                info!("resampling side a to {}", replacement);
                let a_audio = self
                    .generate_side(&replacement, &detailed)
                    .await
                    .map_err(|_| BattleError::GenerateFailed { side: "a" })?;
                a_key = replacement;
                (a_audio, b_audio)
            }
            (Ok(a_audio), Err(_)) => {
                let replacement = self
                    .pick_replacement(&candidates, &[&initial_a, &initial_b])
                    .ok_or(BattleError::GenerateFailed { side: "b" })?;
                info!("resampling side b to {}", replacement);
                let b_audio = self
                    .generate_side(&replacement, &detailed)
                    .await
                    .map_err(|_| BattleError::GenerateFailed { side: "b" })?;
                b_key = replacement;
                (a_audio, b_audio)
            }
            (Err(_), Err(_)) => return Err(BattleError::GenerateFailed { side: "both" }),
        };

        let uuid = Uuid::new_v4();
        let a_uri = self
            .blobs
            .put(&format!("{}/a.wav", uuid), a_audio.audio, "audio/wav")
            .await?;
        let b_uri = self
            .blobs
            .put(&format!("{}/b.wav", uuid), b_audio.audio, "audio/wav")
            .await?;

        let a_metadata = self
            .registry
            .lookup(&a_key)
            .ok_or_else(|| BattleError::Internal(format!("{} vanished from registry", a_key)))?
            .metadata
            .clone();
        let b_metadata = self
            .registry
            .lookup(&b_key)
            .ok_or_else(|| BattleError::Internal(format!("{} vanished from registry", b_key)))?
            .metadata
            .clone();

        let record = BattleRecord {
            uuid,
            create_time: Utc::now(),
            session,
            user,
            prompt: simple,
            prompt_detailed: detailed,
            a_system_key: a_key,
            b_system_key: b_key,
            a_metadata,
            b_metadata,
            a_audio_uri: a_uri,
            b_audio_uri: b_uri,
            a_gen_ms: a_audio.gen_ms,
            b_gen_ms: b_audio.gen_ms,
            vote: None,
        };
        let doc = serde_json::to_value(&record)
            .map_err(|e| BattleError::Internal(e.to_string()))?;
        self.docs
            .create(BATTLES_COLLECTION, &uuid.to_string(), doc)
            .await?;
        info!(
            "battle {} created: {} vs {}",
            uuid, record.a_system_key, record.b_system_key
        );

        Ok(record)
    }

    /// Record a vote against an existing battle and reveal the pair.
    pub async fn record_vote(
        &self,
        battle_uuid: Uuid,
        session: Session,
        user: User,
        vote: Vote,
    ) -> Result<BattleRecord, BattleError> {
        let id = battle_uuid.to_string();
        let (doc, version) = match self.docs.get(BATTLES_COLLECTION, &id).await {
            Ok(found) => found,
            Err(StoreError::NotFound(_)) => return Err(BattleError::NotFound),
            Err(e) => return Err(e.into()),
        };
        let mut record: BattleRecord =
            serde_json::from_value(doc).map_err(|e| BattleError::Internal(e.to_string()))?;

        let a_listened = vote.a_listen_time();
        if a_listened < self.minimum_listen_time {
            return Err(BattleError::InsufficientListenTime {
                side: 'a',
                listened: a_listened,
                required: self.minimum_listen_time,
            });
        }
        let b_listened = vote.b_listen_time();
        if b_listened < self.minimum_listen_time {
            return Err(BattleError::InsufficientListenTime {
                side: 'b',
                listened: b_listened,
                required: self.minimum_listen_time,
            });
        }

        if session.uuid != record.session.uuid {
            warn!("vote session does not match battle session for {}", id);
        }
        if user != record.user {
            warn!("vote user does not match battle user for {}", id);
        }
        if record.vote.is_some() {
            warn!("battle {} already has a vote, overwriting (LWW)", id);
        }

        record.vote = Some(vote);
        let doc = serde_json::to_value(&record)
            .map_err(|e| BattleError::Internal(e.to_string()))?;
        match self
            .docs
            .update(BATTLES_COLLECTION, &id, doc.clone(), version)
            .await
        {
            Ok(()) => {}
            Err(StoreError::Conflict { found, .. }) => {
                // Concurrent vote writers are near-nonexistent; last one wins.
                warn!("vote conflict on battle {}, overwriting at version {}", id, found);
                if let Err(e) = self.docs.update(BATTLES_COLLECTION, &id, doc, found).await {
                    warn!("vote overwrite failed for {}: {}", id, e);
                }
            }
            Err(e) => return Err(e.into()),
        }

        Ok(record)
    }
}
