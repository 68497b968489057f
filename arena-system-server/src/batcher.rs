//! Dynamic micro-batching: a bounded queue, one batcher task, one model.
//!
//! Requests enter through [`BatchQueue::try_enqueue`]. The batcher task pulls
//! the first pending request, opens a `max_delay` window, greedily coalesces
//! further requests up to the effective batch limit, then invokes the model
//! on a blocking thread and fans results back out in insertion order.

use crate::model::{ModelCapabilities, ModelError, TextToMusicModel};
use arena_common::{DetailedTextToMusicPrompt, GenerateTelemetry, TextToMusicResponse};
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lifecycle of a system server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Cold,
    Warming,
    Ready,
    Draining,
    Stopped,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Cold => "cold",
            Phase::Warming => "warming",
            Phase::Ready => "ready",
            Phase::Draining => "draining",
            Phase::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Error)]
pub enum BatchError {
    #[error("request deadline expired in the batch queue")]
    Timeout,

    #[error("model error: {0}")]
    Model(String),

    #[error("server is draining")]
    Draining,
}

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub max_batch_size: usize,
    pub max_delay: Duration,
    pub queue_cap: usize,
    pub gpu_total_gb: Option<f64>,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 4,
            max_delay: Duration::from_secs(4),
            queue_cap: 64,
            gpu_total_gb: None,
        }
    }
}

/// A generated clip plus its telemetry, ready for the wire.
#[derive(Debug)]
pub struct CompletedRequest {
    pub response: TextToMusicResponse,
    pub telemetry: GenerateTelemetry,
}

pub type BatchResult = Result<CompletedRequest, BatchError>;

/// One request waiting for a batch slot.
pub struct PendingRequest {
    pub prompt: DetailedTextToMusicPrompt,
    pub seed: u32,
    pub enqueued: Instant,
    pub deadline: Instant,
    pub cancel: CancellationToken,
    pub reply: oneshot::Sender<BatchResult>,
}

#[derive(Debug, Error)]
pub enum EnqueueError {
    #[error("batch queue is full")]
    Full,

    #[error("batch queue is closed")]
    Closed,
}

/// Producer half of the batch queue, shared by request handlers.
#[derive(Clone)]
pub struct BatchQueue {
    tx: mpsc::Sender<PendingRequest>,
}

impl BatchQueue {
    pub fn try_enqueue(&self, request: PendingRequest) -> Result<(), EnqueueError> {
        self.tx.try_send(request).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => EnqueueError::Full,
            mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Everything the HTTP layer needs to talk to a running batcher.
pub struct BatcherHandle {
    pub queue: BatchQueue,
    pub phase: Arc<RwLock<Phase>>,
    pub warm: Arc<Notify>,
    pub capabilities: ModelCapabilities,
    pub task: JoinHandle<()>,
}

/// Start the batcher task for `model`.
pub fn spawn_batcher(
    model: Box<dyn TextToMusicModel>,
    config: BatcherConfig,
    shutdown: CancellationToken,
) -> BatcherHandle {
    let capabilities = model.capabilities();
    let (tx, rx) = mpsc::channel(config.queue_cap.max(1));
    let phase = Arc::new(RwLock::new(Phase::Cold));
    let warm = Arc::new(Notify::new());

    let batcher = Batcher {
        rx,
        model: Some(model),
        capabilities,
        config,
        phase: phase.clone(),
        warm: warm.clone(),
        shutdown,
    };
    let task = tokio::spawn(batcher.run());

    BatcherHandle {
        queue: BatchQueue { tx },
        phase,
        warm,
        capabilities,
        task,
    }
}

struct Batcher {
    rx: mpsc::Receiver<PendingRequest>,
    /// Taken while a blocking model call is in flight.
    model: Option<Box<dyn TextToMusicModel>>,
    capabilities: ModelCapabilities,
    config: BatcherConfig,
    phase: Arc<RwLock<Phase>>,
    warm: Arc<Notify>,
    shutdown: CancellationToken,
}

impl Batcher {
    async fn run(mut self) {
        info!(
            max_batch_size = self.config.max_batch_size,
            max_delay_ms = self.config.max_delay.as_millis() as u64,
            queue_cap = self.config.queue_cap,
            "batcher starting"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.warm.notified() => {
                    if let Err(e) = self.ensure_ready().await {
                        error!("warm-up failed: {}", e);
                    }
                }
                item = self.rx.recv() => {
                    match item {
                        Some(request) => self.handle_first(request).await,
                        None => break,
                    }
                }
            }
        }

        self.drain().await;
        self.release().await;
        info!("batcher stopped");
    }

    fn set_phase(&self, phase: Phase) {
        if let Ok(mut guard) = self.phase.write() {
            if *guard != phase {
                info!("phase {} -> {}", *guard, phase);
                *guard = phase;
            }
        }
    }

    fn current_phase(&self) -> Phase {
        self.phase.read().map(|p| *p).unwrap_or(Phase::Stopped)
    }

    /// Batch limit honoring both the configured ceiling and GPU memory.
    fn effective_batch_limit(&self) -> usize {
        let mut limit = self.config.max_batch_size.max(1);
        if let Some(model_max) = self.capabilities.max_batch_size {
            limit = limit.min(model_max.max(1));
        }
        if let (Some(total), Some(per_item)) =
            (self.config.gpu_total_gb, self.capabilities.gpu_mem_gb_per_item)
        {
            if per_item > 0.0 {
                let by_memory = (total / per_item).floor() as usize;
                limit = limit.min(by_memory.max(1));
            }
        }
        limit
    }

    /// Drop a request that is no longer worth batching.
    ///
    /// Cancelled requests vanish silently; requests past their deadline fail
    /// with `Timeout` so the client sees 504 rather than a hang.
    fn filter_live(request: PendingRequest) -> Option<PendingRequest> {
        if request.cancel.is_cancelled() {
            debug!("dropping cancelled request at batch assembly");
            return None;
        }
        if Instant::now() >= request.deadline {
            let _ = request.reply.send(Err(BatchError::Timeout));
            return None;
        }
        Some(request)
    }

    async fn handle_first(&mut self, request: PendingRequest) {
        let Some(first) = Self::filter_live(request) else {
            return;
        };

        let was_warm = self.current_phase() == Phase::Ready;
        if let Err(e) = self.ensure_ready().await {
            error!("model prepare failed: {}", e);
            let _ = first.reply.send(Err(BatchError::Model(e.to_string())));
            return;
        }

        let batch = self.assemble(first).await;
        if batch.is_empty() {
            return;
        }
        self.process(batch, was_warm).await;
    }

    /// Coalesce requests until the batch fills or the delay window closes.
    async fn assemble(&mut self, first: PendingRequest) -> Vec<PendingRequest> {
        let limit = self.effective_batch_limit();
        let window_ends = tokio::time::Instant::now() + self.config.max_delay;
        let mut batch = vec![first];

        while batch.len() < limit {
            tokio::select! {
                _ = tokio::time::sleep_until(window_ends) => break,
                item = self.rx.recv() => {
                    match item {
                        Some(request) => {
                            if let Some(live) = Self::filter_live(request) {
                                batch.push(live);
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        batch
    }

    /// Run one assembled batch and fan results out in insertion order.
    ///
    /// The batch is split into consecutive same-seed runs so each model call
    /// sees a single seed; a model error fails every member of its run, a
    /// per-item encoding error fails only that item.
    async fn process(&mut self, batch: Vec<PendingRequest>, was_warm: bool) {
        let batch_size = batch.len();
        let batch_start = Instant::now();
        debug!(batch_size, "processing batch");

        let mut runs: Vec<Vec<PendingRequest>> = Vec::new();
        for request in batch {
            match runs.last_mut() {
                Some(run) if run.first().map(|r| r.seed) == Some(request.seed) => {
                    run.push(request);
                }
                _ => runs.push(vec![request]),
            }
        }

        for run in runs {
            let Some(seed) = run.first().map(|r| r.seed) else {
                continue;
            };
            let prompts: Vec<DetailedTextToMusicPrompt> =
                run.iter().map(|r| r.prompt.clone()).collect();

            let started = Instant::now();
            let result = self.invoke_model(prompts, seed).await;
            let generate_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(outputs) if outputs.len() == run.len() => {
                    for (request, output) in run.into_iter().zip(outputs) {
                        let queue_wait_ms = batch_start
                            .saturating_duration_since(request.enqueued)
                            .as_millis() as u64;
                        let telemetry = GenerateTelemetry {
                            batch_size,
                            queue_wait_ms,
                            generate_ms,
                            model_warm: was_warm,
                        };
                        let reply = match output.audio.encode_wav() {
                            Ok(wav) => Ok(CompletedRequest {
                                response: TextToMusicResponse {
                                    audio: wav,
                                    content_type: "audio/wav".to_string(),
                                    sample_rate: output.audio.sample_rate,
                                    lyrics: output.lyrics,
                                },
                                telemetry,
                            }),
                            Err(e) => Err(BatchError::Model(format!(
                                "audio encoding failed: {}",
                                e
                            ))),
                        };
                        let _ = request.reply.send(reply);
                    }
                }
                Ok(outputs) => {
                    let message = format!(
                        "model returned {} outputs for {} prompts",
                        outputs.len(),
                        run.len()
                    );
                    error!("{}", message);
                    for request in run {
                        let _ = request.reply.send(Err(BatchError::Model(message.clone())));
                    }
                }
                Err(e) => {
                    warn!("model call failed: {}", e);
                    let message = e.to_string();
                    for request in run {
                        let _ = request.reply.send(Err(BatchError::Model(message.clone())));
                    }
                }
            }
        }
    }

    async fn invoke_model(
        &mut self,
        prompts: Vec<DetailedTextToMusicPrompt>,
        seed: u32,
    ) -> Result<Vec<crate::model::ModelOutput>, ModelError> {
        let Some(mut model) = self.model.take() else {
            return Err(ModelError::GenerateFailed("model unavailable".to_string()));
        };
        match tokio::task::spawn_blocking(move || {
            let result = model.generate_batch(&prompts, seed);
            (model, result)
        })
        .await
        {
            Ok((model, result)) => {
                self.model = Some(model);
                result
            }
            Err(join_error) => Err(ModelError::GenerateFailed(format!(
                "model task panicked: {}",
                join_error
            ))),
        }
    }

    /// Warm the model on this task, never on a request thread.
    async fn ensure_ready(&mut self) -> Result<(), ModelError> {
        if self.current_phase() == Phase::Ready {
            return Ok(());
        }
        self.set_phase(Phase::Warming);
        let Some(mut model) = self.model.take() else {
            return Err(ModelError::PrepareFailed("model unavailable".to_string()));
        };
        let (model, result) = match tokio::task::spawn_blocking(move || {
            let result = model.prepare();
            (model, result)
        })
        .await
        {
            Ok(pair) => pair,
            Err(join_error) => {
                return Err(ModelError::PrepareFailed(format!(
                    "prepare task panicked: {}",
                    join_error
                )))
            }
        };
        self.model = Some(model);
        result?;
        self.set_phase(Phase::Ready);
        Ok(())
    }

    /// Fail whatever is still queued, then stop accepting.
    async fn drain(&mut self) {
        self.set_phase(Phase::Draining);
        self.rx.close();
        while let Some(request) = self.rx.recv().await {
            let _ = request.reply.send(Err(BatchError::Draining));
        }
    }

    async fn release(&mut self) {
        if let Some(mut model) = self.model.take() {
            let model = match tokio::task::spawn_blocking(move || {
                model.release();
                model
            })
            .await
            {
                Ok(model) => model,
                Err(join_error) => {
                    error!("release task panicked: {}", join_error);
                    self.set_phase(Phase::Stopped);
                    return;
                }
            };
            self.model = Some(model);
        }
        self.set_phase(Phase::Stopped);
    }
}
