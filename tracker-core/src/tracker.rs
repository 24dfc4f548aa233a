//! Tracker facade
//!
//! [`Tracker`] is what applications hold: it validates and enqueues traces,
//! stages extensions, and drives the [`DeliveryPipeline`] either on the
//! calling thread or through a [`FlushWorker`].
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tracker_core::{Capabilities, InMemoryStorage, Tracker, TrackerConfig};
//!
//! let storage = Arc::new(InMemoryStorage::new());
//! let caps = Capabilities::builder().storage(storage.clone()).build();
//! let tracker = Tracker::new(TrackerConfig::default(), caps).unwrap();
//!
//! tracker.start();
//! tracker.set_score(0.8).unwrap();
//! tracker.action_trace("completed", "level", "Level1").unwrap();
//! tracker.flush();
//!
//! assert!(storage.get("tracker_log").unwrap().contains("completed,level,Level1"));
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{Capabilities, FlushMode, StorageType, TrackerConfig};
use crate::error::{Result, TrackerError};
use crate::extensions::PendingExtensions;
use crate::log::Logger;
use crate::pipeline::{DeliveryPipeline, FlushOutcome, PipelineStats};
use crate::serializer::{check_vocabulary, csv::parse_csv_line};
use crate::session::SessionPhase;
use crate::trace::event::{ExtensionValue, TraceEvent};
use crate::trace::queue::{QueueStats, TraceQueue};
use crate::trace::validate::Validator;
use crate::worker::FlushWorker;

/// Snapshot of queue, backlog and session state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerStats {
    pub phase: SessionPhase,
    pub connected: bool,
    pub queue: QueueStats,
    pub pipeline: PipelineStats,
    pub staged_extensions: usize,
}

pub struct Tracker {
    config: Arc<TrackerConfig>,
    pipeline: Arc<DeliveryPipeline>,
    queue: Arc<TraceQueue>,
    extensions: Mutex<PendingExtensions>,
    strict: AtomicBool,
    logger: Logger,
    worker: Mutex<Option<FlushWorker>>,
}

impl std::fmt::Debug for Tracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracker")
            .field("pipeline", &self.pipeline)
            .field("strict", &self.strict_mode())
            .finish_non_exhaustive()
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig, caps: Capabilities) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let queue = Arc::new(TraceQueue::new());
        let logger = caps.logger();
        let pipeline = Arc::new(DeliveryPipeline::new(
            Arc::clone(&config),
            caps,
            Arc::clone(&queue),
        ));

        Ok(Self {
            strict: AtomicBool::new(config.strict_mode),
            config,
            pipeline,
            queue,
            extensions: Mutex::new(PendingExtensions::new()),
            logger,
            worker: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &DeliveryPipeline {
        &self.pipeline
    }

    fn validator(&self) -> Validator {
        Validator::new(self.strict_mode(), self.logger.clone())
    }

    pub fn strict_mode(&self) -> bool {
        self.strict.load(Ordering::Relaxed)
    }

    pub fn set_strict_mode(&self, strict: bool) {
        self.strict.store(strict, Ordering::Relaxed);
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session
    // ═══════════════════════════════════════════════════════════════════════

    pub fn start(&self) {
        self.start_session(None, None);
    }

    pub fn start_with_tracking_code(&self, tracking_code: &str) {
        self.start_session(Some(tracking_code), None);
    }

    pub fn start_with_token(&self, user_token: &str, tracking_code: &str) {
        self.start_session(Some(tracking_code), Some(user_token));
    }

    fn start_session(&self, tracking_code: Option<&str>, user_token: Option<&str>) {
        self.pipeline.start(tracking_code, user_token);

        if self.config.flush_mode == FlushMode::Background {
            let mut worker = self.worker.lock();
            if worker.is_none() {
                match FlushWorker::spawn(Arc::clone(&self.pipeline)) {
                    Ok(w) => *worker = Some(w),
                    Err(e) => self
                        .logger
                        .error(&format!("Tracker: flushing on the caller thread: {}", e)),
                }
            }
        }
    }

    /// Stops the session, discarding queued traces and the pending backlog.
    ///
    /// Unlike [`exit`](Self::exit), no last flush is run.
    pub fn stop(&self) {
        let worker = self.worker.lock().take();
        {
            // trace() admits under the same lock, so nothing lands after the clear
            let _admission = self.extensions.lock();
            self.pipeline.stop();
        }
        if let Some(worker) = worker {
            worker.abort();
        }
    }

    /// Runs a last flush and stops the background worker, if any
    pub fn exit(&self) {
        match self.worker.lock().take() {
            Some(worker) => worker.shutdown(),
            None => {
                self.pipeline.process_queue();
            }
        }
    }

    pub fn login(&self, username: &str, password: &str) -> bool {
        self.pipeline.login(username, password)
    }

    /// Sets the anonymous player id used by the connect handshake
    pub fn login_anonymous(&self, player_id: &str) -> bool {
        self.pipeline.set_player_id(player_id);
        true
    }

    pub fn check_health(&self) -> bool {
        self.pipeline.check_health()
    }

    /// Last status reported by the health endpoint
    pub fn health(&self) -> Option<String> {
        self.pipeline.session().health
    }

    pub fn is_started(&self) -> bool {
        self.pipeline.flags().is_started()
    }

    pub fn is_active(&self) -> bool {
        self.pipeline.flags().is_active()
    }

    pub fn is_connected(&self) -> bool {
        self.pipeline.flags().is_connected()
    }

    pub fn phase(&self) -> SessionPhase {
        self.pipeline
            .flags()
            .phase(self.config.storage_type == StorageType::Local)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Traces
    // ═══════════════════════════════════════════════════════════════════════

    /// Enqueues an event, merging in the staged extensions.
    ///
    /// The staged set is cleared only once the event is enqueued.
    pub fn trace(&self, mut event: TraceEvent) -> Result<()> {
        if !self.is_started() {
            return Err(TrackerError::SessionNotStarted);
        }

        let validator = self.validator();
        if validator.is_strict() && self.config.trace_format.enforces_vocabulary() {
            check_vocabulary(&event, &validator)?;
        }

        let mut staged = self.extensions.lock();
        if !self.is_started() {
            return Err(TrackerError::SessionNotStarted);
        }
        if !staged.is_empty() {
            event.result.merge_extensions(staged.staged(), &validator)?;
            staged.clear();
        }
        self.queue.enqueue(event);
        Ok(())
    }

    /// Builds and enqueues a trace. Returns `Ok(false)` when lenient
    /// validation dropped it.
    pub fn action_trace(&self, verb: &str, kind: &str, id: &str) -> Result<bool> {
        if !self.is_started() {
            return Err(TrackerError::SessionNotStarted);
        }
        match TraceEvent::builder(verb, kind, id).build(&self.validator())? {
            Some(event) => self.trace(event).map(|()| true),
            None => Ok(false),
        }
    }

    /// Enqueues a trace given as `verb,type,id` (commas escaped with `\`)
    pub fn trace_csv(&self, line: &str) -> Result<bool> {
        let parts = parse_csv_line(line);
        if parts.len() != 3 {
            return Err(TrackerError::validation(
                "trace",
                format!("expected 'verb,type,id', found {} fields", parts.len()),
            ));
        }
        self.action_trace(&parts[0], &parts[1], &parts[2])
    }

    /// Flushes on the calling thread, or schedules the background worker
    pub fn flush(&self) -> FlushOutcome {
        if let Some(worker) = self.worker.lock().as_ref() {
            return worker.request();
        }
        self.pipeline.process_queue()
    }

    /// Drops queued traces and staged extensions
    pub fn clear(&self) {
        self.queue.clear();
        self.extensions.lock().clear();
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            phase: self.phase(),
            connected: self.is_connected(),
            queue: self.queue.stats(),
            pipeline: self.pipeline.stats(),
            staged_extensions: self.extensions.lock().len(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Extension setters
    // ═══════════════════════════════════════════════════════════════════════

    pub fn set_success(&self, success: bool) {
        self.extensions.lock().set_success(success);
    }

    pub fn set_completion(&self, completion: bool) {
        self.extensions.lock().set_completion(completion);
    }

    pub fn set_response(&self, response: &str) -> Result<()> {
        self.extensions.lock().set_response(response, &self.validator())
    }

    pub fn set_score(&self, score: f32) -> Result<()> {
        self.extensions.lock().set_score(score, &self.validator())
    }

    pub fn set_progress(&self, progress: f32) -> Result<()> {
        self.extensions.lock().set_progress(progress, &self.validator())
    }

    pub fn set_health(&self, health: f32) -> Result<()> {
        self.extensions.lock().set_health(health, &self.validator())
    }

    pub fn set_position(&self, x: f32, y: f32, z: f32) -> Result<()> {
        self.extensions.lock().set_position(x, y, z, &self.validator())
    }

    pub fn set_var(&self, key: &str, value: impl Into<ExtensionValue>) -> Result<()> {
        self.extensions.lock().set_var(key, value, &self.validator())
    }
}

impl Drop for Tracker {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().take() {
            worker.shutdown();
        }
    }
}
