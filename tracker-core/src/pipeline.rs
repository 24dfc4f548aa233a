//! Delivery pipeline
//!
//! One flush cycle moves a batch from the live queue towards the collector
//! (or the local log) while keeping three tiers in order:
//!
//! 1. **unlogged**: raw events captured while no session was active
//! 2. **pending**: serialized batches whose delivery failed
//! 3. **live**: the queue itself
//!
//! A later tier is never delivered while an earlier one still has data.
//! Delivery failures never surface as errors: they leave data in the
//! backlogs and clear the `connected` flag.
//!
//! The pipeline state lives behind one mutex held for the whole cycle, so two
//! flushes can never drain the same snapshot.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::{Capabilities, StorageType, TrackerConfig};
use crate::error::Result;
use crate::log::Logger;
use crate::serializer::{self, csv};
use crate::session::{SessionContext, SessionFlags};
use crate::storage::{merge_local_log, DataStorage};
use crate::trace::event::TraceEvent;
use crate::trace::queue::TraceQueue;
use crate::trace::validate::Validator;
use crate::transport::{Collector, Method};

/// What one flush cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlushReport {
    /// Events removed from the live queue
    pub dequeued: usize,

    /// Batches delivered, across all tiers
    pub sent_batches: usize,

    /// The live batch was parked in the pending backlog
    pub deferred: bool,

    /// Events moved to the unlogged backlog
    pub buffered: usize,

    /// The live batch was written to the backup file
    pub backed_up: bool,
}

/// Result of a flush request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// The tracker was not started; nothing was sent
    NotStarted,
    /// Queue and backlogs were all empty
    NothingToFlush,
    /// A cycle ran on the calling thread
    Completed(FlushReport),
    /// A request was handed to the background worker
    Scheduled,
    /// A request was already waiting for the background worker
    Coalesced,
}

/// Backlog and flush counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub pending_batches: usize,
    pub unlogged_events: usize,
    pub flush_count: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_flush_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PipelineState {
    session: SessionContext,
    pending: VecDeque<String>,
    unlogged: Vec<TraceEvent>,
}

pub struct DeliveryPipeline {
    config: Arc<TrackerConfig>,
    caps: Capabilities,
    logger: Logger,
    queue: Arc<TraceQueue>,
    flags: Arc<SessionFlags>,
    state: Mutex<PipelineState>,

    flush_count: AtomicU64,
    last_flush_at: Mutex<Option<DateTime<Utc>>>,
}

impl std::fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("caps", &self.caps)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl DeliveryPipeline {
    pub fn new(config: Arc<TrackerConfig>, caps: Capabilities, queue: Arc<TraceQueue>) -> Self {
        let session = SessionContext {
            user_token: config.user_token.clone(),
            player_id: config.player_id.clone(),
            tracking_code: config.tracking_code.clone(),
            ..SessionContext::default()
        };
        Self {
            logger: caps.logger(),
            config,
            caps,
            queue,
            flags: Arc::new(SessionFlags::new()),
            state: Mutex::new(PipelineState {
                session,
                ..PipelineState::default()
            }),
            flush_count: AtomicU64::new(0),
            last_flush_at: Mutex::new(None),
        }
    }

    pub fn flags(&self) -> &SessionFlags {
        &self.flags
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    fn collector(&self) -> Collector<'_> {
        Collector {
            transport: self.caps.transport.as_deref(),
            config: &self.config,
        }
    }

    fn is_local(&self) -> bool {
        self.config.storage_type == StorageType::Local
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Session control
    // ═══════════════════════════════════════════════════════════════════════

    /// Starts the session, optionally replacing the tracking code and token
    pub fn start(&self, tracking_code: Option<&str>, user_token: Option<&str>) {
        let mut state = self.state.lock();
        if let Some(code) = tracking_code {
            state.session.tracking_code = code.to_string();
        }
        if let Some(token) = user_token {
            state.session.user_token = Some(token.to_string());
        }

        self.flags.set_started(true);
        match self.config.storage_type {
            StorageType::Net => state.session.connect(&self.collector(), &self.flags, &self.logger),
            StorageType::Local => {
                let available = self.caps.storage.is_some();
                if !available {
                    self.logger
                        .warn("Tracker: local storage selected but no storage capability configured");
                }
                self.flags.set_active(available);
                self.flags.set_connected(available);
            }
        }
        tracing::info!(
            phase = ?self.flags.phase(self.is_local()),
            "Tracker started"
        );
    }

    /// Resets the flags, forgets the actor and discards the live queue and
    /// the pending backlog. The unlogged backlog is kept.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        self.flags.reset();
        state.session.clear_actor();
        let dropped = self.queue.clear();
        let pending = state.pending.len();
        state.pending.clear();
        tracing::info!(dropped, pending, "Tracker stopped");
    }

    pub fn check_health(&self) -> bool {
        let mut state = self.state.lock();
        state.session.check_health(&self.collector(), &self.logger)
    }

    pub fn login(&self, username: &str, password: &str) -> bool {
        let mut state = self.state.lock();
        state
            .session
            .login(username, password, &self.collector(), &self.logger)
    }

    pub fn set_player_id(&self, player_id: &str) {
        self.state.lock().session.player_id = Some(player_id.to_string());
    }

    pub fn session(&self) -> SessionContext {
        self.state.lock().session.clone()
    }

    pub fn pending_batches(&self) -> Vec<String> {
        self.state.lock().pending.iter().cloned().collect()
    }

    pub fn unlogged_events(&self) -> Vec<TraceEvent> {
        self.state.lock().unlogged.clone()
    }

    pub fn stats(&self) -> PipelineStats {
        let (pending_batches, unlogged_events) = {
            let state = self.state.lock();
            (state.pending.len(), state.unlogged.len())
        };
        PipelineStats {
            pending_batches,
            unlogged_events,
            flush_count: self.flush_count.load(Ordering::Relaxed),
            last_flush_at: *self.last_flush_at.lock(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Flush cycle
    // ═══════════════════════════════════════════════════════════════════════

    /// Runs one flush cycle on the calling thread
    pub fn process_queue(&self) -> FlushOutcome {
        let mut state = self.state.lock();

        if !self.flags.is_started() {
            self.logger
                .warn("Refusing to send traces without starting tracker (Active is False, should be True)");
            return FlushOutcome::NotStarted;
        }

        if !self.flags.is_active() && self.config.storage_type == StorageType::Net {
            state.session.connect(&self.collector(), &self.flags, &self.logger);
        }

        if self.queue.is_empty() && state.pending.is_empty() && state.unlogged.is_empty() {
            self.logger.info("Nothing to flush");
            return FlushOutcome::NothingToFlush;
        }

        let take = match self.config.batch_size {
            0 => usize::MAX,
            n => n,
        };
        let batch = self.queue.peek(take);
        let mut report = FlushReport::default();

        if self.flags.is_active() {
            self.deliver(&mut state, &batch, &mut report);
        } else if !batch.is_empty() {
            state.unlogged.extend(batch.iter().cloned());
            report.buffered = batch.len();
        }

        if self.config.backup_enabled && !batch.is_empty() {
            report.backed_up = self.backup(&batch);
        }

        report.dequeued = self.queue.dequeue(batch.len());
        self.flush_count.fetch_add(1, Ordering::Relaxed);
        *self.last_flush_at.lock() = Some(Utc::now());

        tracing::debug!(
            dequeued = report.dequeued,
            sent = report.sent_batches,
            deferred = report.deferred,
            buffered = report.buffered,
            pending = state.pending.len(),
            unlogged = state.unlogged.len(),
            "Flush cycle complete"
        );
        FlushOutcome::Completed(report)
    }

    fn deliver(&self, state: &mut PipelineState, batch: &[TraceEvent], report: &mut FlushReport) {
        let unlogged_ok = self.send_unlogged(state, report);

        let data = if batch.is_empty() {
            None
        } else {
            self.serialize(&state.session, batch)
        };

        let delivered = unlogged_ok
            && self.send_pending(state, report)
            && match &data {
                Some(data) => self.send(&mut state.session, data),
                None => false,
            };

        if let Some(data) = data {
            if delivered {
                report.sent_batches += 1;
            } else {
                state.pending.push_back(data);
                report.deferred = true;
            }
        }
    }

    /// Serializes and sends the unlogged backlog now that a context exists.
    /// On failure the serialized batch becomes the oldest pending entry.
    fn send_unlogged(&self, state: &mut PipelineState, report: &mut FlushReport) -> bool {
        if state.unlogged.is_empty() {
            return true;
        }
        let events = std::mem::take(&mut state.unlogged);
        let Some(data) = self.serialize(&state.session, &events) else {
            return false;
        };

        if self.send(&mut state.session, &data) {
            report.sent_batches += 1;
            true
        } else {
            state.pending.push_front(data);
            false
        }
    }

    /// Sends pending batches oldest first, stopping at the first failure
    fn send_pending(&self, state: &mut PipelineState, report: &mut FlushReport) -> bool {
        let PipelineState {
            session, pending, ..
        } = state;

        while let Some(data) = pending.front() {
            if !self.send(session, data) {
                return false;
            }
            pending.pop_front();
            report.sent_batches += 1;
        }
        true
    }

    fn serialize(&self, session: &SessionContext, events: &[TraceEvent]) -> Option<String> {
        // Vocabulary is enforced when traces are admitted; here unknown terms
        // are only logged.
        let validator = Validator::new(false, self.logger.clone());
        match serializer::serialize(
            events,
            self.config.trace_format,
            &session.serialize_context(),
            &validator,
        ) {
            Ok(data) => Some(data),
            Err(e) => {
                self.logger
                    .error(&format!("Tracker: failed to serialize {} traces: {}", events.len(), e));
                None
            }
        }
    }

    /// Delivers one serialized batch to the collector or the local log
    fn send(&self, session: &mut SessionContext, data: &str) -> bool {
        match self.config.storage_type {
            StorageType::Local => self.send_local(data),
            StorageType::Net => self.send_net(session, data),
        }
    }

    fn send_local(&self, data: &str) -> bool {
        let Some(storage) = &self.caps.storage else {
            self.logger.error("Tracker: no storage capability for the local log");
            return false;
        };
        let name = &self.config.primary_log_file_name;

        let format = self.config.trace_format;
        match rewrite(storage.as_ref(), name, |previous| merge_local_log(previous, data, format)) {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .error(&format!("Tracker: failed to write local log '{}': {}", name, e));
                false
            }
        }
    }

    fn send_net(&self, session: &mut SessionContext, data: &str) -> bool {
        let collector = self.collector();
        let request = collector
            .request(Method::Post, "proxy/gleaner/collector/track")
            .header("Content-Type", "application/json")
            .header("Authorization", session.user_token.clone().unwrap_or_default())
            .body(data);

        match collector.send(&request) {
            Ok(response) if response.allowed => {
                self.logger.info(&format!("Track= {}", response.body));
                self.flags.set_connected(true);
                true
            }
            Ok(response) => {
                self.logger.error(&format!(
                    "Request Error: {}-{}",
                    response.status, response.message
                ));
                self.logger
                    .warn("Error flushing, connection disabled temporarily");
                self.flags.set_connected(false);
                false
            }
            Err(e) => {
                self.logger.error(&format!("Request Error: {}", e));
                self.logger
                    .warn("Error flushing, connection disabled temporarily");
                self.flags.set_connected(false);
                false
            }
        }
    }

    /// Writes the batch to the backup file as CSV, whatever the wire format
    fn backup(&self, batch: &[TraceEvent]) -> bool {
        let data = csv::batch_to_csv(batch);
        let name = &self.config.backup_file_name;

        let result = if let Some(append) = &self.caps.append {
            append.append(name, &data)
        } else if let Some(storage) = &self.caps.storage {
            rewrite(storage.as_ref(), name, |previous| format!("{}{}", previous, data))
        } else {
            self.logger
                .warn("Tracker: backup enabled but no storage capability configured");
            return false;
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                self.logger
                    .error(&format!("Tracker: failed to write backup '{}': {}", name, e));
                false
            }
        }
    }
}

/// Read-modify-write of one named entry; a missing entry reads as empty
fn rewrite(storage: &dyn DataStorage, name: &str, update: impl FnOnce(&str) -> String) -> Result<()> {
    let previous = if storage.exists(name)? {
        storage.load(name)?
    } else {
        String::new()
    };
    storage.save(name, &update(&previous))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;
    use crate::transport::MockTransport;

    fn event(id: &str) -> TraceEvent {
        TraceEvent::new("accessed", "area", id).unwrap()
    }

    fn local_pipeline(storage: Arc<InMemoryStorage>) -> (DeliveryPipeline, Arc<TraceQueue>) {
        let queue = Arc::new(TraceQueue::new());
        let config = TrackerConfig::default()
            .with_storage_type(StorageType::Local)
            .with_batch_size(0);
        let caps = Capabilities::builder().storage(storage).build();
        (
            DeliveryPipeline::new(Arc::new(config), caps, Arc::clone(&queue)),
            queue,
        )
    }

    #[test]
    fn test_not_started_is_a_no_op() {
        let (pipeline, queue) = local_pipeline(Arc::new(InMemoryStorage::new()));
        queue.enqueue(event("a"));
        assert_eq!(pipeline.process_queue(), FlushOutcome::NotStarted);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_local_start_requires_storage() {
        let queue = Arc::new(TraceQueue::new());
        let pipeline = DeliveryPipeline::new(
            Arc::new(TrackerConfig::default()),
            Capabilities::default(),
            queue,
        );
        pipeline.start(None, None);
        assert!(pipeline.flags().is_started());
        assert!(!pipeline.flags().is_active());
        assert!(!pipeline.flags().is_connected());
    }

    #[test]
    fn test_local_flush_writes_log() {
        let storage = Arc::new(InMemoryStorage::new());
        let (pipeline, queue) = local_pipeline(Arc::clone(&storage));
        pipeline.start(None, None);

        queue.enqueue(event("a"));
        queue.enqueue(event("b"));
        let outcome = pipeline.process_queue();

        assert!(matches!(
            outcome,
            FlushOutcome::Completed(FlushReport { dequeued: 2, sent_batches: 1, .. })
        ));
        let log = storage.get("tracker_log").unwrap();
        assert_eq!(log.lines().count(), 2);
        assert_eq!(pipeline.process_queue(), FlushOutcome::NothingToFlush);
    }

    #[test]
    fn test_backup_prefers_append_capability() {
        let storage = Arc::new(InMemoryStorage::new());
        let append = Arc::new(InMemoryStorage::new());
        let queue = Arc::new(TraceQueue::new());
        let config = TrackerConfig::default().with_backup(true);
        let caps = Capabilities::builder()
            .storage(storage.clone())
            .append(append.clone())
            .build();
        let pipeline = DeliveryPipeline::new(Arc::new(config), caps, Arc::clone(&queue));
        pipeline.start(None, None);

        queue.enqueue(event("a"));
        pipeline.process_queue();
        queue.enqueue(event("b"));
        pipeline.process_queue();

        let backup = append.get("tracker_backup.csv").unwrap();
        assert_eq!(backup.lines().count(), 2);
        assert!(storage.get("tracker_backup.csv").is_none());
    }

    #[test]
    fn test_stop_discards_queue_and_pending() {
        let queue = Arc::new(TraceQueue::new());
        let config = TrackerConfig::default().with_storage_type(StorageType::Net);
        let mock = Arc::new(MockTransport::always(500, ""));
        let caps = Capabilities::builder().transport(mock).build();
        let pipeline = DeliveryPipeline::new(Arc::new(config), caps, Arc::clone(&queue));

        pipeline.start(None, None);
        queue.enqueue(event("a"));
        pipeline.process_queue();
        assert_eq!(pipeline.unlogged_events().len(), 1);

        queue.enqueue(event("b"));
        pipeline.stop();
        assert!(queue.is_empty());
        assert!(pipeline.pending_batches().is_empty());
        assert_eq!(pipeline.unlogged_events().len(), 1);
        assert!(!pipeline.flags().is_started());
    }
}
