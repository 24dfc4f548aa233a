//! Background flush worker
//!
//! ```text
//! flush() ──► bounded(1) slot ──► worker thread ──► DeliveryPipeline::process_queue
//!    │             │
//!    │             └─ full: request coalesces into the waiting one
//!    └─ returns immediately
//! ```
//!
//! The slot holds at most one request, so any number of `request()` calls
//! made while a cycle is running collapse into a single re-run. Shutdown
//! queues a last request, closes the channel and joins; the worker drains the
//! slot before it sees the disconnect, and an in-flight cycle always finishes.
//! Abort closes and joins without queueing that last request.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};

use crate::error::{Result, TrackerError};
use crate::pipeline::{DeliveryPipeline, FlushOutcome};

pub struct FlushWorker {
    requests: Option<Sender<()>>,
    runs: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl FlushWorker {
    pub fn spawn(pipeline: Arc<DeliveryPipeline>) -> Result<Self> {
        let (sender, receiver) = channel::bounded::<()>(1);
        let runs = Arc::new(AtomicU64::new(0));

        let thread_runs = Arc::clone(&runs);
        let handle = thread::Builder::new()
            .name("tracker-flush".to_string())
            .spawn(move || Self::flush_loop(receiver, pipeline, thread_runs))
            .map_err(|e| TrackerError::Io {
                message: format!("Failed to spawn flush worker: {}", e),
            })?;

        Ok(Self {
            requests: Some(sender),
            runs,
            handle: Some(handle),
        })
    }

    fn flush_loop(receiver: Receiver<()>, pipeline: Arc<DeliveryPipeline>, runs: Arc<AtomicU64>) {
        while receiver.recv().is_ok() {
            let outcome = pipeline.process_queue();
            runs.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(?outcome, "Background flush finished");
        }
        tracing::debug!("Flush worker exiting");
    }

    /// Asks the worker for a flush cycle without waiting for it
    pub fn request(&self) -> FlushOutcome {
        let Some(sender) = &self.requests else {
            return FlushOutcome::NotStarted;
        };
        match sender.try_send(()) {
            Ok(()) => FlushOutcome::Scheduled,
            Err(TrySendError::Full(())) => FlushOutcome::Coalesced,
            Err(TrySendError::Disconnected(())) => FlushOutcome::NotStarted,
        }
    }

    /// Number of cycles the worker has completed
    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    /// Requests a last flush, then waits for the worker to finish
    pub fn shutdown(mut self) {
        self.stop_and_join(true);
    }

    /// Closes the channel without a last flush and waits for the worker.
    ///
    /// A request already sitting in the slot still runs; callers that must
    /// not deliver anything stop the pipeline first.
    pub fn abort(mut self) {
        self.stop_and_join(false);
    }

    fn stop_and_join(&mut self, final_flush: bool) {
        if let Some(sender) = self.requests.take() {
            if final_flush {
                let _ = sender.try_send(());
            }
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        self.stop_and_join(true);
    }
}
