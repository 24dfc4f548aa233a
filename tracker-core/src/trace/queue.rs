//! Thread-safe trace queue
//!
//! FIFO of events waiting for the next flush. Producers append from any
//! thread; the flush cycle peeks a batch, processes it, and then dequeues
//! exactly the peeked count. Events appended between the peek and the dequeue
//! stay behind the batch and are kept.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::event::TraceEvent;

/// Queue statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of events currently in queue
    pub pending_count: usize,

    /// Total events enqueued
    pub total_enqueued: u64,

    /// Total events removed by flushes
    pub total_dequeued: u64,

    /// Total events discarded by `clear()`
    pub total_cleared: u64,
}

#[derive(Debug, Default)]
pub struct TraceQueue {
    events: Mutex<VecDeque<TraceEvent>>,

    total_enqueued: AtomicU64,
    total_dequeued: AtomicU64,
    total_cleared: AtomicU64,
}

impl TraceQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, event: TraceEvent) {
        self.events.lock().push_back(event);
        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies up to `n` oldest events without removing them
    pub fn peek(&self, n: usize) -> Vec<TraceEvent> {
        self.events.lock().iter().take(n).cloned().collect()
    }

    /// Copies the whole queue
    pub fn snapshot(&self) -> Vec<TraceEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Removes up to `n` oldest events, returning how many were removed
    pub fn dequeue(&self, n: usize) -> usize {
        let removed = {
            let mut events = self.events.lock();
            let count = n.min(events.len());
            events.drain(..count);
            count
        };
        self.total_dequeued.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn clear(&self) -> usize {
        let removed = {
            let mut events = self.events.lock();
            let count = events.len();
            events.clear();
            count
        };
        self.total_cleared.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending_count: self.len(),
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_dequeued: self.total_dequeued.load(Ordering::Relaxed),
            total_cleared: self.total_cleared.load(Ordering::Relaxed),
        }
    }
}
