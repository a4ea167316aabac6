//! Ingest counters shared between the writer and the API.
//!
//! All fields are atomics so the writer never takes a lock to record
//! progress and status readers never block the writer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::Serialize;

/// The writer's two logical states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriterState {
    /// Waiting on the request queue.
    Idle,
    /// Handling one request.
    Processing,
}

/// Live counters updated by the writer.
#[derive(Debug, Default)]
pub struct IngestStats {
    processing: AtomicBool,
    accepted: AtomicU64,
    persisted: AtomicU64,
    failed: AtomicU64,
    orphaned_replies: AtomicU64,
    broadcast_failures: AtomicU64,
}

/// Point-in-time copy of [`IngestStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestStatsSnapshot {
    /// Current writer state.
    pub state: WriterState,
    /// Requests dequeued by the writer.
    pub accepted: u64,
    /// Requests whose reading was stored.
    pub persisted: u64,
    /// Requests whose write failed.
    pub failed: u64,
    /// Replies nobody was waiting for any more.
    pub orphaned_replies: u64,
    /// Stored readings whose broadcast failed.
    pub broadcast_failures: u64,
}

impl IngestStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn set_state(&self, state: WriterState) {
        self.processing
            .store(state == WriterState::Processing, Ordering::Release);
    }

    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_persisted(&self) {
        self.persisted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_orphaned_reply(&self) {
        self.orphaned_replies.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_broadcast_failure(&self) {
        self.broadcast_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Current writer state.
    pub fn state(&self) -> WriterState {
        if self.processing.load(Ordering::Acquire) {
            WriterState::Processing
        } else {
            WriterState::Idle
        }
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> IngestStatsSnapshot {
        IngestStatsSnapshot {
            state: self.state(),
            accepted: self.accepted.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            orphaned_replies: self.orphaned_replies.load(Ordering::Relaxed),
            broadcast_failures: self.broadcast_failures.load(Ordering::Relaxed),
        }
    }
}
