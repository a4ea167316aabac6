//! Shared application state for the SensorHub API.
//!
//! [`AppState`] bundles the producer end of the ingest queue, the store
//! used by the read endpoints, the broadcaster that observer connections
//! join, and the writer's counters. It is wrapped in [`Arc`] and injected
//! via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Duration;

use sensorhub_core::config::IngestConfig;
use sensorhub_core::{
    Broadcaster, DEFAULT_WRITE_TIMEOUT, IngestHandle, IngestStats, IngestStatsSnapshot,
    ObserverRegistry, spawn_writer,
};
use sensorhub_db::ReadingStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default time a submitter waits for the writer.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state for the Axum application.
#[derive(Clone)]
pub struct AppState {
    /// Producer handle for the single-writer queue.
    pub ingest: IngestHandle,
    /// Store backing the read endpoints.
    pub store: ReadingStore,
    /// Broadcaster observer connections register with.
    pub broadcaster: Broadcaster,
    /// Live writer counters.
    pub stats: Arc<IngestStats>,
    /// How long a submission waits for the writer.
    pub submit_timeout: Duration,
    /// Upper bound on one write to one observer.
    pub observer_write_timeout: Duration,
    /// Cancelled when the server begins shutting down. Every submission's
    /// cancellation token is a child of this one.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Assemble state around an already running writer.
    pub fn new(
        ingest: IngestHandle,
        store: ReadingStore,
        broadcaster: Broadcaster,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            ingest,
            store,
            broadcaster,
            stats,
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            observer_write_timeout: DEFAULT_WRITE_TIMEOUT,
            shutdown: CancellationToken::new(),
        }
    }

    /// Build the registry, broadcaster and writer over `store` and return
    /// the state together with the writer's join handle.
    ///
    /// The writer exits once every clone of the returned state is dropped.
    pub fn start(
        store: ReadingStore,
        ingest: &IngestConfig,
        shutdown: CancellationToken,
    ) -> (Self, JoinHandle<IngestStatsSnapshot>) {
        let registry = Arc::new(ObserverRegistry::new());
        let broadcaster =
            Broadcaster::new(registry, store.clone()).with_snapshot_limit(ingest.snapshot_limit);
        let stats = Arc::new(IngestStats::new());
        let (handle, writer) = spawn_writer(store.clone(), broadcaster.clone(), Arc::clone(&stats));

        let mut state = Self::new(handle, store, broadcaster, stats);
        state.submit_timeout = ingest.submit_timeout();
        state.observer_write_timeout = ingest.observer_write_timeout();
        state.shutdown = shutdown;
        (state, writer)
    }

    /// Override the submission deadline.
    #[must_use]
    pub const fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Number of connected observers.
    pub async fn observer_count(&self) -> usize {
        self.broadcaster.registry().len().await
    }
}
