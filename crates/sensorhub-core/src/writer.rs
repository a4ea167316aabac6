//! The single writer: the only task that mutates the reading store.
//!
//! [`Writer::run`] dequeues one [`Request`] at a time and for each one:
//!
//! 1. Stamps the payload with a persistence timestamp (never earlier than
//!    the previous one).
//! 2. Inserts it into the store. The writer never retries.
//! 3. On success, broadcasts the stored reading to all observers. A broadcast
//!    failure is logged and counted but does not fail the request.
//! 4. Replies on the request's reply slot. A reply nobody is waiting for is
//!    counted and dropped.
//!
//! Because there is exactly one writer and it finishes each request before
//! accepting the next, store writes happen in queue order and observers see
//! notifications in the same order.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sensorhub_db::ReadingStore;
use sensorhub_types::NewReading;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::broadcaster::Broadcaster;
use crate::error::IngestError;
use crate::queue::{self, IngestHandle, Request, RequestReceiver};
use crate::stats::{IngestStats, IngestStatsSnapshot, WriterState};

/// The timestamp to persist: `now`, unless the clock has stepped back
/// behind the previous write.
pub fn clamp_timestamp(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match last {
        Some(previous) if previous > now => previous,
        _ => now,
    }
}

/// Sole consumer of the request queue.
pub struct Writer {
    queue: RequestReceiver,
    store: ReadingStore,
    broadcaster: Broadcaster,
    stats: Arc<IngestStats>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl Writer {
    /// Assemble a writer over the consumer end of the queue.
    pub const fn new(
        queue: RequestReceiver,
        store: ReadingStore,
        broadcaster: Broadcaster,
        stats: Arc<IngestStats>,
    ) -> Self {
        Self {
            queue,
            store,
            broadcaster,
            stats,
            last_timestamp: None,
        }
    }

    /// Process requests until every producer handle has been dropped and
    /// the queue is drained.
    ///
    /// Returns the final ingest counters.
    pub async fn run(mut self) -> IngestStatsSnapshot {
        info!(backend = self.store.backend(), "Writer started");

        while let Some(request) = self.queue.accept().await {
            self.process(request).await;
        }

        let summary = self.stats.snapshot();
        info!(
            accepted = summary.accepted,
            persisted = summary.persisted,
            failed = summary.failed,
            orphaned_replies = summary.orphaned_replies,
            broadcast_failures = summary.broadcast_failures,
            "Writer stopped"
        );
        summary
    }

    async fn process(&mut self, request: Request) {
        self.stats.set_state(WriterState::Processing);
        self.stats.record_accepted();

        if let Some(reason) = request.context().expired() {
            debug!(%reason, "Submitter already gone, persisting anyway");
        }

        let timestamp = self.next_timestamp();
        let reading = NewReading::from_payload(request.payload(), timestamp);

        let response = match self.store.insert(&reading).await {
            Ok(id) => {
                self.stats.record_persisted();
                debug!(
                    %id,
                    temperature = reading.temperature,
                    humidity = reading.humidity,
                    "Reading persisted"
                );
                if let Err(e) = self.broadcaster.publish_inserted(id).await {
                    self.stats.record_broadcast_failure();
                    warn!(%id, error = %e, "Broadcast of persisted reading failed");
                }
                Ok(id)
            }
            Err(e) => {
                self.stats.record_failed();
                error!(error = %e, "Failed to persist reading");
                Err(IngestError::Persistence(e))
            }
        };

        if !request.respond(response) {
            self.stats.record_orphaned_reply();
            debug!("Submitter stopped waiting, reply discarded");
        }

        self.stats.set_state(WriterState::Idle);
    }

    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let timestamp = clamp_timestamp(Utc::now(), self.last_timestamp);
        self.last_timestamp = Some(timestamp);
        timestamp
    }
}

/// Create the request queue and spawn its writer.
///
/// The writer stops once the returned handle and all its clones are
/// dropped; awaiting the join handle then yields the final counters.
pub fn spawn_writer(
    store: ReadingStore,
    broadcaster: Broadcaster,
    stats: Arc<IngestStats>,
) -> (IngestHandle, JoinHandle<IngestStatsSnapshot>) {
    let (handle, receiver) = queue::channel();
    let writer = Writer::new(receiver, store, broadcaster, stats);
    (handle, tokio::spawn(writer.run()))
}
