//! Push delivery of readings to observers.
//!
//! Two entry points, both routed through the [`ObserverRegistry`]:
//!
//! - [`Broadcaster::publish_new`] sends one freshly persisted reading to
//!   every registered observer. The writer calls it once per stored reading,
//!   one at a time, so every observer sees notifications in write order.
//! - [`Broadcaster::publish_snapshot`] sends recent history to exactly one
//!   observer. [`Broadcaster::join`] runs it on a detached task right after
//!   registration so a subscribe never waits on the store. Until it has run,
//!   broadcast passes skip the new observer, so the snapshot always arrives
//!   first.

use std::sync::Arc;

use sensorhub_db::ReadingStore;
use sensorhub_types::{Reading, ReadingId, StreamMessage};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BroadcastError;
use crate::registry::{ObserverConnection, ObserverRegistry, Outbound, PassReport};

/// Maximum number of readings in a snapshot.
pub const DEFAULT_SNAPSHOT_LIMIT: usize = 100;

/// What happened to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOutcome {
    /// The snapshot with this many readings was written.
    Delivered(usize),
    /// The observer left before the snapshot was ready.
    Departed,
}

/// Fans readings out to observers. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<ObserverRegistry>,
    store: ReadingStore,
    snapshot_limit: usize,
}

impl Broadcaster {
    /// Create a broadcaster over a registry and the store snapshots come from.
    pub const fn new(registry: Arc<ObserverRegistry>, store: ReadingStore) -> Self {
        Self {
            registry,
            store,
            snapshot_limit: DEFAULT_SNAPSHOT_LIMIT,
        }
    }

    /// Override the snapshot size.
    #[must_use]
    pub const fn with_snapshot_limit(mut self, limit: usize) -> Self {
        self.snapshot_limit = limit;
        self
    }

    /// The registry this broadcaster writes through.
    pub const fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Load a stored reading by id and publish it to every observer.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Store`] if the reading cannot be loaded.
    pub async fn publish_inserted(&self, id: ReadingId) -> Result<PassReport, BroadcastError> {
        let reading = self.store.get(id).await?;
        self.publish_new(reading).await
    }

    /// Send one reading to every registered observer.
    ///
    /// Observers whose write fails are removed; that is reported in the
    /// returned [`PassReport`], not as an error.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Serialization`] if the reading cannot be
    /// encoded.
    pub async fn publish_new(&self, reading: Reading) -> Result<PassReport, BroadcastError> {
        let id = reading.id;
        let text = serde_json::to_string(&StreamMessage::new_reading(reading))?;

        let report = self
            .registry
            .for_each(|conn| {
                let frame = Outbound::Text(text.clone());
                async move { conn.send(frame).await }
            })
            .await;

        debug!(
            %id,
            delivered = report.delivered,
            pruned = report.pruned,
            "Reading broadcast"
        );
        Ok(report)
    }

    /// Send the most recent readings, newest first, to one observer.
    ///
    /// History is loaded while the registry is locked, so no new reading can
    /// reach `conn` ahead of its snapshot and every reading broadcast before
    /// the snapshot is part of it. Afterwards `conn` takes part in every
    /// broadcast pass, even if the snapshot failed.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError::Store`] if history cannot be loaded, or
    /// [`BroadcastError::Observer`] if the write failed (the observer has
    /// then been removed).
    pub async fn publish_snapshot(
        &self,
        conn: &Arc<ObserverConnection>,
    ) -> Result<SnapshotOutcome, BroadcastError> {
        let store = &self.store;
        let limit = self.snapshot_limit;

        let outcome = self
            .registry
            .prime(conn, |c| async move {
                let readings = store.get_recent(limit).await?;
                let count = readings.len();
                let text = serde_json::to_string(&StreamMessage::snapshot(readings))?;
                c.send(Outbound::Text(text)).await?;
                Ok(count)
            })
            .await;

        outcome.map_or(Ok(SnapshotOutcome::Departed), |result| {
            result.map(SnapshotOutcome::Delivered)
        })
    }

    /// Publish a snapshot on a detached task.
    ///
    /// Failures are logged and never reach the subscriber.
    pub fn spawn_snapshot(&self, conn: Arc<ObserverConnection>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            match this.publish_snapshot(&conn).await {
                Ok(SnapshotOutcome::Delivered(count)) => {
                    debug!(observer = conn.label(), count, "Snapshot delivered");
                }
                Ok(SnapshotOutcome::Departed) => {
                    debug!(observer = conn.label(), "Observer left before snapshot");
                }
                Err(e) => {
                    warn!(observer = conn.label(), error = %e, "Snapshot broadcast failed");
                }
            }
        })
    }

    /// Register an observer and start its snapshot.
    ///
    /// The observer is held back from broadcast passes until the snapshot
    /// task has run. Returns `None` if this handle was already registered
    /// (no second snapshot is sent).
    pub async fn join(&self, conn: Arc<ObserverConnection>) -> Option<JoinHandle<()>> {
        if !self.registry.add_pending(Arc::clone(&conn)).await {
            return None;
        }
        Some(self.spawn_snapshot(conn))
    }

    /// Deregister an observer and close it.
    pub async fn leave(&self, conn: &Arc<ObserverConnection>) -> bool {
        let removed = self.registry.remove(conn).await;
        conn.close().await;
        removed
    }
}
