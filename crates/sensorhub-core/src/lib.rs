//! Ingest pipeline for the SensorHub telemetry service.
//!
//! Concurrent submissions are funnelled through one queue into a single
//! writer, so the store sees exactly one write at a time and in arrival
//! order. After each successful write the writer hands the stored reading to
//! the broadcaster, which pushes it to every live observer.
//!
//! # Modules
//!
//! - [`queue`] -- Request queue, submit context, and the producer handle.
//! - [`writer`] -- The single consumer that persists and broadcasts.
//! - [`registry`] -- Lock-guarded set of observer connections.
//! - [`broadcaster`] -- New-reading and snapshot delivery to observers.
//! - [`stats`] -- Atomic ingest counters and writer state.
//! - [`config`] -- Configuration loading from `sensorhub-config.yaml`.
//! - [`error`] -- Ingest, broadcast, and observer error types.

pub mod broadcaster;
pub mod config;
pub mod error;
pub mod queue;
pub mod registry;
pub mod stats;
pub mod writer;

pub use broadcaster::{Broadcaster, DEFAULT_SNAPSHOT_LIMIT, SnapshotOutcome};
pub use config::{ConfigError, Environment, HubConfig, StorageBackend};
pub use error::{BroadcastError, IngestError, ObserverSendError};
pub use queue::{IngestHandle, Request, RequestReceiver, Response, SubmitContext};
pub use registry::{DEFAULT_WRITE_TIMEOUT, ObserverConnection, ObserverRegistry, Outbound, PassReport};
pub use stats::{IngestStats, IngestStatsSnapshot, WriterState};
pub use writer::{Writer, spawn_writer};
