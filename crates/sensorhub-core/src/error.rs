//! Error types for the ingest core.
//!
//! [`IngestError`] is what a submitting caller sees. [`BroadcastError`] and
//! [`ObserverSendError`] stay inside the core: they are logged and contained
//! to the observer that caused them, and never fail a submission.

use sensorhub_db::DbError;

/// Failure of one submission, as reported to its caller.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The payload was rejected before it reached the queue.
    #[error("invalid submission: {0}")]
    Validation(String),

    /// The store refused the write. Not retried by the writer.
    #[error("persistence failed: {0}")]
    Persistence(#[from] DbError),

    /// The caller's deadline passed before a response arrived.
    #[error("request timeout")]
    Timeout,

    /// The caller went away (or the server began shutting down) before a
    /// response arrived.
    #[error("request cancelled by client")]
    Cancelled,

    /// The writer task is not running, so nothing can be persisted.
    #[error("ingest writer unavailable")]
    WriterUnavailable,
}

/// A broadcast that could not be carried out.
#[derive(Debug, thiserror::Error)]
pub enum BroadcastError {
    /// The reading (or snapshot) could not be loaded from the store.
    #[error("store error: {0}")]
    Store(#[from] DbError),

    /// The message could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The single target observer could not be written to.
    #[error("observer error: {0}")]
    Observer(#[from] ObserverSendError),
}

/// A write to one observer connection failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObserverSendError {
    /// The connection was already closed.
    #[error("connection closed")]
    Closed,

    /// The write did not complete within the write timeout.
    #[error("write timed out")]
    Timeout,

    /// The transport reported an error.
    #[error("transport error: {0}")]
    Transport(String),
}
