//! Shared type definitions for the SensorHub telemetry service.
//!
//! Every crate in the workspace speaks in these types. Types with
//! `#[ts(export)]` flow downstream to `TypeScript` via `ts-rs` for the live
//! dashboard.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrapper for reading identifiers
//! - [`reading`] -- Readings, their pre-insert form, and the submission payload
//! - [`messages`] -- Streaming envelopes and the submission reply

pub mod ids;
pub mod messages;
pub mod reading;

// Re-export all public types at crate root for convenience.
pub use ids::ReadingId;
pub use messages::{
    NEW_READING_MESSAGE, SNAPSHOT_MESSAGE, SUBMISSION_ACCEPTED_MESSAGE, StreamMessage,
    SubmissionAccepted,
};
pub use reading::{NewReading, Reading, SubmissionPayload};
