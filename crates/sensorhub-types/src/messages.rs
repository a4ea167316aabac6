//! Wire messages for the submission and streaming endpoints.
//!
//! Streaming frames share one envelope, `{message, data}`, where `data` is
//! either a single [`Reading`] (new-reading notification) or a list of them
//! (snapshot).

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::ids::ReadingId;
use crate::reading::Reading;

/// Message text attached to a new-reading notification.
pub const NEW_READING_MESSAGE: &str = "new sensor data";

/// Message text attached to a snapshot.
pub const SNAPSHOT_MESSAGE: &str = "successfully retrieved sensor data";

/// Message text attached to an accepted submission.
pub const SUBMISSION_ACCEPTED_MESSAGE: &str = "sensor data received";

/// Envelope for every frame pushed to an observer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMessage<T> {
    /// Human-readable description of the payload.
    pub message: String,
    /// The payload itself.
    pub data: T,
}

impl StreamMessage<Reading> {
    /// Notification for one freshly persisted reading.
    pub fn new_reading(reading: Reading) -> Self {
        Self {
            message: NEW_READING_MESSAGE.to_owned(),
            data: reading,
        }
    }
}

impl StreamMessage<Vec<Reading>> {
    /// Recent-history snapshot sent once to a newly joined observer.
    pub fn snapshot(readings: Vec<Reading>) -> Self {
        Self {
            message: SNAPSHOT_MESSAGE.to_owned(),
            data: readings,
        }
    }
}

/// Successful reply to `POST /sensor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubmissionAccepted {
    /// Always [`SUBMISSION_ACCEPTED_MESSAGE`].
    pub message: String,
    /// Hyphenated UUID of the stored reading.
    pub inserted_id: String,
}

impl SubmissionAccepted {
    /// Build the reply for a stored reading.
    pub fn new(id: ReadingId) -> Self {
        Self {
            message: SUBMISSION_ACCEPTED_MESSAGE.to_owned(),
            inserted_id: id.to_string(),
        }
    }
}
