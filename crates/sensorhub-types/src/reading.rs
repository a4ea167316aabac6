//! Sensor reading records and the submission payload they are built from.
//!
//! A [`SubmissionPayload`] is what a device posts. The writer stamps it with
//! a persistence timestamp to form a [`NewReading`], and the store assigns a
//! [`ReadingId`] on insert to produce the immutable [`Reading`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use validator::Validate;

use crate::ids::ReadingId;

/// One durable sensor measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Reading {
    /// Identifier assigned by the store on insert.
    pub id: ReadingId,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Time the reading was persisted.
    pub timestamp: DateTime<Utc>,
}

/// A reading that has been timestamped but not yet persisted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewReading {
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Time the writer accepted the reading for persistence.
    pub timestamp: DateTime<Utc>,
}

impl NewReading {
    /// Stamp a submission with the given persistence time.
    ///
    /// Fields are mapped by name: `temperature` stays `temperature`.
    pub const fn from_payload(payload: &SubmissionPayload, timestamp: DateTime<Utc>) -> Self {
        Self {
            temperature: payload.temperature,
            humidity: payload.humidity,
            timestamp,
        }
    }

    /// Attach the store-assigned identifier.
    pub const fn with_id(self, id: ReadingId) -> Reading {
        Reading {
            id,
            temperature: self.temperature,
            humidity: self.humidity,
            timestamp: self.timestamp,
        }
    }
}

/// Body of `POST /sensor` as sent by a device.
///
/// Both fields are required. Ranges cover the physical limits rather than a
/// particular sensor model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SubmissionPayload {
    /// Temperature in degrees Celsius, not below absolute zero.
    #[validate(range(min = -273.15, max = 1000.0))]
    pub temperature: f64,
    /// Relative humidity in percent.
    #[validate(range(min = 0.0, max = 100.0))]
    pub humidity: f64,
}

impl SubmissionPayload {
    /// Convenience constructor used by tests and tooling.
    pub const fn new(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}
