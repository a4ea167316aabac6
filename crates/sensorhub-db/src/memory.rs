//! In-memory reading store for tests and database-less local runs.
//!
//! Readings live in insertion order behind a [`RwLock`]. Reads and writes can
//! be made to fail on demand so callers can exercise their persistence-failure
//! paths without a real database.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use sensorhub_types::{NewReading, Reading, ReadingId};
use tokio::sync::RwLock;

use crate::error::DbError;

/// Shared in-memory store. Clones refer to the same readings.
#[derive(Debug, Clone, Default)]
pub struct MemoryReadingStore {
    readings: Arc<RwLock<Vec<Reading>>>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl MemoryReadingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent insert fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail (or succeed again).
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of stored readings.
    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    /// Whether the store holds no readings.
    pub async fn is_empty(&self) -> bool {
        self.readings.read().await.is_empty()
    }

    /// All readings in insertion order.
    pub async fn all(&self) -> Vec<Reading> {
        self.readings.read().await.clone()
    }

    /// Append a reading under a freshly generated id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] when write failures are switched on.
    pub async fn insert(&self, reading: &NewReading) -> Result<ReadingId, DbError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("writes disabled".to_owned()));
        }
        let id = ReadingId::new();
        self.readings.write().await.push(reading.with_id(id));
        Ok(id)
    }

    /// Fetch a single reading by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if the id is unknown, or
    /// [`DbError::Unavailable`] when read failures are switched on.
    pub async fn get(&self, id: ReadingId) -> Result<Reading, DbError> {
        self.check_reads()?;
        self.readings
            .read()
            .await
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or(DbError::NotFound(id))
    }

    /// The most recent `limit` readings, newest first.
    ///
    /// Ties on timestamp resolve to the later insert first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Unavailable`] when read failures are switched on.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<Reading>, DbError> {
        self.check_reads()?;
        let mut recent: Vec<Reading> = self.readings.read().await.iter().rev().cloned().collect();
        recent.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        recent.truncate(limit);
        Ok(recent)
    }

    fn check_reads(&self) -> Result<(), DbError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("reads disabled".to_owned()));
        }
        Ok(())
    }
}
