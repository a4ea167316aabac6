//! Backend-agnostic reading store handle.
//!
//! Uses enum dispatch instead of trait objects because async methods are not
//! dyn-compatible. The ingest core and the API hold a [`ReadingStore`] and
//! never care which backend is behind it.

use sensorhub_types::{NewReading, Reading, ReadingId};

use crate::error::DbError;
use crate::memory::MemoryReadingStore;
use crate::reading_store::PgReadingStore;

/// A reading store backed by `PostgreSQL` or by memory.
#[derive(Clone)]
pub enum ReadingStore {
    /// Durable `PostgreSQL` table.
    Postgres(PgReadingStore),
    /// Process-local store (tests, local runs).
    Memory(MemoryReadingStore),
}

impl ReadingStore {
    /// Persist a reading and return the id the backend assigned.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`DbError`] if the write fails.
    pub async fn insert(&self, reading: &NewReading) -> Result<ReadingId, DbError> {
        match self {
            Self::Postgres(store) => store.insert(reading).await,
            Self::Memory(store) => store.insert(reading).await,
        }
    }

    /// Fetch a single reading.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] for an unknown id, or the backend's
    /// error if the read fails.
    pub async fn get(&self, id: ReadingId) -> Result<Reading, DbError> {
        match self {
            Self::Postgres(store) => store.get(id).await,
            Self::Memory(store) => store.get(id).await,
        }
    }

    /// Fetch up to `limit` readings, newest first.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`DbError`] if the read fails.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<Reading>, DbError> {
        match self {
            Self::Postgres(store) => store.get_recent(limit).await,
            Self::Memory(store) => store.get_recent(limit).await,
        }
    }

    /// Human-readable backend name for logging.
    pub const fn backend(&self) -> &'static str {
        match self {
            Self::Postgres(_) => "postgres",
            Self::Memory(_) => "memory",
        }
    }
}

impl From<MemoryReadingStore> for ReadingStore {
    fn from(store: MemoryReadingStore) -> Self {
        Self::Memory(store)
    }
}

impl From<PgReadingStore> for ReadingStore {
    fn from(store: PgReadingStore) -> Self {
        Self::Postgres(store)
    }
}
