//! `PostgreSQL` backend for readings.
//!
//! Inserts come only from the ingest writer, one at a time. Reads
//! (single-record fetch for broadcast, recent-history for snapshots and the
//! REST listing) may run concurrently with the writer, so the pool keeps a
//! few connections beyond the writer's one. Queries are built at runtime
//! (not compile-time checked) so the workspace builds without a live
//! database.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sensorhub_types::{NewReading, Reading, ReadingId};
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use uuid::Uuid;

use crate::error::DbError;

/// How long to wait for a pooled connection before failing the query.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Idle connections beyond this age are closed.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Reading persistence on the `readings` table.
#[derive(Clone)]
pub struct PgReadingStore {
    pool: PgPool,
}

impl PgReadingStore {
    /// Open a pool of up to `max_connections` against `url` and check that
    /// the server answers.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Config`] if the URL cannot be parsed, or
    /// [`DbError::Postgres`] if the server cannot be reached.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let options: PgConnectOptions = url
            .parse()
            .map_err(|e: sqlx::Error| DbError::Config(format!("invalid database URL: {e}")))?;

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .idle_timeout(IDLE_TIMEOUT)
            .connect_with(options)
            .await?;
        sqlx::query("SELECT 1").execute(&pool).await?;

        tracing::info!(max_connections, "Connected to reading database");
        Ok(Self { pool })
    }

    /// Create or upgrade the `readings` schema from `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Migration`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), DbError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        tracing::info!("Readings schema up to date");
        Ok(())
    }

    /// Close every pooled connection, waiting for in-flight queries.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("Reading database pool closed");
    }

    /// Insert one reading and return the id the database assigned.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the insert fails.
    pub async fn insert(&self, reading: &NewReading) -> Result<ReadingId, DbError> {
        let id: Uuid = sqlx::query_scalar(
            r"INSERT INTO readings (temperature, humidity, recorded_at)
              VALUES ($1, $2, $3)
              RETURNING id",
        )
        .bind(reading.temperature)
        .bind(reading.humidity)
        .bind(reading.timestamp)
        .fetch_one(&self.pool)
        .await?;

        tracing::debug!(%id, "Inserted reading");
        Ok(ReadingId::from(id))
    }

    /// Fetch a single reading by id.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::NotFound`] if no row matches, or
    /// [`DbError::Postgres`] if the query fails.
    pub async fn get(&self, id: ReadingId) -> Result<Reading, DbError> {
        let row = sqlx::query_as::<_, ReadingRow>(
            r"SELECT id, temperature, humidity, recorded_at
              FROM readings
              WHERE id = $1",
        )
        .bind(id.into_inner())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Reading::from).ok_or(DbError::NotFound(id))
    }

    /// Fetch the most recent `limit` readings, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::Postgres`] if the query fails.
    pub async fn get_recent(&self, limit: usize) -> Result<Vec<Reading>, DbError> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);

        let rows = sqlx::query_as::<_, ReadingRow>(
            r"SELECT id, temperature, humidity, recorded_at
              FROM readings
              ORDER BY recorded_at DESC, id DESC
              LIMIT $1",
        )
        .bind(limit_i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Reading::from).collect())
    }
}

/// A row from the `readings` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReadingRow {
    /// Database-assigned UUID v7.
    pub id: Uuid,
    /// Temperature in degrees Celsius.
    pub temperature: f64,
    /// Relative humidity in percent.
    pub humidity: f64,
    /// Writer-assigned persistence time.
    pub recorded_at: DateTime<Utc>,
}

impl From<ReadingRow> for Reading {
    fn from(row: ReadingRow) -> Self {
        Self {
            id: ReadingId::from(row.id),
            temperature: row.temperature,
            humidity: row.humidity,
            timestamp: row.recorded_at,
        }
    }
}
