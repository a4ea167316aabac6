//! Data layer for the SensorHub telemetry service.
//!
//! The ingest core treats the store as an opaque collaborator with three
//! operations: `insert`, `get`, and `get_recent`. This crate provides that
//! interface over two backends.
//!
//! ```text
//! Writer (single task) --insert--> ReadingStore --+-- PgReadingStore (PostgreSQL)
//! Broadcaster / API   --get/get_recent----------> +-- MemoryReadingStore
//! ```
//!
//! # Modules
//!
//! - [`reading_store`] -- `PostgreSQL` pool and queries on the `readings` table
//! - [`memory`] -- In-memory backend with failure injection
//! - [`store`] -- [`ReadingStore`] enum dispatching to either backend
//! - [`error`] -- Shared error types

pub mod error;
pub mod memory;
pub mod reading_store;
pub mod store;

// Re-export primary types for convenience.
pub use error::DbError;
pub use memory::MemoryReadingStore;
pub use reading_store::{PgReadingStore, ReadingRow};
pub use store::ReadingStore;
