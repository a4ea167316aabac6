//! HTTP and `WebSocket` API for the SensorHub telemetry service.
//!
//! This crate provides an Axum server that exposes:
//!
//! - **Submission endpoint** (`POST /sensor`) that hands readings to the
//!   single writer and waits for the stored id
//! - **`WebSocket` endpoint** (`/ws/sensor`) that streams a snapshot of
//!   recent history followed by every new reading
//! - **REST endpoints** for reading stored history
//! - **Status endpoints** (`/`, `/health`) and a live table page (`/data`)
//!
//! # Architecture
//!
//! Handlers never touch the store for writes. Submissions go through the
//! [`IngestHandle`](sensorhub_core::IngestHandle) in [`AppState`];
//! `WebSocket` connections register with the shared
//! [`Broadcaster`](sensorhub_core::Broadcaster).

pub mod error;
pub mod handlers;
pub mod router;
pub mod server;
pub mod state;
pub mod ws;

// Re-export primary types for convenience.
pub use error::ApiError;
pub use router::build_router;
pub use server::{ServerError, serve, start_server};
pub use state::AppState;
