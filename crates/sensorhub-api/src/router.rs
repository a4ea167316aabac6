//! Axum router construction for the SensorHub API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled so dashboards on other origins can read
//! the stream.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router.
///
/// The router includes:
/// - `GET /` -- welcome message
/// - `GET /health` -- liveness plus writer and observer status
/// - `POST /sensor` -- reading submission
/// - `GET /ws/sensor` -- `WebSocket` reading stream
/// - `GET /api/readings` -- recent readings
/// - `GET /api/readings/{id}` -- single reading
/// - `GET /data` -- live table page
///
/// Anything else is answered with a JSON 404.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // Ingest
        .route("/sensor", post(handlers::submit_reading))
        // WebSocket
        .route("/ws/sensor", get(ws::ws_sensor))
        // REST API
        .route("/api/readings", get(handlers::list_readings))
        .route("/api/readings/{id}", get(handlers::get_reading))
        // Live page
        .route("/data", get(handlers::data_page))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
