//! HTTP endpoint handlers for the SensorHub API.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Welcome message |
//! | `GET` | `/health` | Liveness plus writer and observer status |
//! | `POST` | `/sensor` | Submit one reading |
//! | `GET` | `/api/readings` | Most recent readings, newest first |
//! | `GET` | `/api/readings/{id}` | One reading |
//! | `GET` | `/data` | Live table page fed by `/ws/sensor` |

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::{Html, IntoResponse};
use sensorhub_core::SubmitContext;
use sensorhub_types::{ReadingId, SubmissionAccepted, SubmissionPayload};
use tracing::debug;

use crate::error::ApiError;
use crate::state::AppState;

/// Readings returned by `GET /api/readings` when no limit is given.
pub const DEFAULT_LIST_LIMIT: usize = 100;

/// Largest accepted `limit` for `GET /api/readings`.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Query parameters for the `GET /api/readings` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct ReadingsQuery {
    /// Maximum number of readings to return (default 100, capped at 1000).
    pub limit: Option<usize>,
}

// ---------------------------------------------------------------------------
// GET / and GET /health
// ---------------------------------------------------------------------------

/// Welcome message.
pub async fn index() -> impl IntoResponse {
    Json(serde_json::json!({ "data": "welcome to sensorhub api" }))
}

/// Liveness check with observer count and writer counters.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let observers = state.observer_count().await;
    Json(serde_json::json!({
        "status": "ok",
        "observers": observers,
        "writer": state.stats.snapshot(),
    }))
}

// ---------------------------------------------------------------------------
// POST /sensor -- submit a reading
// ---------------------------------------------------------------------------

/// Validate a submission, hand it to the writer, and wait for the stored id.
///
/// The wait is bounded by the configured submit timeout and is cut short
/// when the server begins shutting down. If the client disconnects, Axum
/// drops this future; the request stays queued and is still persisted.
pub async fn submit_reading(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmissionPayload>, JsonRejection>,
) -> Result<Json<SubmissionAccepted>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let context = SubmitContext::new(state.submit_timeout, state.shutdown.child_token());
    let id = state.ingest.submit(payload, context).await?;

    debug!(%id, "Submission acknowledged");
    Ok(Json(SubmissionAccepted::new(id)))
}

// ---------------------------------------------------------------------------
// GET /api/readings -- recent history
// ---------------------------------------------------------------------------

/// List the most recent readings, newest first.
pub async fn list_readings(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReadingsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .min(MAX_LIST_LIMIT);
    let readings = state.store.get_recent(limit).await?;

    Ok(Json(serde_json::json!({
        "count": readings.len(),
        "readings": readings,
    })))
}

// ---------------------------------------------------------------------------
// GET /api/readings/{id} -- single reading
// ---------------------------------------------------------------------------

/// Return a single stored reading.
pub async fn get_reading(
    State(state): State<Arc<AppState>>,
    Path(id_str): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let id = parse_reading_id(&id_str)?;
    let reading = state.store.get(id).await?;
    Ok(Json(reading))
}

// ---------------------------------------------------------------------------
// GET /data -- live table page
// ---------------------------------------------------------------------------

/// Serve the live readings page.
pub async fn data_page() -> impl IntoResponse {
    Html(DATA_PAGE)
}

/// Fallback for unknown routes.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("endpoint not found".to_owned())
}

fn parse_reading_id(s: &str) -> Result<ReadingId, ApiError> {
    s.parse::<ReadingId>()
        .map_err(|e| ApiError::InvalidUuid(format!("{s}: {e}")))
}

const DATA_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>SensorHub</title>
    <style>
        body {
            background: #0d1117;
            color: #c9d1d9;
            font-family: 'Cascadia Code', 'Fira Code', 'Consolas', monospace;
            padding: 2rem;
            max-width: 800px;
            margin: 0 auto;
        }
        h1 { color: #58a6ff; margin-bottom: 0.25rem; }
        .subtitle { color: #8b949e; margin-top: 0; }
        .status { font-weight: bold; }
        .live { color: #3fb950; }
        .down { color: #f85149; }
        table { width: 100%; border-collapse: collapse; margin-top: 1rem; }
        th, td { text-align: left; padding: 0.4rem 0.6rem; border-bottom: 1px solid #30363d; }
        th { color: #8b949e; font-weight: normal; }
        tr.fresh td { color: #7ee787; }
    </style>
</head>
<body>
    <h1>SensorHub</h1>
    <p class="subtitle">Live sensor readings</p>
    <p>Stream: <span id="status" class="status down">CONNECTING</span></p>

    <table>
        <thead>
            <tr><th>Time</th><th>Temperature (&deg;C)</th><th>Humidity (%)</th></tr>
        </thead>
        <tbody id="rows"></tbody>
    </table>

    <script>
        const MAX_ROWS = 100;
        const rows = document.getElementById("rows");
        const status = document.getElementById("status");

        function row(reading, fresh) {
            const tr = document.createElement("tr");
            if (fresh) tr.className = "fresh";
            for (const value of [
                new Date(reading.timestamp).toLocaleString(),
                reading.temperature.toFixed(1),
                reading.humidity.toFixed(1),
            ]) {
                const td = document.createElement("td");
                td.textContent = value;
                tr.appendChild(td);
            }
            return tr;
        }

        function connect() {
            const scheme = location.protocol === "https:" ? "wss" : "ws";
            const socket = new WebSocket(`${scheme}://${location.host}/ws/sensor`);

            socket.onopen = () => {
                status.textContent = "LIVE";
                status.className = "status live";
            };
            socket.onmessage = (event) => {
                const frame = JSON.parse(event.data);
                if (Array.isArray(frame.data)) {
                    rows.replaceChildren(...frame.data.map((r) => row(r, false)));
                } else {
                    rows.prepend(row(frame.data, true));
                    while (rows.children.length > MAX_ROWS) rows.lastChild.remove();
                }
            };
            socket.onclose = () => {
                status.textContent = "RECONNECTING";
                status.className = "status down";
                setTimeout(connect, 2000);
            };
        }

        connect();
    </script>
</body>
</html>
"#;
