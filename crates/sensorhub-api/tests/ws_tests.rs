//! `WebSocket` tests against a real server bound to `127.0.0.1:0`.
//!
//! The client is `tokio-tungstenite`; readings are submitted through the
//! state's ingest handle so the test controls exactly when they arrive.

#![allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::{SinkExt, StreamExt};
use sensorhub_api::{AppState, serve};
use sensorhub_core::SubmitContext;
use sensorhub_core::config::IngestConfig;
use sensorhub_db::{MemoryReadingStore, ReadingStore};
use sensorhub_types::{
    NEW_READING_MESSAGE, NewReading, Reading, SNAPSHOT_MESSAGE, StreamMessage, SubmissionPayload,
};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn spawn_server(memory: &MemoryReadingStore) -> (Arc<AppState>, SocketAddr) {
    let (state, _writer) = AppState::start(
        ReadingStore::from(memory.clone()),
        &IngestConfig::default(),
        CancellationToken::new(),
    );
    let state = Arc::new(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, Arc::clone(&state), state.shutdown.clone()));
    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _response) = connect_async(format!("ws://{addr}/ws/sensor")).await.unwrap();
    client
}

/// Next text frame, skipping control frames.
async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(WAIT, client.next()).await.unwrap();
        match frame {
            Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn wait_for_observers(state: &AppState, expected: usize) {
    tokio::time::timeout(WAIT, async {
        while state.observer_count().await != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn subscriber_gets_snapshot_then_new_readings() {
    let memory = MemoryReadingStore::new();
    let base = Utc::now();
    for i in 0..2_i64 {
        let reading = NewReading {
            temperature: 20.0,
            humidity: 30.0,
            timestamp: base + chrono::Duration::seconds(i),
        };
        memory.insert(&reading).await.unwrap();
    }
    let (state, addr) = spawn_server(&memory).await;
    let mut client = connect(addr).await;

    let snapshot: StreamMessage<Vec<Reading>> =
        serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(snapshot.message, SNAPSHOT_MESSAGE);
    assert_eq!(snapshot.data.len(), 2);
    assert!(snapshot.data[0].timestamp > snapshot.data[1].timestamp);

    let id = state
        .ingest
        .submit(
            SubmissionPayload::new(21.5, 40.0),
            SubmitContext::with_timeout(WAIT),
        )
        .await
        .unwrap();

    let update: StreamMessage<Reading> =
        serde_json::from_str(&next_text(&mut client).await).unwrap();
    assert_eq!(update.message, NEW_READING_MESSAGE);
    assert_eq!(update.data.id, id);

    state.shutdown.cancel();
}

#[tokio::test]
async fn ping_is_answered_with_exactly_one_pong() {
    let memory = MemoryReadingStore::new();
    let (state, addr) = spawn_server(&memory).await;
    let mut client = connect(addr).await;
    next_text(&mut client).await;

    client.send(Message::Ping("keepalive".into())).await.unwrap();

    let pong = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Pong(payload))) => return payload,
                Some(Ok(_)) => {}
                other => panic!("connection ended before pong: {other:?}"),
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(&pong[..], b"keepalive");

    let second = tokio::time::timeout(Duration::from_millis(200), async {
        loop {
            match client.next().await {
                Some(Ok(Message::Pong(payload))) => return Some(payload),
                Some(Ok(_)) => {}
                _ => return None,
            }
        }
    })
    .await;
    assert!(second.is_err(), "a single ping produced a second pong");

    state.shutdown.cancel();
}

#[tokio::test]
async fn closing_client_is_deregistered() {
    let memory = MemoryReadingStore::new();
    let (state, addr) = spawn_server(&memory).await;
    let mut client = connect(addr).await;
    next_text(&mut client).await;
    wait_for_observers(&state, 1).await;

    client.close(None).await.unwrap();
    wait_for_observers(&state, 0).await;

    // Broadcasting with nobody registered is harmless.
    let result = state
        .ingest
        .submit(
            SubmissionPayload::new(1.0, 1.0),
            SubmitContext::with_timeout(WAIT),
        )
        .await;
    assert!(result.is_ok());

    state.shutdown.cancel();
}

#[tokio::test]
async fn shutdown_closes_open_streams() {
    let memory = MemoryReadingStore::new();
    let (state, addr) = spawn_server(&memory).await;
    let mut client = connect(addr).await;
    next_text(&mut client).await;
    wait_for_observers(&state, 1).await;

    state.shutdown.cancel();

    let ended = tokio::time::timeout(WAIT, async {
        loop {
            match client.next().await {
                Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok());
    wait_for_observers(&state, 0).await;
}
