//! Registry of live observer connections.
//!
//! One [`tokio::sync::Mutex`] guards the member list. It is held for the
//! whole of a broadcast pass, so every observer in a pass sees the same
//! membership and concurrent `add`/`remove` calls wait for the pass to end.
//! Members whose write fails are removed when the pass finishes, then closed.
//!
//! A member can join pending: passes skip it until [`ObserverRegistry::prime`]
//! has sent its first message, which is how a snapshot always reaches a new
//! observer before any live reading does.
//!
//! Connections have no identity of their own: two handles are the same
//! observer exactly when they point at the same allocation
//! ([`Arc::ptr_eq`]).

use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BroadcastError, ObserverSendError};

/// Default upper bound on a single write to one observer.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// A frame written to an observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// A JSON text frame.
    Text(String),
}

type BoxedSink = Pin<Box<dyn Sink<Outbound, Error = ObserverSendError> + Send>>;

/// The write half of one subscriber's duplex channel.
pub struct ObserverConnection {
    label: String,
    sink: Mutex<BoxedSink>,
    closed: CancellationToken,
    write_timeout: Duration,
}

impl std::fmt::Debug for ObserverConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverConnection")
            .field("label", &self.label)
            .field("closed", &self.closed.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl ObserverConnection {
    /// Wrap any frame sink as an observer connection.
    ///
    /// `label` is only used in logs (typically the peer address).
    pub fn new<S>(sink: S, label: impl Into<String>, write_timeout: Duration) -> Arc<Self>
    where
        S: Sink<Outbound> + Send + 'static,
        S::Error: Display,
    {
        let sink = sink.sink_map_err(|e| ObserverSendError::Transport(e.to_string()));
        Arc::new(Self {
            label: label.into(),
            sink: Mutex::new(Box::pin(sink)),
            closed: CancellationToken::new(),
            write_timeout,
        })
    }

    /// Log label for this connection.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Write one frame, bounded by the write timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ObserverSendError::Closed`] after [`close`](Self::close),
    /// [`ObserverSendError::Timeout`] if the write stalls, or
    /// [`ObserverSendError::Transport`] if the sink fails.
    pub async fn send(&self, frame: Outbound) -> Result<(), ObserverSendError> {
        if self.is_closed() {
            return Err(ObserverSendError::Closed);
        }
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.write_timeout, sink.send(frame)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(ObserverSendError::Timeout),
        }
    }

    /// Close the connection: mark it closed and flush a close to the peer.
    ///
    /// Idempotent. Errors while closing are ignored; the peer is gone either
    /// way.
    pub async fn close(&self) {
        if self.closed.is_cancelled() {
            return;
        }
        self.closed.cancel();
        let mut sink = self.sink.lock().await;
        let _ = tokio::time::timeout(self.write_timeout, sink.close()).await;
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }
}

/// Result of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Members written to successfully.
    pub delivered: usize,
    /// Members removed because their write failed.
    pub pruned: usize,
}

/// One registered connection.
#[derive(Debug)]
struct Member {
    conn: Arc<ObserverConnection>,
    /// Cleared while the member waits for its first message; broadcast
    /// passes skip it until [`ObserverRegistry::prime`] has run.
    ready: bool,
}

/// The set of currently connected observers.
#[derive(Debug, Default)]
pub struct ObserverRegistry {
    members: Mutex<Vec<Member>>,
}

impl ObserverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection that takes part in broadcast passes right away.
    ///
    /// Returns `false` (and changes nothing) if this exact handle is already
    /// registered.
    pub async fn add(&self, conn: Arc<ObserverConnection>) -> bool {
        self.insert(conn, true).await
    }

    /// Register a connection that broadcast passes skip until
    /// [`prime`](Self::prime) has delivered its first message.
    ///
    /// Returns `false` if this exact handle is already registered.
    pub async fn add_pending(&self, conn: Arc<ObserverConnection>) -> bool {
        self.insert(conn, false).await
    }

    async fn insert(&self, conn: Arc<ObserverConnection>, ready: bool) -> bool {
        let mut members = self.members.lock().await;
        if members.iter().any(|m| Arc::ptr_eq(&m.conn, &conn)) {
            return false;
        }
        debug!(observer = conn.label(), ready, "Observer registered");
        members.push(Member { conn, ready });
        true
    }

    /// Deregister a connection. Returns `false` if it was not registered.
    pub async fn remove(&self, conn: &Arc<ObserverConnection>) -> bool {
        let mut members = self.members.lock().await;
        let before = members.len();
        members.retain(|m| !Arc::ptr_eq(&m.conn, conn));
        let removed = members.len() < before;
        if removed {
            debug!(observer = conn.label(), "Observer deregistered");
        }
        removed
    }

    /// Whether this exact handle is registered.
    pub async fn contains(&self, conn: &Arc<ObserverConnection>) -> bool {
        self.members
            .lock()
            .await
            .iter()
            .any(|m| Arc::ptr_eq(&m.conn, conn))
    }

    /// Number of registered observers, pending ones included.
    pub async fn len(&self) -> usize {
        self.members.lock().await.len()
    }

    /// Whether no observers are registered.
    pub async fn is_empty(&self) -> bool {
        self.members.lock().await.is_empty()
    }

    /// Run `f` against every ready member while holding the lock.
    ///
    /// Every ready member is visited even if an earlier one fails. Members
    /// whose call failed are removed before the lock is released and closed
    /// afterwards. Pending members are neither visited nor counted.
    pub async fn for_each<F, Fut>(&self, mut f: F) -> PassReport
    where
        F: FnMut(Arc<ObserverConnection>) -> Fut,
        Fut: Future<Output = Result<(), ObserverSendError>>,
    {
        let mut members = self.members.lock().await;
        let mut visited = 0_usize;
        let mut failed: Vec<Arc<ObserverConnection>> = Vec::new();

        for member in members.iter().filter(|m| m.ready) {
            visited = visited.saturating_add(1);
            if let Err(e) = f(Arc::clone(&member.conn)).await {
                debug!(observer = member.conn.label(), error = %e, "Observer write failed");
                failed.push(Arc::clone(&member.conn));
            }
        }

        if !failed.is_empty() {
            members.retain(|m| !failed.iter().any(|gone| Arc::ptr_eq(gone, &m.conn)));
        }
        drop(members);

        for conn in &failed {
            conn.close().await;
        }

        PassReport {
            delivered: visited.saturating_sub(failed.len()),
            pruned: failed.len(),
        }
    }

    /// Run `f` against one member while holding the lock.
    ///
    /// Returns `None` without calling `f` if `conn` is no longer registered.
    /// If `f` fails the member is removed and closed.
    pub async fn send_to<F, Fut>(
        &self,
        conn: &Arc<ObserverConnection>,
        f: F,
    ) -> Option<Result<(), ObserverSendError>>
    where
        F: FnOnce(Arc<ObserverConnection>) -> Fut,
        Fut: Future<Output = Result<(), ObserverSendError>>,
    {
        let mut members = self.members.lock().await;
        if !members.iter().any(|m| Arc::ptr_eq(&m.conn, conn)) {
            return None;
        }

        let result = f(Arc::clone(conn)).await;
        if let Err(e) = &result {
            debug!(observer = conn.label(), error = %e, "Observer write failed");
            members.retain(|m| !Arc::ptr_eq(&m.conn, conn));
            drop(members);
            conn.close().await;
        }
        Some(result)
    }

    /// Deliver a pending member's first message, then let broadcast passes
    /// reach it.
    ///
    /// `f` runs under the lock, so no pass can write to `conn` before `f`
    /// finishes and anything `f` loads is at least as new as every reading
    /// already broadcast. Returns `None` if `conn` is no longer registered.
    /// An [`BroadcastError::Observer`] failure removes and closes the member;
    /// any other failure leaves it registered and ready.
    pub async fn prime<F, Fut, T>(
        &self,
        conn: &Arc<ObserverConnection>,
        f: F,
    ) -> Option<Result<T, BroadcastError>>
    where
        F: FnOnce(Arc<ObserverConnection>) -> Fut,
        Fut: Future<Output = Result<T, BroadcastError>>,
    {
        let mut members = self.members.lock().await;
        let position = members.iter().position(|m| Arc::ptr_eq(&m.conn, conn))?;

        let result = f(Arc::clone(conn)).await;
        if let Err(BroadcastError::Observer(e)) = &result {
            debug!(observer = conn.label(), error = %e, "Observer write failed");
            members.retain(|m| !Arc::ptr_eq(&m.conn, conn));
            drop(members);
            conn.close().await;
        } else if let Some(member) = members.get_mut(position) {
            member.ready = true;
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use futures::channel::mpsc;

    use super::*;

    fn observer(label: &str) -> (Arc<ObserverConnection>, mpsc::UnboundedReceiver<Outbound>) {
        let (tx, rx) = mpsc::unbounded();
        (ObserverConnection::new(tx, label, DEFAULT_WRITE_TIMEOUT), rx)
    }

    fn text(s: &str) -> Outbound {
        Outbound::Text(s.to_owned())
    }

    #[tokio::test]
    async fn add_refuses_duplicate_handles() {
        let registry = ObserverRegistry::new();
        let (conn, _rx) = observer("a");
        assert!(registry.add(Arc::clone(&conn)).await);
        assert!(!registry.add(Arc::clone(&conn)).await);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn identity_is_the_handle_not_the_label() {
        let registry = ObserverRegistry::new();
        let (first, _rx1) = observer("same");
        let (second, _rx2) = observer("same");
        assert!(registry.add(Arc::clone(&first)).await);
        assert!(registry.add(Arc::clone(&second)).await);
        assert_eq!(registry.len().await, 2);
        assert!(registry.remove(&first).await);
        assert!(registry.contains(&second).await);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let registry = ObserverRegistry::new();
        let (conn, _rx) = observer("a");
        registry.add(Arc::clone(&conn)).await;
        assert!(registry.remove(&conn).await);
        assert!(!registry.remove(&conn).await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn for_each_prunes_failures_and_keeps_the_rest() {
        let registry = ObserverRegistry::new();
        let (healthy, mut healthy_rx) = observer("healthy");
        let (broken, broken_rx) = observer("broken");
        let (late, mut late_rx) = observer("late");
        registry.add(Arc::clone(&healthy)).await;
        registry.add(Arc::clone(&broken)).await;
        registry.add(Arc::clone(&late)).await;
        drop(broken_rx);

        let report = registry
            .for_each(|conn| async move { conn.send(text("hello")).await })
            .await;

        assert_eq!(report, PassReport { delivered: 2, pruned: 1 });
        assert!(!registry.contains(&broken).await);
        assert!(broken.is_closed());
        assert_eq!(healthy_rx.next().await, Some(text("hello")));
        // A member after the failing one was still visited in the same pass.
        assert_eq!(late_rx.next().await, Some(text("hello")));
    }

    #[tokio::test]
    async fn send_to_skips_departed_observers() {
        let registry = ObserverRegistry::new();
        let (conn, _rx) = observer("gone");
        let outcome = registry
            .send_to(&conn, |c| async move { c.send(text("x")).await })
            .await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn send_to_prunes_on_failure() {
        let registry = ObserverRegistry::new();
        let (conn, rx) = observer("broken");
        registry.add(Arc::clone(&conn)).await;
        drop(rx);
        let outcome = registry
            .send_to(&conn, |c| async move { c.send(text("x")).await })
            .await;
        assert!(matches!(outcome, Some(Err(ObserverSendError::Transport(_)))));
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn pending_member_is_skipped_until_primed() {
        let registry = ObserverRegistry::new();
        let (live, mut live_rx) = observer("live");
        let (fresh, mut fresh_rx) = observer("fresh");
        registry.add(Arc::clone(&live)).await;
        assert!(registry.add_pending(Arc::clone(&fresh)).await);

        let report = registry
            .for_each(|conn| async move { conn.send(text("before")).await })
            .await;
        assert_eq!(report, PassReport { delivered: 1, pruned: 0 });
        assert_eq!(live_rx.next().await, Some(text("before")));

        let primed = registry
            .prime(&fresh, |c| async move {
                c.send(text("first")).await?;
                Ok(())
            })
            .await;
        assert!(matches!(primed, Some(Ok(()))));

        registry
            .for_each(|conn| async move { conn.send(text("after")).await })
            .await;
        assert_eq!(fresh_rx.next().await, Some(text("first")));
        assert_eq!(fresh_rx.next().await, Some(text("after")));
    }

    #[tokio::test]
    async fn prime_keeps_member_when_loading_fails() {
        let registry = ObserverRegistry::new();
        let (conn, mut rx) = observer("a");
        registry.add_pending(Arc::clone(&conn)).await;

        let primed: Option<Result<(), BroadcastError>> = registry
            .prime(&conn, |_| async move {
                Err(BroadcastError::Store(sensorhub_db::DbError::Unavailable(
                    "down".to_owned(),
                )))
            })
            .await;
        assert!(matches!(primed, Some(Err(BroadcastError::Store(_)))));
        assert!(registry.contains(&conn).await);

        registry
            .for_each(|c| async move { c.send(text("live")).await })
            .await;
        assert_eq!(rx.next().await, Some(text("live")));
    }

    #[tokio::test]
    async fn prime_prunes_on_write_failure() {
        let registry = ObserverRegistry::new();
        let (conn, rx) = observer("broken");
        registry.add_pending(Arc::clone(&conn)).await;
        drop(rx);

        let primed = registry
            .prime(&conn, |c| async move {
                c.send(text("first")).await?;
                Ok(())
            })
            .await;
        assert!(matches!(primed, Some(Err(BroadcastError::Observer(_)))));
        assert!(registry.is_empty().await);
        assert!(conn.is_closed());
    }

    #[tokio::test]
    async fn closed_connection_refuses_writes() {
        let (conn, _rx) = observer("a");
        conn.close().await;
        assert_eq!(conn.send(text("x")).await, Err(ObserverSendError::Closed));
        // Resolves immediately once closed.
        conn.closed().await;
    }
}
