//! The request queue between submitting producers and the single writer.
//!
//! Each submission becomes a [`Request`] carrying its payload, a
//! [`SubmitContext`] (deadline plus cancellation), and a capacity-one reply
//! slot. Producers hold a cloneable [`IngestHandle`]; the writer owns the
//! only [`RequestReceiver`].
//!
//! ```text
//! HTTP handler --submit--> [unbounded mpsc] --accept--> Writer
//!      ^                                                  |
//!      +------------- oneshot reply (exactly once) -------+
//! ```
//!
//! The queue never reorders, prioritises, or drops. The reply slot is a
//! [`oneshot`] channel, so the writer's reply never blocks and silently
//! succeeds or fails depending on whether the producer is still waiting.

use std::time::Duration;

use sensorhub_types::{ReadingId, SubmissionPayload};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use validator::Validate;

use crate::error::IngestError;

/// Outcome delivered to a producer: the stored reading's id or the reason it
/// was not stored.
pub type Response = Result<ReadingId, IngestError>;

/// Deadline and cancellation signal for one submission.
#[derive(Debug, Clone)]
pub struct SubmitContext {
    deadline: Instant,
    cancel: CancellationToken,
}

impl SubmitContext {
    /// A context that expires `timeout` from now and is never cancelled.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, CancellationToken::new())
    }

    /// A context that expires `timeout` from now or when `cancel` fires.
    ///
    /// A timeout too large to represent as an instant expires immediately.
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        let now = Instant::now();
        Self {
            deadline: now.checked_add(timeout).unwrap_or(now),
            cancel,
        }
    }

    /// The instant after which the caller stops waiting.
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// The caller's cancellation token.
    pub const fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// The failure this context has already produced, if any.
    pub fn expired(&self) -> Option<IngestError> {
        if self.cancel.is_cancelled() {
            Some(IngestError::Cancelled)
        } else if Instant::now() >= self.deadline {
            Some(IngestError::Timeout)
        } else {
            None
        }
    }
}

/// One admitted submission, consumed exactly once by the writer.
#[derive(Debug)]
pub struct Request {
    payload: SubmissionPayload,
    context: SubmitContext,
    reply: oneshot::Sender<Response>,
}

impl Request {
    /// The submitted values.
    pub const fn payload(&self) -> &SubmissionPayload {
        &self.payload
    }

    /// The submitting caller's context.
    pub const fn context(&self) -> &SubmitContext {
        &self.context
    }

    /// Deliver the response, consuming the request.
    ///
    /// Returns `false` if the producer had already stopped waiting. The
    /// reply is then dropped; that is not an error.
    pub fn respond(self, response: Response) -> bool {
        self.reply.send(response).is_ok()
    }
}

/// Create a connected producer handle and writer-side receiver.
pub fn channel() -> (IngestHandle, RequestReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (IngestHandle { tx }, RequestReceiver { rx })
}

/// Producer side of the queue. Cheap to clone; one per HTTP handler.
#[derive(Debug, Clone)]
pub struct IngestHandle {
    tx: mpsc::UnboundedSender<Request>,
}

impl IngestHandle {
    /// Validate, enqueue, and wait for the writer's response.
    ///
    /// The wait races the reply against the context's deadline and
    /// cancellation. If the context fires first the caller gets
    /// [`IngestError::Timeout`] or [`IngestError::Cancelled`] immediately;
    /// the request stays queued and is still persisted, its reply discarded.
    ///
    /// # Errors
    ///
    /// - [`IngestError::Validation`] if the payload is out of range (never
    ///   enqueued)
    /// - [`IngestError::Timeout`] / [`IngestError::Cancelled`] as above, or
    ///   if the context had already fired before submission (never enqueued)
    /// - [`IngestError::WriterUnavailable`] if the writer has stopped
    /// - [`IngestError::Persistence`] if the store rejected the write
    pub async fn submit(
        &self,
        payload: SubmissionPayload,
        context: SubmitContext,
    ) -> Result<ReadingId, IngestError> {
        payload
            .validate()
            .map_err(|e| IngestError::Validation(e.to_string()))?;

        if let Some(err) = context.expired() {
            return Err(err);
        }

        let deadline = context.deadline();
        let cancel = context.cancel_token().clone();
        let (reply, mut reply_rx) = oneshot::channel();

        let request = Request {
            payload,
            context,
            reply,
        };
        if self.tx.send(request).is_err() {
            return Err(IngestError::WriterUnavailable);
        }

        tokio::select! {
            biased;
            reply = &mut reply_rx => match reply {
                Ok(response) => response,
                // The writer dropped the request without replying.
                Err(_) => Err(IngestError::WriterUnavailable),
            },
            () = cancel.cancelled() => {
                debug!("Submission cancelled while awaiting writer");
                Err(IngestError::Cancelled)
            }
            () = tokio::time::sleep_until(deadline) => {
                debug!("Submission deadline elapsed while awaiting writer");
                Err(IngestError::Timeout)
            }
        }
    }

    /// Whether the writer has stopped accepting requests.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue, owned by the writer.
#[derive(Debug)]
pub struct RequestReceiver {
    rx: mpsc::UnboundedReceiver<Request>,
}

impl RequestReceiver {
    /// Wait for the next request in arrival order.
    ///
    /// Returns `None` once every [`IngestHandle`] has been dropped and the
    /// queue is drained.
    pub async fn accept(&mut self) -> Option<Request> {
        self.rx.recv().await
    }

    /// Number of requests waiting to be accepted.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SubmissionPayload {
        SubmissionPayload::new(21.5, 40.0)
    }

    #[tokio::test]
    async fn invalid_payload_is_never_enqueued() {
        let (handle, receiver) = channel();
        let result = handle
            .submit(
                SubmissionPayload::new(21.5, 150.0),
                SubmitContext::with_timeout(Duration::from_secs(1)),
            )
            .await;
        assert!(matches!(result, Err(IngestError::Validation(_))));
        assert_eq!(receiver.pending(), 0);
    }

    #[tokio::test]
    async fn cancelled_context_is_never_enqueued() {
        let (handle, receiver) = channel();
        let token = CancellationToken::new();
        token.cancel();
        let result = handle
            .submit(payload(), SubmitContext::new(Duration::from_secs(1), token))
            .await;
        assert!(matches!(result, Err(IngestError::Cancelled)));
        assert_eq!(receiver.pending(), 0);
    }

    #[tokio::test]
    async fn closed_queue_reports_writer_unavailable() {
        let (handle, receiver) = channel();
        drop(receiver);
        assert!(handle.is_closed());
        let result = handle
            .submit(payload(), SubmitContext::with_timeout(Duration::from_secs(1)))
            .await;
        assert!(matches!(result, Err(IngestError::WriterUnavailable)));
    }

    #[tokio::test]
    async fn reply_reaches_waiting_producer() {
        let (handle, mut receiver) = channel();
        let id = ReadingId::new();
        let consumer = tokio::spawn(async move {
            let request = receiver.accept().await;
            request.map(|r| r.respond(Ok(id)))
        });
        let result = handle
            .submit(payload(), SubmitContext::with_timeout(Duration::from_secs(5)))
            .await;
        assert_eq!(result.ok(), Some(id));
        assert_eq!(consumer.await.ok().flatten(), Some(true));
    }

    #[tokio::test]
    async fn dropped_request_reports_writer_unavailable() {
        let (handle, mut receiver) = channel();
        let consumer = tokio::spawn(async move {
            drop(receiver.accept().await);
        });
        let result = handle
            .submit(payload(), SubmitContext::with_timeout(Duration::from_secs(5)))
            .await;
        assert!(matches!(result, Err(IngestError::WriterUnavailable)));
        let _ = consumer.await;
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_elapses_and_late_reply_is_orphaned() {
        let (handle, mut receiver) = channel();
        let result = handle
            .submit(payload(), SubmitContext::with_timeout(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(IngestError::Timeout)));

        // The request is still queued and can be answered harmlessly.
        let request = receiver.accept().await;
        assert!(request.is_some());
        let delivered = request.map(|r| r.respond(Ok(ReadingId::new())));
        assert_eq!(delivered, Some(false));
    }

    #[tokio::test]
    async fn queue_preserves_arrival_order() {
        let (handle, mut receiver) = channel();
        for i in 0..3_i32 {
            let handle = handle.clone();
            // Fire and forget: the producers give up after 10ms.
            let _ = tokio::spawn(async move {
                handle
                    .submit(
                        SubmissionPayload::new(f64::from(i), 1.0),
                        SubmitContext::with_timeout(Duration::from_millis(10)),
                    )
                    .await
            })
            .await;
        }
        let mut seen = Vec::new();
        while receiver.pending() > 0 {
            if let Some(request) = receiver.accept().await {
                seen.push(request.payload().temperature);
            }
        }
        assert_eq!(seen, vec![0.0, 1.0, 2.0]);
    }
}
