//! The consumer-facing subscription stream.
//!
//! A [`Subscription`] is a lazy, single-pass sequence of execution results
//! for one query. It ends cleanly when the server completes the query,
//! yields the error and ends when one is delivered, and cleans up after
//! itself on every exit path — including an early drop mid-stream.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures_util::Stream;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::Result;
use crate::identifiers::QueryId;
use crate::protocol::{AnswerType, ExecutionResult};

use super::listener::ListenerItem;

// ============================================================================
// ListenerRegistry
// ============================================================================

/// What a subscription needs from the transport that spawned it.
#[async_trait]
pub(crate) trait ListenerRegistry: Send + Sync + 'static {
    /// Removes the listener entry for `query_id`.
    ///
    /// Returns `true` when a stop frame is still owed to the server.
    /// Removing the last listener raises the "no more listeners" signal.
    fn unregister(&self, query_id: QueryId) -> bool;

    /// Sends the stop frame for an already-unregistered query. Best effort:
    /// failures are logged, never raised.
    async fn send_stop(&self, query_id: QueryId);
}

// ============================================================================
// Subscription
// ============================================================================

/// Lazy sequence of [`ExecutionResult`]s for one subscription.
///
/// Implements [`Stream`]; iterate with `StreamExt::next`:
///
/// ```ignore
/// use futures_util::StreamExt;
///
/// let mut ticks = transport.subscribe(Request::new("subscription { tick }")).await?;
/// while let Some(result) = ticks.next().await {
///     println!("{:?}", result?.data);
/// }
/// ```
///
/// Dropping the stream early unregisters the listener and, if the server
/// still owes answers, sends one stop frame for the query. Call
/// [`Subscription::stop`] instead when you want the stop frame on the wire
/// before continuing.
pub struct Subscription {
    query_id: QueryId,
    rx: mpsc::UnboundedReceiver<ListenerItem>,
    registry: Arc<dyn ListenerRegistry>,
    /// A terminal item was yielded; the sequence is over.
    done: bool,
    /// The listener entry has been removed from the transport.
    detached: bool,
}

impl Subscription {
    pub(crate) fn new(
        query_id: QueryId,
        rx: mpsc::UnboundedReceiver<ListenerItem>,
        registry: Arc<dyn ListenerRegistry>,
    ) -> Self {
        Self {
            query_id,
            rx,
            registry,
            done: false,
            detached: false,
        }
    }

    /// The query id this subscription is multiplexed under.
    #[inline]
    #[must_use]
    pub fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Stops the subscription, sending the stop frame if one is owed.
    ///
    /// Prefer this over dropping when you need the cancellation on the wire
    /// before proceeding; drop only schedules it.
    pub async fn stop(mut self) {
        if !self.detached {
            self.detached = true;
            if self.registry.unregister(self.query_id) {
                self.registry.send_stop(self.query_id).await;
            }
        }
    }

    /// Removes the listener entry after a terminal item.
    ///
    /// `send_stop` was already cleared when the terminal item was queued,
    /// so no frame goes out here.
    fn detach_terminal(&mut self) {
        if !self.detached {
            self.detached = true;
            let owed = self.registry.unregister(self.query_id);
            debug_assert!(!owed, "terminal item left send_stop set");
        }
    }
}

// The registry handle is an unnameable trait object; render the rest.
impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("query_id", &self.query_id)
            .field("done", &self.done)
            .field("detached", &self.detached)
            .finish_non_exhaustive()
    }
}

impl Stream for Subscription {
    type Item = Result<ExecutionResult>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if this.done {
                return Poll::Ready(None);
            }

            match this.rx.poll_recv(cx) {
                Poll::Ready(Some(ListenerItem::Answer {
                    answer_type: AnswerType::Data,
                    result,
                })) => return Poll::Ready(Some(Ok(result.unwrap_or_default()))),

                Poll::Ready(Some(ListenerItem::Answer {
                    answer_type: AnswerType::Complete,
                    ..
                })) => {
                    this.done = true;
                    this.detach_terminal();
                    return Poll::Ready(None);
                }

                // Handshake-level tags never reach a listener queue.
                Poll::Ready(Some(ListenerItem::Answer { .. })) => continue,

                Poll::Ready(Some(ListenerItem::Exception(error))) => {
                    this.done = true;
                    this.detach_terminal();
                    return Poll::Ready(Some(Err(error)));
                }

                Poll::Ready(None) => {
                    this.done = true;
                    return Poll::Ready(None);
                }

                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if self.detached {
            return;
        }
        self.detached = true;

        if self.registry.unregister(self.query_id) {
            // The stop frame needs an await; hand it to the runtime. Outside
            // a runtime there is no connection left to notify anyway.
            let registry = Arc::clone(&self.registry);
            let query_id = self.query_id;
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                debug!(%query_id, "subscription dropped early, scheduling stop frame");
                handle.spawn(async move {
                    registry.send_stop(query_id).await;
                });
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
