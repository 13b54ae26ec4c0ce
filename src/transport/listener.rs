//! Per-subscription listener queues.
//!
//! Each active subscription owns exactly one listener: a FIFO queue of
//! answers ending in either a `Complete` tag or an error. The transport
//! core holds the sending half in its listeners map; the consumer's
//! [`Subscription`](super::Subscription) drains the receiving half.
//!
//! Invariant: once a listener is closed (a `Complete` was routed or an
//! error was delivered), nothing further is enqueued.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::mpsc;

use crate::error::Error;
use crate::identifiers::QueryId;
use crate::protocol::{AnswerType, ExecutionResult};

// ============================================================================
// ListenerItem
// ============================================================================

/// One queued item: a tagged answer or a terminal error.
#[derive(Debug)]
pub(crate) enum ListenerItem {
    /// A routed answer.
    Answer {
        /// The answer tag.
        answer_type: AnswerType,
        /// The execution result, for data answers.
        result: Option<ExecutionResult>,
    },
    /// A terminal error; the queue is closed after this.
    Exception(Error),
}

// ============================================================================
// ListenerQueue
// ============================================================================

/// The core-side half of one subscription's queue.
#[derive(Debug)]
pub(crate) struct ListenerQueue {
    query_id: QueryId,
    tx: mpsc::UnboundedSender<ListenerItem>,
    /// Whether a stop frame must still be sent to the server for this query.
    pub(crate) send_stop: bool,
    closed: bool,
}

impl ListenerQueue {
    /// Creates a listener and the receiver its consumer will drain.
    pub(crate) fn new(query_id: QueryId) -> (Self, mpsc::UnboundedReceiver<ListenerItem>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                query_id,
                tx,
                send_stop: true,
                closed: false,
            },
            rx,
        )
    }

    /// The query this listener belongs to.
    #[inline]
    pub(crate) fn query_id(&self) -> QueryId {
        self.query_id
    }

    /// Whether a terminal item has been delivered.
    #[inline]
    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Enqueues an answer. No-op once closed.
    ///
    /// Routing a `Complete` answer clears `send_stop` (the server has
    /// already finished the query, nothing to cancel) and closes the queue.
    pub(crate) fn put(&mut self, answer_type: AnswerType, result: Option<ExecutionResult>) {
        if self.closed {
            return;
        }

        // Consumer gone: the entry is about to be unregistered, drop the item.
        let _ = self.tx.send(ListenerItem::Answer {
            answer_type,
            result,
        });

        if answer_type == AnswerType::Complete {
            self.send_stop = false;
            self.closed = true;
        }
    }

    /// Delivers a terminal error and closes the queue. No-op once closed.
    pub(crate) fn set_exception(&mut self, error: Error) {
        if self.closed {
            return;
        }

        let _ = self.tx.send(ListenerItem::Exception(error));
        self.send_stop = false;
        self.closed = true;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ListenerItem>) -> Vec<ListenerItem> {
        let mut items = Vec::new();
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    #[test]
    fn test_fifo_order() {
        let (mut listener, mut rx) = ListenerQueue::new(QueryId::new(1));

        for tick in 0..3u64 {
            let result = ExecutionResult {
                data: Some(serde_json::json!({ "tick": tick })),
                ..Default::default()
            };
            listener.put(AnswerType::Data, Some(result));
        }

        let items = drain(&mut rx);
        assert_eq!(items.len(), 3);
        for (tick, item) in items.iter().enumerate() {
            match item {
                ListenerItem::Answer { result, .. } => {
                    assert_eq!(result.as_ref().expect("result").get_u64("tick"), tick as u64);
                }
                ListenerItem::Exception(_) => panic!("unexpected exception"),
            }
        }
    }

    #[test]
    fn test_complete_clears_send_stop_and_closes() {
        let (mut listener, mut rx) = ListenerQueue::new(QueryId::new(1));
        assert!(listener.send_stop);

        listener.put(AnswerType::Complete, None);
        assert!(!listener.send_stop);
        assert!(listener.is_closed());

        // Nothing more gets through.
        listener.put(AnswerType::Data, Some(ExecutionResult::default()));
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[test]
    fn test_exception_closes() {
        let (mut listener, mut rx) = ListenerQueue::new(QueryId::new(1));
        listener.set_exception(Error::server("fatal"));

        assert!(listener.is_closed());
        assert!(!listener.send_stop);

        // Second terminal item is dropped.
        listener.set_exception(Error::server("again"));
        let items = drain(&mut rx);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], ListenerItem::Exception(_)));
    }

    #[test]
    fn test_put_after_consumer_dropped_is_silent() {
        let (mut listener, rx) = ListenerQueue::new(QueryId::new(1));
        drop(rx);
        listener.put(AnswerType::Data, Some(ExecutionResult::default()));
        assert!(!listener.is_closed());
    }
}
