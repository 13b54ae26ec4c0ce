//! Parsed inbound frames.
//!
//! The receive loop hands every raw frame to the protocol handler, which
//! reduces it to a [`ParsedAnswer`]: a tag, an optional query id to route
//! by, and an optional execution result.

// ============================================================================
// Imports
// ============================================================================

use crate::identifiers::QueryId;
use crate::protocol::ExecutionResult;

// ============================================================================
// AnswerType
// ============================================================================

/// Tag of one inbound answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerType {
    /// An execution result for a subscription.
    Data,
    /// The server finished a subscription; no more answers will follow.
    Complete,
    /// Liveness frame; resets the keep-alive window.
    KeepAlive,
    /// Handshake acknowledgment.
    ConnectionAck,
}

// ============================================================================
// ParsedAnswer
// ============================================================================

/// One inbound frame, reduced to its routable form.
#[derive(Debug, Clone)]
pub struct ParsedAnswer {
    /// What kind of answer this is.
    pub answer_type: AnswerType,
    /// Which subscription it belongs to, if any.
    pub query_id: Option<QueryId>,
    /// The execution result, for `Data` answers.
    pub result: Option<ExecutionResult>,
}

impl ParsedAnswer {
    /// Creates a data answer for a subscription.
    #[inline]
    #[must_use]
    pub fn data(query_id: QueryId, result: ExecutionResult) -> Self {
        Self {
            answer_type: AnswerType::Data,
            query_id: Some(query_id),
            result: Some(result),
        }
    }

    /// Creates a completion answer for a subscription.
    #[inline]
    #[must_use]
    pub fn complete(query_id: QueryId) -> Self {
        Self {
            answer_type: AnswerType::Complete,
            query_id: Some(query_id),
            result: None,
        }
    }

    /// Creates a keep-alive answer.
    #[inline]
    #[must_use]
    pub fn keep_alive() -> Self {
        Self {
            answer_type: AnswerType::KeepAlive,
            query_id: None,
            result: None,
        }
    }

    /// Creates a connection acknowledgment answer.
    #[inline]
    #[must_use]
    pub fn connection_ack() -> Self {
        Self {
            answer_type: AnswerType::ConnectionAck,
            query_id: None,
            result: None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
