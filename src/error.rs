//! Error types for the GraphQL subscription client.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use graphql_live::{Request, Result};
//!
//! async fn example(transport: &impl Transport) -> Result<()> {
//!     let result = transport.execute(Request::new("{ hero { name } }")).await?;
//!     println!("{:?}", result.data);
//!     Ok(())
//! }
//! ```
//!
//! # Error Scope
//!
//! Errors split into two groups that behave very differently:
//!
//! | Scope | Variants | Effect |
//! |-------|----------|--------|
//! | Transport-wide | [`Error::Connection`], [`Error::ConnectTimeout`], [`Error::Protocol`], [`Error::Server`] | Closes the whole transport; fanned out to every active subscription |
//! | Per-query | [`Error::Query`] | Delivered only to the owning subscription; the transport stays open |
//!
//! The enum is `Clone` so a single close reason can be delivered to N
//! listeners and retained for late callers; foreign errors (socket, JSON)
//! are captured as messages at the boundary where they occur.

// ============================================================================
// Imports
// ============================================================================

use std::result::Result as StdResult;

use thiserror::Error;

use crate::identifiers::QueryId;
use crate::protocol::GraphQLError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug, Clone)]
pub enum Error {
    // ========================================================================
    // Lifecycle Errors
    // ========================================================================
    /// Transport is already connected or a connect is in progress.
    #[error("Transport is already connected")]
    AlreadyConnected,

    /// Operation attempted before the transport was connected.
    #[error("Transport is not connected")]
    NotConnected,

    /// Operation attempted after the transport was torn down.
    ///
    /// Carries the recorded close reason as source, so late callers see
    /// the original failure instead of a generic "closed" message.
    #[error("Transport is closed: {reason}")]
    Closed {
        /// Why the transport closed.
        #[source]
        reason: Box<Error>,
    },

    /// The transport was closed by an explicit `close()` call.
    #[error("Transport closed by user")]
    ClosedByUser,

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection-level failure (socket error, remote close, EOF).
    ///
    /// Transport-wide: triggers an unclean close.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Timed out establishing the connection.
    #[error("Connect timeout after {timeout_ms}ms")]
    ConnectTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A bounded operation exceeded its timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // Protocol / Server Errors
    // ========================================================================
    /// Malformed or unexpected frame.
    ///
    /// Transport-wide: the receive loop cannot trust the stream anymore.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    /// Server-reported failure (connection error frame, missed keep-alive).
    ///
    /// Transport-wide.
    #[error("Server error: {message}")]
    Server {
        /// Description of the server error.
        message: String,
    },

    /// GraphQL execution errors scoped to a single query.
    ///
    /// Delivered only to the subscription owning `query_id`; all other
    /// subscriptions and the connection itself are unaffected.
    #[error("Query {query_id} failed: {}", join_messages(.errors))]
    Query {
        /// The query the errors belong to.
        query_id: QueryId,
        /// The GraphQL errors returned by the server.
        errors: Vec<GraphQLError>,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// JSON serialization or deserialization failure.
    #[error("JSON error: {message}")]
    Json {
        /// Description of the JSON error.
        message: String,
    },
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connect timeout error.
    #[inline]
    pub fn connect_timeout(timeout_ms: u64) -> Self {
        Self::ConnectTimeout { timeout_ms }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a server error.
    #[inline]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Creates a per-query error from GraphQL errors.
    #[inline]
    pub fn query(query_id: QueryId, errors: Vec<GraphQLError>) -> Self {
        Self::Query { query_id, errors }
    }

    /// Creates a per-query error from a single message.
    #[inline]
    pub fn query_message(query_id: QueryId, message: impl Into<String>) -> Self {
        Self::Query {
            query_id,
            errors: vec![GraphQLError::new(message)],
        }
    }

    /// Creates a use-after-close error wrapping the recorded reason.
    #[inline]
    pub fn closed(reason: Error) -> Self {
        Self::Closed {
            reason: Box::new(reason),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this error closes the whole transport.
    ///
    /// Per-query errors and lifecycle errors are not fatal.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectTimeout { .. }
                | Self::Protocol { .. }
                | Self::Server { .. }
        )
    }

    /// Returns `true` if this is a per-query error.
    #[inline]
    #[must_use]
    pub fn is_query_error(&self) -> bool {
        matches!(self, Self::Query { .. })
    }

    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::ConnectTimeout { .. } | Self::Timeout { .. })
    }

    /// Returns the query id for per-query errors.
    #[inline]
    #[must_use]
    pub fn query_id(&self) -> Option<QueryId> {
        match self {
            Self::Query { query_id, .. } => Some(*query_id),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

/// Joins GraphQL error messages for display.
fn join_messages(errors: &[GraphQLError]) -> String {
    errors
        .iter()
        .map(|e| e.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::connection("socket reset");
        assert_eq!(err.to_string(), "Connection failed: socket reset");
    }

    #[test]
    fn test_closed_carries_reason() {
        let err = Error::closed(Error::server("no keep-alive"));
        assert_eq!(
            err.to_string(),
            "Transport is closed: Server error: no keep-alive"
        );

        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "Server error: no keep-alive");
    }

    #[test]
    fn test_query_error_display() {
        let query_id = QueryId::new(3);
        let err = Error::query(
            query_id,
            vec![
                GraphQLError::new("field does not exist"),
                GraphQLError::new("syntax error"),
            ],
        );
        assert_eq!(
            err.to_string(),
            "Query 3 failed: field does not exist; syntax error"
        );
        assert_eq!(err.query_id(), Some(query_id));
    }

    #[test]
    fn test_is_fatal() {
        assert!(Error::protocol("bad frame").is_fatal());
        assert!(Error::server("boom").is_fatal());
        assert!(Error::connection("reset").is_fatal());
        assert!(!Error::query_message(QueryId::new(1), "scoped").is_fatal());
        assert!(!Error::ClosedByUser.is_fatal());
    }

    #[test]
    fn test_is_timeout() {
        assert!(Error::connect_timeout(5000).is_timeout());
        assert!(Error::timeout("init handshake", 1000).is_timeout());
        assert!(!Error::NotConnected.is_timeout());
    }

    #[test]
    fn test_clone_fanout() {
        let err = Error::server("fatal");
        let copies: Vec<Error> = (0..3).map(|_| err.clone()).collect();
        for copy in copies {
            assert_eq!(copy.to_string(), err.to_string());
        }
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json { .. }));
    }
}
