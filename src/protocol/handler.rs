//! The per-protocol capability seam.
//!
//! The transport core drives any stream-oriented GraphQL wire protocol
//! through this trait; it never branches on the concrete protocol. A
//! handler builds outbound frames, parses inbound frames, and gets a small
//! set of lifecycle hooks around connect and close.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;
use crate::identifiers::QueryId;
use crate::protocol::{ParsedAnswer, Request};
use crate::transport::ConnectionAdapter;

// ============================================================================
// ProtocolHandler
// ============================================================================

/// Frame building, frame parsing, and lifecycle hooks for one wire protocol.
///
/// Query ids are allocated by the transport core; a handler only renders
/// frames for ids it is handed, which keeps id uniqueness a core invariant.
///
/// # Errors from `parse_answer`
///
/// The scope of the returned error decides the blast radius:
///
/// - [`Error::Query`](crate::Error::Query) — delivered to that query's
///   subscription only; the receive loop keeps running.
/// - Any other error — transport-wide; the connection is torn down.
#[async_trait]
pub trait ProtocolHandler: Send + Sync + 'static {
    /// Builds the frame that starts a subscription for `query_id`.
    fn subscribe_frame(&self, query_id: QueryId, request: &Request) -> Result<String>;

    /// Builds the frame that stops the subscription for `query_id`.
    fn stop_frame(&self, query_id: QueryId) -> Result<String>;

    /// Builds the connection-terminate frame sent during clean close.
    ///
    /// Protocols without a terminate message return `None`.
    fn terminate_frame(&self) -> Option<String> {
        None
    }

    /// Parses one raw frame into a routable answer.
    fn parse_answer(&self, frame: &str) -> Result<ParsedAnswer>;

    /// Called right after the socket opens, before [`initialize`].
    ///
    /// [`initialize`]: ProtocolHandler::initialize
    async fn after_connect(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let _ = adapter;
        Ok(())
    }

    /// Runs the connection-level handshake (e.g. init/ack exchange).
    ///
    /// Runs before the receive loop starts, so the handler may call
    /// [`ConnectionAdapter::receive`] directly. The transport bounds this
    /// hook with its acknowledgment timeout and tears the connection down
    /// uncleanly if it fails.
    async fn initialize(&self, adapter: &dyn ConnectionAdapter) -> Result<()>;

    /// Called once the handshake has completed.
    async fn after_initialize(&self) -> Result<()> {
        Ok(())
    }

    /// Called at the start of the close choreography.
    async fn on_close(&self) {}
}
