//! GraphQL subscription client over persistent connections.
//!
//! This library maintains one stateful connection to a GraphQL server and
//! multiplexes any number of concurrent subscriptions over it, each
//! delivered as an async stream of execution results.
//!
//! # Architecture
//!
//! The transport follows a demultiplexing model:
//!
//! - **One connection**: a single WebSocket carries every operation
//! - **One receive loop**: the sole reader, routing answers by query id
//! - **N subscriptions**: each a [`Subscription`] stream with its own queue
//!
//! Key design principles:
//!
//! - Listener registration happens before the start frame is sent, so no
//!   answer can race its own subscription
//! - Transport-wide failures fan out to every active subscription;
//!   per-query errors stay scoped to one
//! - The close choreography runs as an independent task and always runs
//!   to completion once started
//!
//! # Quick Start
//!
//! ```no_run
//! use futures_util::StreamExt;
//! use graphql_live::{Request, Result, SubscriptionTransport, TransportConfig};
//! use url::Url;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let url = Url::parse("wss://example.com/graphql").expect("url");
//!     let transport = SubscriptionTransport::graphql_ws(url, TransportConfig::default());
//!     transport.connect().await?;
//!
//!     let mut ticks = transport
//!         .subscribe(Request::new("subscription { tick }"))
//!         .await?;
//!     while let Some(result) = ticks.next().await {
//!         println!("{:?}", result?.data);
//!     }
//!
//!     transport.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire protocol: payloads, frames, handshake |
//! | [`transport`] | Connection state machine and subscription streams |

// ============================================================================
// Modules
// ============================================================================

/// Error types and Result alias.
pub mod error;

/// Type-safe ID wrappers.
pub mod identifiers;

/// Wire protocol: payloads, frames, handshake.
pub mod protocol;

/// Connection state machine and subscription streams.
///
/// The entry point is [`SubscriptionTransport`].
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, Result};
pub use identifiers::QueryId;
pub use protocol::{
    ExecutionResult, GRAPHQL_WS_SUBPROTOCOL, GraphQLError, GraphQlWs, ProtocolHandler, Request,
};
pub use transport::{
    ConnectionAdapter, Subscription, SubscriptionTransport, TransportConfig, WsConnection,
};
