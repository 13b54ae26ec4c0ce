//! Subscription transport layer.
//!
//! This module multiplexes GraphQL subscriptions over one stateful
//! connection.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  subscribe()   ┌──────────────────────┐
//! │  Caller      │───────────────►│ SubscriptionTransport │
//! │              │◄───Stream──────│                      │
//! └──────────────┘                │  receive loop ───────┼──► listeners map
//!                                 │  keep-alive loop     │    (id → queue)
//!                                 └──────────┬───────────┘
//!                                            │ ConnectionAdapter
//!                                            ▼
//!                                       WebSocket
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `SubscriptionTransport::connect` - open the adapter, run the
//!    protocol handshake, spawn the receive loop
//! 2. `subscribe` / `execute` - register a listener, send the start frame
//! 3. Receive loop routes every inbound answer to its listener by query id
//! 4. `close` - cancel outstanding queries on the server, tear down
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `adapter` | Physical connection seam and the WebSocket adapter |
//! | `core` | The transport state machine |
//! | `listener` | Per-subscription answer queues |
//! | `subscription` | Consumer-facing result stream |

// ============================================================================
// Submodules
// ============================================================================

/// Physical connection seam and the WebSocket adapter.
pub mod adapter;

/// The transport state machine.
pub mod core;

/// Per-subscription answer queues.
mod listener;

/// Consumer-facing result stream.
pub mod subscription;

// ============================================================================
// Re-exports
// ============================================================================

pub use adapter::{ConnectionAdapter, WsConnection};
pub use core::{SubscriptionTransport, TransportConfig};
pub use subscription::Subscription;
