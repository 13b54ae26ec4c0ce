//! GraphQL wire protocol layer.
//!
//! This module defines the payload types shared by every transport and the
//! capability seam a concrete wire protocol implements.
//!
//! # Protocol Overview
//!
//! | Type | Purpose |
//! |------|---------|
//! | [`Request`] | Operation submitted by the caller |
//! | [`ExecutionResult`] | One result streamed back by the server |
//! | [`ParsedAnswer`] | An inbound frame reduced to its routable form |
//! | [`ProtocolHandler`] | Frame building/parsing + lifecycle hooks |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `answer` | Parsed inbound frames |
//! | `graphql_ws` | The Apollo `graphql-ws` wire protocol |
//! | `handler` | The per-protocol capability trait |
//! | `request` | Request and execution result payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Parsed inbound frames.
pub mod answer;

/// The Apollo `graphql-ws` wire protocol.
pub mod graphql_ws;

/// The per-protocol capability trait.
pub mod handler;

/// Request and execution result payloads.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use answer::{AnswerType, ParsedAnswer};
pub use graphql_ws::{GRAPHQL_WS_SUBPROTOCOL, GraphQlWs};
pub use handler::ProtocolHandler;
pub use request::{ErrorLocation, ExecutionResult, GraphQLError, Request};
