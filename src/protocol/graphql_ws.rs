//! The Apollo `graphql-ws` wire protocol (subscriptions-transport-ws).
//!
//! Frame reference:
//!
//! | Frame | Direction | Purpose |
//! |-------|-----------|---------|
//! | `connection_init` | client → server | Handshake, optional auth payload |
//! | `connection_ack` | server → client | Handshake accepted |
//! | `connection_error` | server → client | Handshake or connection rejected |
//! | `ka` | server → client | Keep-alive |
//! | `start` | client → server | Begin subscription `id` |
//! | `data` | server → client | Execution result for `id` |
//! | `error` | server → client | Execution errors for `id` |
//! | `complete` | server → client | Subscription `id` finished |
//! | `stop` | client → server | Cancel subscription `id` |
//! | `connection_terminate` | client → server | Clean shutdown |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::trace;

use crate::error::{Error, Result};
use crate::identifiers::QueryId;
use crate::protocol::{GraphQLError, ParsedAnswer, ProtocolHandler, Request};
use crate::transport::ConnectionAdapter;

// ============================================================================
// Constants
// ============================================================================

/// WebSocket subprotocol name offered during the HTTP upgrade.
pub const GRAPHQL_WS_SUBPROTOCOL: &str = "graphql-ws";

// ============================================================================
// Wire Frames
// ============================================================================

/// Client-to-server frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame<'a> {
    ConnectionInit {
        #[serde(skip_serializing_if = "Option::is_none")]
        payload: Option<&'a Value>,
    },
    Start {
        id: String,
        payload: &'a Request,
    },
    Stop {
        id: String,
    },
    ConnectionTerminate,
}

/// Server-to-client frames, before routing.
#[derive(Debug, Deserialize)]
struct ServerFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    payload: Option<Value>,
}

// ============================================================================
// GraphQlWs
// ============================================================================

/// [`ProtocolHandler`] for the Apollo `graphql-ws` protocol.
///
/// # Example
///
/// ```ignore
/// use serde_json::json;
///
/// let handler = GraphQlWs::new()
///     .init_payload(json!({ "Authorization": "Bearer ..." }));
/// ```
#[derive(Debug, Default)]
pub struct GraphQlWs {
    /// Payload attached to `connection_init` (commonly auth headers).
    init_payload: Option<Value>,
}

impl GraphQlWs {
    /// Creates a handler with no init payload.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a payload to the `connection_init` frame.
    #[inline]
    #[must_use]
    pub fn init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// Parses the id field of a frame that must carry one.
    fn require_id(frame_type: &str, id: Option<&str>) -> Result<QueryId> {
        let id = id
            .ok_or_else(|| Error::protocol(format!("'{frame_type}' frame without an id")))?;
        id.parse::<QueryId>()
            .map_err(|_| Error::protocol(format!("'{frame_type}' frame with invalid id: {id}")))
    }

    /// Extracts GraphQL errors from an `error` frame payload.
    ///
    /// Servers send either a single error object or a list of them; anything
    /// else is kept verbatim as the error message.
    fn parse_error_payload(payload: Option<Value>) -> Vec<GraphQLError> {
        match payload {
            Some(value) => {
                if let Ok(errors) = serde_json::from_value::<Vec<GraphQLError>>(value.clone()) {
                    errors
                } else if let Ok(error) = serde_json::from_value::<GraphQLError>(value.clone()) {
                    vec![error]
                } else {
                    vec![GraphQLError::new(value.to_string())]
                }
            }
            None => vec![GraphQLError::new("unknown query error")],
        }
    }
}

#[async_trait]
impl ProtocolHandler for GraphQlWs {
    fn subscribe_frame(&self, query_id: QueryId, request: &Request) -> Result<String> {
        let frame = ClientFrame::Start {
            id: query_id.to_string(),
            payload: request,
        };
        Ok(serde_json::to_string(&frame)?)
    }

    fn stop_frame(&self, query_id: QueryId) -> Result<String> {
        let frame = ClientFrame::Stop {
            id: query_id.to_string(),
        };
        Ok(serde_json::to_string(&frame)?)
    }

    fn terminate_frame(&self) -> Option<String> {
        serde_json::to_string(&ClientFrame::ConnectionTerminate).ok()
    }

    fn parse_answer(&self, frame: &str) -> Result<ParsedAnswer> {
        let server_frame: ServerFrame = serde_json::from_str(frame)
            .map_err(|_| Error::protocol(format!("Server did not return a GraphQL frame: {frame}")))?;

        match server_frame.frame_type.as_str() {
            "data" => {
                let query_id = Self::require_id("data", server_frame.id.as_deref())?;
                let payload = server_frame
                    .payload
                    .ok_or_else(|| Error::protocol("'data' frame without a payload"))?;
                let result = serde_json::from_value(payload).map_err(|e| {
                    Error::protocol(format!("'data' frame with invalid payload: {e}"))
                })?;
                Ok(ParsedAnswer::data(query_id, result))
            }
            "error" => {
                let query_id = Self::require_id("error", server_frame.id.as_deref())?;
                Err(Error::query(
                    query_id,
                    Self::parse_error_payload(server_frame.payload),
                ))
            }
            "complete" => {
                let query_id = Self::require_id("complete", server_frame.id.as_deref())?;
                Ok(ParsedAnswer::complete(query_id))
            }
            "ka" => Ok(ParsedAnswer::keep_alive()),
            "connection_ack" => Ok(ParsedAnswer::connection_ack()),
            "connection_error" => Err(Error::server(format!(
                "Connection error: {}",
                server_frame
                    .payload
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "unknown".to_string())
            ))),
            other => Err(Error::protocol(format!("Unknown frame type: {other}"))),
        }
    }

    async fn initialize(&self, adapter: &dyn ConnectionAdapter) -> Result<()> {
        let init = ClientFrame::ConnectionInit {
            payload: self.init_payload.as_ref(),
        };
        adapter.send(serde_json::to_string(&init)?).await?;

        // Keep-alive frames may arrive before the ack; skip them.
        loop {
            let frame = adapter.receive().await?;
            trace!(frame = %frame, "handshake frame");

            let answer = self.parse_answer(&frame)?;
            match answer.answer_type {
                crate::protocol::AnswerType::ConnectionAck => return Ok(()),
                crate::protocol::AnswerType::KeepAlive => continue,
                other => {
                    return Err(Error::protocol(format!(
                        "Expected connection_ack, got {other:?}"
                    )));
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::AnswerType;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_frame_shape() {
        let handler = GraphQlWs::new();
        let request = Request::new("subscription { tick }");
        let frame = handler
            .subscribe_frame(QueryId::new(4), &request)
            .expect("frame");

        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["type"], "start");
        assert_eq!(value["id"], "4");
        assert_eq!(value["payload"]["query"], "subscription { tick }");
    }

    #[test]
    fn test_stop_frame_shape() {
        let handler = GraphQlWs::new();
        let frame = handler.stop_frame(QueryId::new(9)).expect("frame");
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["type"], "stop");
        assert_eq!(value["id"], "9");
    }

    #[test]
    fn test_terminate_frame_shape() {
        let handler = GraphQlWs::new();
        let frame = handler.terminate_frame().expect("frame");
        let value: Value = serde_json::from_str(&frame).expect("json");
        assert_eq!(value["type"], "connection_terminate");
    }

    #[test]
    fn test_parse_data_frame() {
        let handler = GraphQlWs::new();
        let answer = handler
            .parse_answer(r#"{"type":"data","id":"2","payload":{"data":{"tick":1}}}"#)
            .expect("parse");

        assert_eq!(answer.answer_type, AnswerType::Data);
        assert_eq!(answer.query_id, Some(QueryId::new(2)));
        assert_eq!(answer.result.expect("result").get_u64("tick"), 1);
    }

    #[test]
    fn test_parse_complete_frame() {
        let handler = GraphQlWs::new();
        let answer = handler
            .parse_answer(r#"{"type":"complete","id":"2"}"#)
            .expect("parse");
        assert_eq!(answer.answer_type, AnswerType::Complete);
        assert_eq!(answer.query_id, Some(QueryId::new(2)));
    }

    #[test]
    fn test_parse_keep_alive_and_ack() {
        let handler = GraphQlWs::new();
        assert_eq!(
            handler.parse_answer(r#"{"type":"ka"}"#).expect("ka").answer_type,
            AnswerType::KeepAlive
        );
        assert_eq!(
            handler
                .parse_answer(r#"{"type":"connection_ack"}"#)
                .expect("ack")
                .answer_type,
            AnswerType::ConnectionAck
        );
    }

    #[test]
    fn test_error_frame_is_per_query() {
        let handler = GraphQlWs::new();
        let err = handler
            .parse_answer(r#"{"type":"error","id":"7","payload":{"message":"denied"}}"#)
            .expect_err("error");

        assert!(err.is_query_error());
        assert_eq!(err.query_id(), Some(QueryId::new(7)));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_error_frame_with_error_list() {
        let handler = GraphQlWs::new();
        let err = handler
            .parse_answer(
                r#"{"type":"error","id":"1","payload":[{"message":"a"},{"message":"b"}]}"#,
            )
            .expect_err("error");
        assert_eq!(err.to_string(), "Query 1 failed: a; b");
    }

    #[test]
    fn test_connection_error_is_transport_wide() {
        let handler = GraphQlWs::new();
        let err = handler
            .parse_answer(r#"{"type":"connection_error","payload":{"message":"unauthorized"}}"#)
            .expect_err("error");
        assert!(err.is_fatal());
        assert!(!err.is_query_error());
    }

    #[test]
    fn test_unknown_frame_type_fails() {
        let handler = GraphQlWs::new();
        let err = handler
            .parse_answer(r#"{"type":"wat"}"#)
            .expect_err("error");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_data_frame_without_id_fails() {
        let handler = GraphQlWs::new();
        let err = handler
            .parse_answer(r#"{"type":"data","payload":{"data":{}}}"#)
            .expect_err("error");
        assert!(matches!(err, Error::Protocol { .. }));
    }

    #[test]
    fn test_non_json_frame_fails() {
        let handler = GraphQlWs::new();
        assert!(handler.parse_answer("not json at all").is_err());
    }

    #[test]
    fn test_init_payload_serialized() {
        let frame = ClientFrame::ConnectionInit {
            payload: Some(&json!({ "token": "abc" })),
        };
        let value: Value =
            serde_json::from_str(&serde_json::to_string(&frame).expect("frame")).expect("json");
        assert_eq!(value["type"], "connection_init");
        assert_eq!(value["payload"]["token"], "abc");
    }

    proptest! {
        #[test]
        fn prop_data_frame_id_round_trips(id in any::<u64>(), tick in any::<u32>()) {
            let handler = GraphQlWs::new();
            let frame = format!(
                r#"{{"type":"data","id":"{id}","payload":{{"data":{{"tick":{tick}}}}}}}"#
            );
            let answer = handler.parse_answer(&frame).expect("parse");
            prop_assert_eq!(answer.query_id, Some(QueryId::new(id)));
            prop_assert_eq!(answer.result.expect("result").get_u64("tick"), u64::from(tick));
        }
    }
}
