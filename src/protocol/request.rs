//! GraphQL request and result payload types.
//!
//! These are the payloads that travel inside transport frames: the
//! operation a caller submits and the execution results the server streams
//! back. The surrounding frame format is the business of a
//! [`ProtocolHandler`](super::ProtocolHandler) implementation.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Request
// ============================================================================

/// A GraphQL operation to execute or subscribe to.
///
/// # Format
///
/// ```json
/// {
///   "query": "subscription { tick }",
///   "operationName": "Tick",
///   "variables": { "interval": 5 }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    /// The GraphQL document source.
    pub query: String,

    /// Which operation in the document to run, if it contains several.
    #[serde(
        rename = "operationName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub operation_name: Option<String>,

    /// Operation variables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl Request {
    /// Creates a request from a GraphQL document.
    #[inline]
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            operation_name: None,
            variables: None,
        }
    }

    /// Sets the operation name.
    #[inline]
    #[must_use]
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Sets the operation variables.
    #[inline]
    #[must_use]
    pub fn variables(mut self, variables: Value) -> Self {
        self.variables = Some(variables);
        self
    }
}

// ============================================================================
// ExecutionResult
// ============================================================================

/// One GraphQL execution result.
///
/// A subscription yields a sequence of these; `execute` yields exactly one.
/// Per the GraphQL spec a result may carry `data`, `errors`, or both.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExecutionResult {
    /// Result data.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Field-level execution errors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,

    /// Server-defined extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl ExecutionResult {
    /// Returns `true` if the result carries any errors.
    #[inline]
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.errors.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Lenient field accessors for test assertions; missing or mistyped
/// fields coerce to defaults, which is too lossy for the public API.
#[cfg(test)]
impl ExecutionResult {
    pub(crate) fn get_string(&self, key: &str) -> String {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    }

    pub(crate) fn get_u64(&self, key: &str) -> u64 {
        self.data
            .as_ref()
            .and_then(|v| v.get(key))
            .and_then(|v| v.as_u64())
            .unwrap_or_default()
    }
}

// ============================================================================
// GraphQLError
// ============================================================================

/// A single error from a GraphQL response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphQLError {
    /// Error description.
    pub message: String,

    /// Source locations in the document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<ErrorLocation>>,

    /// Response path the error applies to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,

    /// Server-defined extensions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Creates an error with only a message.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: None,
            path: None,
            extensions: None,
        }
    }
}

/// A line/column position in a GraphQL document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorLocation {
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = Request::new("subscription { tick }")
            .operation_name("Tick")
            .variables(json!({ "interval": 5 }));

        let json = serde_json::to_string(&request).expect("serialize");
        assert!(json.contains("\"operationName\":\"Tick\""));
        assert!(json.contains("\"interval\":5"));
    }

    #[test]
    fn test_request_omits_empty_fields() {
        let request = Request::new("{ hero { name } }");
        let json = serde_json::to_string(&request).expect("serialize");
        assert!(!json.contains("operationName"));
        assert!(!json.contains("variables"));
    }

    #[test]
    fn test_execution_result_parse() {
        let json_str = r#"{
            "data": { "tick": 3 },
            "extensions": { "traceId": "abc" }
        }"#;

        let result: ExecutionResult = serde_json::from_str(json_str).expect("parse");
        assert_eq!(result.get_u64("tick"), 3);
        assert!(!result.has_errors());
        assert!(result.extensions.is_some());
    }

    #[test]
    fn test_execution_result_with_errors() {
        let json_str = r#"{
            "data": null,
            "errors": [
                { "message": "boom", "locations": [{ "line": 1, "column": 2 }] }
            ]
        }"#;

        let result: ExecutionResult = serde_json::from_str(json_str).expect("parse");
        assert!(result.has_errors());
        let errors = result.errors.expect("errors");
        assert_eq!(errors[0].message, "boom");
        assert_eq!(
            errors[0].locations.as_ref().expect("locations")[0],
            ErrorLocation { line: 1, column: 2 }
        );
    }

    #[test]
    fn test_get_helpers_on_missing_data() {
        let result = ExecutionResult::default();
        assert_eq!(result.get_string("anything"), "");
        assert_eq!(result.get_u64("anything"), 0);
    }
}
