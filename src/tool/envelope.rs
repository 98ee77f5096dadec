//! Request and response envelopes exchanged with the transport layer.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A single tool invocation as decoded from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolInvocationRequest {
    /// Name of the tool to run
    #[serde(default)]
    pub tool_name: String,
    /// Untyped parameter bag, decoded per tool
    #[serde(
        rename = "params",
        alias = "parameters",
        default,
        deserialize_with = "null_as_empty"
    )]
    pub parameters: Map<String, Value>,
    /// Opaque tracing token echoed in the response
    #[serde(default)]
    pub correlation_id: String,
    /// Optional caller identity
    #[serde(
        rename = "user_id",
        alias = "caller_id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub caller_id: Option<String>,
    /// Optional caller-side timestamp
    #[serde(
        rename = "request_ts",
        alias = "request_timestamp",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub request_timestamp: Option<String>,
    /// Side-channel metadata such as the originating agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Map<String, Value>>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ToolInvocationRequest {
    /// Creates a request with an empty parameter bag.
    pub fn new(tool_name: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters: Map::new(),
            correlation_id: correlation_id.into(),
            caller_id: None,
            request_timestamp: None,
            context: None,
        }
    }

    /// Sets the parameter bag.
    pub fn with_params(mut self, parameters: Map<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the caller ID.
    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }
}

/// Outcome of a dispatch as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// The tool ran and `data` is populated
    Success,
    /// A business error occurred and `error` is populated
    Error,
}

/// Business error carried in an error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Optional structured details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
}

impl ErrorInfo {
    /// No tool is registered under the requested name.
    pub const UNKNOWN_TOOL: &'static str = "UNKNOWN_TOOL";
    /// The parameter bag did not decode or validate.
    pub const INVALID_PARAMS: &'static str = "INVALID_PARAMS";
    /// Generic transport-level code for internal faults.
    pub const INTERNAL_ERROR: &'static str = "INTERNAL_ERROR";

    /// Creates an error without details.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }
}

/// Timing and call counters attached to every response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Milliseconds from dispatch entry to response construction
    pub latency_ms: u64,
    /// Currently identical to `latency_ms`
    pub engine_time_ms: u64,
    /// Calls made to external data sources
    #[serde(default)]
    pub upstream_calls: u32,
}

/// The uniform envelope returned for every dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResponse {
    pub status: ResponseStatus,
    pub tool_name: String,
    pub correlation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub metrics: Metrics,
    pub engine_version: String,
}

impl ToolInvocationResponse {
    /// Builds the envelope for `request`, keeping exactly one of `data` and `error`.
    pub fn from_outcome(
        request: &ToolInvocationRequest,
        outcome: Result<Map<String, Value>, ErrorInfo>,
        metrics: Metrics,
        engine_version: impl Into<String>,
    ) -> Self {
        let (status, data, error) = match outcome {
            Ok(data) => (ResponseStatus::Success, Some(data), None),
            Err(error) => (ResponseStatus::Error, None, Some(error)),
        };

        Self {
            status,
            tool_name: request.tool_name.clone(),
            correlation_id: request.correlation_id.clone(),
            data,
            error,
            metrics,
            engine_version: engine_version.into(),
        }
    }

    /// Returns the error code, if this is an error envelope.
    pub fn error_code(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.code.as_str())
    }
}
