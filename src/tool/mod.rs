pub mod dispatcher;
pub mod envelope;
pub mod registry;

pub use dispatcher::{DispatchError, ToolDispatcher};
pub use envelope::{ErrorInfo, Metrics, ResponseStatus, ToolInvocationRequest, ToolInvocationResponse};
pub use registry::ToolRegistry;
pub use tool_trait::{DynTool, Tool, TypedTool, decode_params};
pub use tool_types::{ExecutionContext, ToolDefinition, ToolError};

mod tool_types {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_util::sync::CancellationToken;

    /// Definition of a tool that can be invoked through the dispatcher.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct ToolDefinition {
        /// The name of the tool
        pub name: String,
        /// A description of what the tool does
        pub description: String,
        /// JSON Schema for the tool's input parameters
        pub input_schema: Value,
    }

    /// Errors a tool can report back to the dispatcher.
    #[derive(Debug, thiserror::Error)]
    pub enum ToolError {
        /// The parameters could not be decoded or failed validation.
        #[error("{0}")]
        InvalidParams(String),
        /// The tool ran and reported a business failure.
        #[error("{0}")]
        Failed(String),
        /// The tool misbehaved in a way that is not a business condition.
        #[error("internal tool error: {0}")]
        Internal(String),
    }

    /// Per-invocation context handed to a tool.
    #[derive(Debug, Clone)]
    pub struct ExecutionContext {
        /// The correlation ID of the originating request
        pub correlation_id: String,
        /// The caller, if the request named one
        pub caller_id: Option<String>,
        cancel: CancellationToken,
        upstream_calls: Arc<AtomicU32>,
    }

    impl ExecutionContext {
        /// Creates a context with a fresh cancellation token.
        pub fn new(correlation_id: impl Into<String>) -> Self {
            Self {
                correlation_id: correlation_id.into(),
                caller_id: None,
                cancel: CancellationToken::new(),
                upstream_calls: Arc::new(AtomicU32::new(0)),
            }
        }

        /// Sets the caller ID.
        pub fn with_caller(mut self, caller_id: Option<String>) -> Self {
            self.caller_id = caller_id;
            self
        }

        /// Replaces the cancellation token.
        pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
            self.cancel = cancel;
            self
        }

        /// Token that fires when the caller gives up on this invocation.
        pub fn cancellation(&self) -> &CancellationToken {
            &self.cancel
        }

        /// Records one call to an external data source.
        pub fn record_upstream_call(&self) {
            self.upstream_calls.fetch_add(1, Ordering::Relaxed);
        }

        /// Number of upstream calls recorded so far.
        pub fn upstream_calls(&self) -> u32 {
            self.upstream_calls.load(Ordering::Relaxed)
        }
    }
}

mod tool_trait {
    use super::tool_types::{ExecutionContext, ToolDefinition, ToolError};
    use async_trait::async_trait;
    use schemars::JsonSchema;
    use serde::Serialize;
    use serde::de::DeserializeOwned;
    use serde_json::{Map, Value};
    use std::sync::Arc;

    /// Decodes an untyped parameter bag into a tool's parameter struct.
    ///
    /// The map is treated as the serialized form of `P`: fields are matched by
    /// name and values coerced by serde. Every tool goes through this routine.
    pub fn decode_params<P: DeserializeOwned>(params: Map<String, Value>) -> Result<P, serde_json::Error> {
        serde_json::from_value(Value::Object(params))
    }

    /// Object-safe view of a tool, as stored in the registry.
    #[async_trait]
    pub trait Tool: Send + Sync {
        /// Returns the name of the tool.
        fn name(&self) -> &str;
        /// Returns a description of what the tool does.
        fn description(&self) -> &str;
        /// Returns the JSON Schema for the tool's input parameters.
        fn parameters_schema(&self) -> Value;

        /// Error code used for business failures of this tool.
        fn error_code(&self) -> String {
            format!("{}_ERROR", self.name().to_uppercase())
        }

        /// Decodes `params`, runs the tool, and returns its result as a JSON object.
        async fn execute(
            &self,
            params: Map<String, Value>,
            ctx: &ExecutionContext,
        ) -> Result<Map<String, Value>, ToolError>;

        /// Converts the tool to its definition.
        fn to_definition(&self) -> ToolDefinition {
            ToolDefinition {
                name: self.name().to_string(),
                description: self.description().to_string(),
                input_schema: self.parameters_schema(),
            }
        }
    }

    /// A tool with a typed parameter struct and a typed result.
    ///
    /// Implementors get [`Tool`] for free; adding a tool means adding one
    /// parameter struct and one `call` body.
    #[async_trait]
    pub trait TypedTool: Send + Sync {
        /// Parameter struct decoded from the request's parameter bag.
        type Params: DeserializeOwned + JsonSchema + Send;
        /// Result struct; must serialize to a JSON object.
        type Output: Serialize + Send;

        /// Registry name of the tool.
        const NAME: &'static str;
        /// Human-readable description.
        const DESCRIPTION: &'static str;

        /// Fills defaults on freshly decoded parameters.
        fn normalize(&self, _params: &mut Self::Params) {}

        /// Runs the tool.
        async fn call(&self, params: Self::Params, ctx: &ExecutionContext) -> Result<Self::Output, ToolError>;
    }

    #[async_trait]
    impl<T: TypedTool> Tool for T {
        fn name(&self) -> &str {
            T::NAME
        }

        fn description(&self) -> &str {
            T::DESCRIPTION
        }

        fn parameters_schema(&self) -> Value {
            serde_json::to_value(schemars::schema_for!(T::Params)).unwrap_or_default()
        }

        async fn execute(
            &self,
            params: Map<String, Value>,
            ctx: &ExecutionContext,
        ) -> Result<Map<String, Value>, ToolError> {
            let mut typed: T::Params = decode_params(params).map_err(|e| {
                ToolError::InvalidParams(format!("invalid parameters for {}: {}", T::NAME, e))
            })?;
            self.normalize(&mut typed);

            let output = self.call(typed, ctx).await?;
            match serde_json::to_value(output) {
                Ok(Value::Object(map)) => Ok(map),
                Ok(other) => Err(ToolError::Internal(format!(
                    "{} returned a non-object result: {}",
                    T::NAME,
                    other
                ))),
                Err(e) => Err(ToolError::Internal(format!("serialize {} result: {}", T::NAME, e))),
            }
        }
    }

    /// A type alias for a dynamic tool reference.
    pub type DynTool = Arc<dyn Tool>;
}
