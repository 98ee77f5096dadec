//! # Biz Engine
//!
//! A tool-dispatch engine that exposes business data sources to an AI planner
//! as named tools with a single, stable response envelope.
//!
//! ## Features
//!
//! - **Dispatcher**: Routes a tool name and an untyped parameter bag to a typed handler
//! - **Envelope**: Every outcome, success or business error, has the same shape and metrics
//! - **Financial Analyzer**: Exchange-rate statistics backed by the Frankfurter API
//! - **HTTP Transport**: A thin axum server exposing `/execute-tool`, `/tools` and `/health`
//!
//! ## Quick Start
//!
//! ```no_run
//! use biz_engine::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let dispatcher = build_dispatcher(&EngineConfig::default())?;
//!
//!     let params = json!({"base_currency": "USD", "quote_currency": "EUR", "days": 7});
//!     let request = ToolInvocationRequest::new("financial_analyzer", "req-1")
//!         .with_params(params.as_object().cloned().unwrap_or_default());
//!
//!     let response = dispatcher.dispatch(&request).await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod finance;
pub mod server;
pub mod tool;

use std::sync::Arc;

// Re-exports for convenient usage
pub use config::{DEFAULT_ENGINE_VERSION, EngineConfig};
pub use error::EngineError;
pub use finance::{
    AnalysisError, DailyRate, FinancialAnalysisParameters, FinancialAnalysisResult, FinancialAnalyzer,
    FrankfurterClient, RateClientBuilder, RateError, RateProvider,
};
pub use tool::{
    DispatchError, DynTool, ErrorInfo, ExecutionContext, Metrics, ResponseStatus, Tool, ToolDefinition,
    ToolDispatcher, ToolError, ToolInvocationRequest, ToolInvocationResponse, ToolRegistry, TypedTool,
};

/// Registers every built-in tool against `provider`.
pub fn builtin_registry(provider: Arc<dyn RateProvider>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(FinancialAnalyzer::new(provider));
    registry
}

/// Builds a dispatcher with the built-in tools and a Frankfurter client from `config`.
pub fn build_dispatcher(config: &EngineConfig) -> Result<ToolDispatcher, EngineError> {
    let client = RateClientBuilder::new()
        .with_base_url(config.rate_api_url.clone())
        .with_timeout(config.rate_timeout)
        .build()?;

    Ok(ToolDispatcher::new(
        builtin_registry(Arc::new(client)),
        config.engine_version.clone(),
    ))
}

/// Prelude module with commonly used types.
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::tool::{
        ResponseStatus, ToolDispatcher, ToolInvocationRequest, ToolInvocationResponse, ToolRegistry,
        TypedTool,
    };
    pub use crate::{build_dispatcher, builtin_registry};
}
