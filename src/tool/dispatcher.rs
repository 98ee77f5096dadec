use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, info_span, warn};

use crate::tool::{
    DynTool, ErrorInfo, ExecutionContext, Metrics, ToolError, ToolInvocationRequest,
    ToolInvocationResponse, ToolRegistry,
};

/// A fault the dispatcher cannot express as a business error.
///
/// Transports should answer these with a generic internal-error response
/// rather than forwarding the details.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// A tool panicked or produced a result that does not fit the envelope.
    #[error("internal fault in tool {tool}: {reason}")]
    Internal { tool: String, reason: String },
}

/// Routes invocation requests to registered tools and normalizes the result.
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    registry: Arc<ToolRegistry>,
    engine_version: String,
}

impl ToolDispatcher {
    /// Creates a dispatcher over a fully populated registry.
    pub fn new(registry: ToolRegistry, engine_version: impl Into<String>) -> Self {
        Self {
            registry: Arc::new(registry),
            engine_version: engine_version.into(),
        }
    }

    /// The registry this dispatcher routes into.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Version string stamped on every response.
    pub fn engine_version(&self) -> &str {
        &self.engine_version
    }

    /// Dispatches `request` with no external cancellation.
    pub async fn dispatch(
        &self,
        request: &ToolInvocationRequest,
    ) -> Result<ToolInvocationResponse, DispatchError> {
        self.dispatch_with_cancel(request, &CancellationToken::new()).await
    }

    /// Dispatches `request`, aborting the tool's upstream work once `cancel` fires
    /// or this future is dropped.
    ///
    /// Unknown tools, bad parameters and tool failures all come back as `Ok`
    /// error envelopes. Only [`DispatchError`] is returned as `Err`.
    pub async fn dispatch_with_cancel(
        &self,
        request: &ToolInvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolInvocationResponse, DispatchError> {
        let span = info_span!(
            "dispatch",
            tool = %request.tool_name,
            correlation_id = %request.correlation_id
        );
        self.dispatch_inner(request, cancel).instrument(span).await
    }

    async fn dispatch_inner(
        &self,
        request: &ToolInvocationRequest,
        cancel: &CancellationToken,
    ) -> Result<ToolInvocationResponse, DispatchError> {
        let start = Instant::now();
        let mut upstream_calls = 0;

        let outcome = match self.registry.get(&request.tool_name) {
            None => Err(ErrorInfo::new(
                ErrorInfo::UNKNOWN_TOOL,
                format!("tool not supported: {}", request.tool_name),
            )),
            Some(tool) => {
                let token = cancel.child_token();
                let _abort_on_drop = token.clone().drop_guard();
                let ctx = ExecutionContext::new(request.correlation_id.clone())
                    .with_caller(request.caller_id.clone())
                    .with_cancellation(token);

                let result = Self::invoke(tool.clone(), request.parameters.clone(), ctx.clone()).await;
                upstream_calls = ctx.upstream_calls();

                match result {
                    Ok(data) => Ok(data),
                    Err(ToolError::InvalidParams(message)) => {
                        Err(ErrorInfo::new(ErrorInfo::INVALID_PARAMS, message))
                    }
                    Err(ToolError::Failed(message)) => Err(ErrorInfo::new(tool.error_code(), message)),
                    Err(ToolError::Internal(reason)) => {
                        error!(%reason, "tool fault");
                        return Err(DispatchError::Internal {
                            tool: request.tool_name.clone(),
                            reason,
                        });
                    }
                }
            }
        };

        // engine time is not yet separated from total dispatch time
        let latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let metrics = Metrics {
            latency_ms,
            engine_time_ms: latency_ms,
            upstream_calls,
        };
        let response =
            ToolInvocationResponse::from_outcome(request, outcome, metrics, self.engine_version.as_str());

        match &response.error {
            None => info!(latency_ms, upstream_calls, "tool succeeded"),
            Some(err) => warn!(code = %err.code, message = %err.message, latency_ms, "tool returned error"),
        }

        Ok(response)
    }

    /// Runs the tool on its own task so a panic surfaces as a fault instead of
    /// tearing down the caller.
    async fn invoke(
        tool: DynTool,
        params: Map<String, Value>,
        ctx: ExecutionContext,
    ) -> Result<Map<String, Value>, ToolError> {
        let name = tool.name().to_string();
        tokio::spawn(async move { tool.execute(params, &ctx).await })
            .await
            .unwrap_or_else(|join_err| {
                Err(ToolError::Internal(format!("{} task failed: {}", name, join_err)))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::finance::{DailyRate, FinancialAnalyzer, MockRateProvider, RateClientBuilder, RateError};
    use crate::finance::analyzer::tests::FixedClock;
    use crate::tool::{ResponseStatus, TypedTool};
    use chrono::NaiveDate;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::json;
    use tokio_test::assert_ok;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 14).unwrap()
    }

    fn params(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    fn dispatcher_with(provider: MockRateProvider) -> ToolDispatcher {
        let analyzer = FinancialAnalyzer::new(Arc::new(provider)).with_clock(Arc::new(FixedClock(today())));
        let mut registry = ToolRegistry::new();
        registry.register(analyzer);
        ToolDispatcher::new(registry, "biz-engine/test")
    }

    fn analyzer_request(p: Value) -> ToolInvocationRequest {
        ToolInvocationRequest::new("financial_analyzer", "corr-42").with_params(params(p))
    }

    #[derive(Deserialize, JsonSchema)]
    struct Empty {}

    struct Panicky;

    #[async_trait::async_trait]
    impl TypedTool for Panicky {
        type Params = Empty;
        type Output = Map<String, Value>;
        const NAME: &'static str = "panicky";
        const DESCRIPTION: &'static str = "always panics";

        async fn call(&self, _: Empty, _: &ExecutionContext) -> Result<Self::Output, ToolError> {
            panic!("boom")
        }
    }

    struct Scalar;

    #[async_trait::async_trait]
    impl TypedTool for Scalar {
        type Params = Empty;
        type Output = f64;
        const NAME: &'static str = "scalar";
        const DESCRIPTION: &'static str = "returns a bare number";

        async fn call(&self, _: Empty, _: &ExecutionContext) -> Result<f64, ToolError> {
            Ok(1.5)
        }
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dispatcher = dispatcher_with(MockRateProvider::new());
        let request = ToolInvocationRequest::new("does_not_exist", "corr-1");

        let response = assert_ok!(dispatcher.dispatch(&request).await);

        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_code(), Some("UNKNOWN_TOOL"));
        assert!(response.data.is_none());
        assert_eq!(response.tool_name, "does_not_exist");
        assert_eq!(response.correlation_id, "corr-1");
        assert_eq!(response.engine_version, "biz-engine/test");
        assert_eq!(response.metrics.latency_ms, response.metrics.engine_time_ms);
        assert_eq!(response.metrics.upstream_calls, 0);
    }

    #[tokio::test]
    async fn test_decode_failure_is_invalid_params() {
        let mut provider = MockRateProvider::new();
        provider.expect_fetch_series().never();
        let dispatcher = dispatcher_with(provider);

        let response = assert_ok!(
            dispatcher
                .dispatch(&analyzer_request(json!({"base_currency": "USD", "quote_currency": "EUR", "days": "seven"})))
                .await
        );

        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_code(), Some("INVALID_PARAMS"));
        let message = &response.error.as_ref().unwrap().message;
        assert!(message.starts_with("invalid parameters for financial_analyzer:"), "{message}");
    }

    #[tokio::test]
    async fn test_empty_currency_is_invalid_params_without_network() {
        let mut provider = MockRateProvider::new();
        provider.expect_fetch_series().never();
        let dispatcher = dispatcher_with(provider);

        let response = assert_ok!(
            dispatcher
                .dispatch(&analyzer_request(json!({"base_currency": "", "quote_currency": "EUR", "days": 7})))
                .await
        );

        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_code(), Some("INVALID_PARAMS"));
        assert_eq!(
            response.error.as_ref().unwrap().message,
            "base_currency and quote_currency are required"
        );
        assert_eq!(response.metrics.upstream_calls, 0);
    }

    #[tokio::test]
    async fn test_unset_days_defaults_to_thirty_day_window() {
        let cases = [
            json!({"base_currency": "usd", "quote_currency": "eur", "days": 0}),
            json!({"base_currency": "usd", "quote_currency": "eur", "days": -5}),
            json!({"base_currency": "usd", "quote_currency": "eur"}),
            json!({"base_currency": "usd", "quote_currency": "eur", "days": null}),
        ];
        let expected_start = NaiveDate::from_ymd_opt(2025, 2, 13).unwrap();
        let mut provider = MockRateProvider::new();
        provider
            .expect_fetch_series()
            .withf(move |_, _, start, end, _| start == &expected_start && end == &today())
            .times(cases.len())
            .returning(|_, _, _, _, _| {
                Ok(vec![DailyRate {
                    date: "2025-03-14".to_string(),
                    rate: 0.92,
                }])
            });
        let dispatcher = dispatcher_with(provider);

        for case in cases {
            let response = assert_ok!(dispatcher.dispatch(&analyzer_request(case.clone())).await);

            assert_eq!(response.status, ResponseStatus::Success, "{case}");
            assert_eq!(response.metrics.upstream_calls, 1, "{case}");
        }
    }

    #[tokio::test]
    async fn test_null_currency_is_validation_error() {
        let mut provider = MockRateProvider::new();
        provider.expect_fetch_series().never();
        let dispatcher = dispatcher_with(provider);

        let response = assert_ok!(
            dispatcher
                .dispatch(&analyzer_request(json!({"base_currency": "USD", "quote_currency": null, "days": 7})))
                .await
        );

        assert_eq!(response.error_code(), Some("INVALID_PARAMS"));
        assert_eq!(
            response.error.as_ref().unwrap().message,
            "base_currency and quote_currency are required"
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_uses_tool_error_code() {
        let mut provider = MockRateProvider::new();
        provider
            .expect_fetch_series()
            .returning(|_, _, _, _, _| Err(RateError::Status(503)));
        let dispatcher = dispatcher_with(provider);

        let response = assert_ok!(
            dispatcher
                .dispatch(&analyzer_request(json!({"base_currency": "USD", "quote_currency": "EUR", "days": 7})))
                .await
        );

        assert_eq!(response.error_code(), Some("FINANCIAL_ANALYZER_ERROR"));
        assert_eq!(response.error.unwrap().message, "frankfurter returned status 503");
        assert_eq!(response.metrics.upstream_calls, 1);
    }

    #[tokio::test]
    async fn test_empty_series_uses_tool_error_code() {
        let mut provider = MockRateProvider::new();
        provider.expect_fetch_series().returning(|_, _, _, _, _| Ok(Vec::new()));
        let dispatcher = dispatcher_with(provider);

        let response = assert_ok!(
            dispatcher
                .dispatch(&analyzer_request(json!({"base_currency": "USD", "quote_currency": "EUR", "days": 7})))
                .await
        );

        assert_eq!(response.status, ResponseStatus::Error);
        assert_eq!(response.error_code(), Some("FINANCIAL_ANALYZER_ERROR"));
        assert!(response.error.unwrap().message.contains("no rates returned for USD/EUR"));
    }

    #[tokio::test]
    async fn test_identical_requests_produce_identical_envelopes() {
        let mut provider = MockRateProvider::new();
        provider.expect_fetch_series().times(2).returning(|_, _, _, _, _| {
            Ok(vec![
                DailyRate { date: "2025-03-13".to_string(), rate: 1.0 },
                DailyRate { date: "2025-03-14".to_string(), rate: 2.0 },
            ])
        });
        let dispatcher = dispatcher_with(provider);
        let request = analyzer_request(json!({"base_currency": "USD", "quote_currency": "EUR", "days": 2}));

        let mut first = assert_ok!(dispatcher.dispatch(&request).await);
        let mut second = assert_ok!(dispatcher.dispatch(&request).await);
        first.metrics = Metrics::default();
        second.metrics = Metrics::default();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_panicking_tool_is_internal_fault() {
        let mut registry = ToolRegistry::new();
        registry.register(Panicky);
        let dispatcher = ToolDispatcher::new(registry, "v");

        let err = dispatcher
            .dispatch(&ToolInvocationRequest::new("panicky", "c"))
            .await
            .unwrap_err();

        let DispatchError::Internal { tool, .. } = err;
        assert_eq!(tool, "panicky");
    }

    #[tokio::test]
    async fn test_non_object_result_is_internal_fault() {
        let mut registry = ToolRegistry::new();
        registry.register(Scalar);
        let dispatcher = ToolDispatcher::new(registry, "v");

        let result = dispatcher.dispatch(&ToolInvocationRequest::new("scalar", "c")).await;

        assert!(matches!(result, Err(DispatchError::Internal { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_caller_surfaces_business_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"rates": {}}))
                    .set_delay(std::time::Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = RateClientBuilder::new().with_base_url(server.uri()).build().unwrap();
        let analyzer = FinancialAnalyzer::new(Arc::new(client)).with_clock(Arc::new(FixedClock(today())));
        let mut registry = ToolRegistry::new();
        registry.register(analyzer);
        let dispatcher = ToolDispatcher::new(registry, "v");

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let request = analyzer_request(json!({"base_currency": "USD", "quote_currency": "EUR", "days": 7}));
        let response = assert_ok!(dispatcher.dispatch_with_cancel(&request, &cancel).await);

        assert_eq!(response.error_code(), Some("FINANCIAL_ANALYZER_ERROR"));
        assert_eq!(response.error.unwrap().message, "call frankfurter: request cancelled");
    }

    #[tokio::test]
    async fn test_happy_path_against_http_provider() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/2025-03-08..2025-03-14"))
            .and(query_param("base", "USD"))
            .and(query_param("symbols", "EUR"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "base": "USD",
                "start_date": "2025-03-08",
                "end_date": "2025-03-14",
                "rates": {
                    "2025-03-14": {"EUR": 0.95},
                    "2025-03-09": {"EUR": 0.90},
                    "2025-03-12": {"EUR": 0.93},
                    "2025-03-08": {"EUR": 0.89},
                    "2025-03-11": {"EUR": 0.92},
                    "2025-03-13": {"EUR": 0.94},
                    "2025-03-10": {"EUR": 0.91}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RateClientBuilder::new().with_base_url(server.uri()).build().unwrap();
        let analyzer = FinancialAnalyzer::new(Arc::new(client)).with_clock(Arc::new(FixedClock(today())));
        let mut registry = ToolRegistry::new();
        registry.register(analyzer);
        let dispatcher = ToolDispatcher::new(registry, "biz-engine/test");

        let request = analyzer_request(json!({"base_currency": "USD", "quote_currency": "EUR", "days": 7}));
        let response = assert_ok!(dispatcher.dispatch(&request).await);

        assert_eq!(response.status, ResponseStatus::Success);
        assert!(response.error.is_none());
        assert_eq!(response.correlation_id, "corr-42");
        assert_eq!(response.metrics.upstream_calls, 1);

        let data = response.data.unwrap();
        let raw = data["raw"].as_array().unwrap();
        assert_eq!(raw.len(), 7);
        let dates: Vec<_> = raw.iter().map(|r| r["date"].as_str().unwrap()).collect();
        let mut sorted = dates.clone();
        sorted.sort();
        assert_eq!(dates, sorted);
        assert_eq!(data["rate_min"], 0.89);
        assert_eq!(data["rate_max"], 0.95);
        let avg = data["rate_avg"].as_f64().unwrap();
        assert!((avg - 0.92).abs() < 1e-9);
    }
}
