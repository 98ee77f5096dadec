//! Exchange-rate statistics over a trailing window of days.

use async_trait::async_trait;
use chrono::{Days, NaiveDate, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::client::{DailyRate, RateError, RateProvider};
use crate::tool::{ExecutionContext, ToolError, TypedTool};

/// Window length used when a dispatched request omits `days` or sends `<= 0`.
pub const DEFAULT_DAYS: i64 = 30;

/// Parameters of the `financial_analyzer` tool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct FinancialAnalysisParameters {
    /// Base currency code, e.g. `USD` (case-insensitive)
    #[serde(deserialize_with = "null_as_default")]
    pub base_currency: String,
    /// Quote currency code, e.g. `EUR` (case-insensitive)
    #[serde(deserialize_with = "null_as_default")]
    pub quote_currency: String,
    /// Number of trailing days, today included
    #[serde(deserialize_with = "null_as_default")]
    pub days: i64,
    /// Reserved; not used by the computation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
}

// planners send `null` for fields they leave unset
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Aggregate statistics over a sorted rate series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialAnalysisResult {
    pub rate_avg: f64,
    pub rate_min: f64,
    pub rate_max: f64,
    /// Population standard deviation of the daily rates
    pub volatility: f64,
    /// Daily rates, ascending by date
    pub raw: Vec<DailyRate>,
}

/// Errors from [`FinancialAnalyzer::analyze`].
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    /// The parameters were rejected before any network call.
    #[error("{0}")]
    Validation(String),
    /// The rate provider failed.
    #[error(transparent)]
    Upstream(#[from] RateError),
    /// The provider answered with no usable data points.
    #[error("no rates returned for {base}/{quote}")]
    EmptySeries { base: String, quote: String },
}

impl From<AnalysisError> for ToolError {
    fn from(err: AnalysisError) -> Self {
        match err {
            AnalysisError::Validation(message) => ToolError::InvalidParams(message),
            other => ToolError::Failed(other.to_string()),
        }
    }
}

/// Source of "today" for the analysis window.
pub trait Clock: Send + Sync {
    /// The current calendar date.
    fn today(&self) -> NaiveDate;
}

/// UTC wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// Computes rate statistics for a currency pair.
#[derive(Clone)]
pub struct FinancialAnalyzer {
    provider: Arc<dyn RateProvider>,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for FinancialAnalyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinancialAnalyzer").finish_non_exhaustive()
    }
}

impl FinancialAnalyzer {
    /// Creates an analyzer that reads the UTC clock.
    pub fn new(provider: Arc<dyn RateProvider>) -> Self {
        Self {
            provider,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Fetches the trailing `days` of rates and summarizes them.
    ///
    /// Unlike the dispatched tool, this does not default `days`; a
    /// non-positive value is rejected.
    pub async fn analyze(
        &self,
        params: &FinancialAnalysisParameters,
        cancel: &CancellationToken,
    ) -> Result<FinancialAnalysisResult, AnalysisError> {
        let base = params.base_currency.trim().to_uppercase();
        let quote = params.quote_currency.trim().to_uppercase();

        if base.is_empty() || quote.is_empty() {
            return Err(AnalysisError::Validation(
                "base_currency and quote_currency are required".to_string(),
            ));
        }
        if params.days <= 0 {
            return Err(AnalysisError::Validation("days must be > 0".to_string()));
        }

        let end = self.clock.today();
        // days > 0, so the cast is lossless
        let start = end
            .checked_sub_days(Days::new(params.days as u64 - 1))
            .ok_or_else(|| AnalysisError::Validation(format!("days out of range: {}", params.days)))?;

        debug!(%base, %quote, %start, %end, "Analyzing rate window");
        let rates = self
            .provider
            .fetch_series(&base, &quote, start, end, cancel)
            .await?;

        summarize(rates).ok_or(AnalysisError::EmptySeries { base, quote })
    }
}

/// Sorts `rates` by date and computes mean, range, and population volatility.
///
/// Returns `None` for an empty series.
pub fn summarize(mut rates: Vec<DailyRate>) -> Option<FinancialAnalysisResult> {
    let first = rates.first()?.rate;

    // ISO-8601 dates sort chronologically as strings
    rates.sort_by(|a, b| a.date.cmp(&b.date));

    let (sum, min, max) = rates
        .iter()
        .fold((0.0, first, first), |(sum, min, max), r| {
            (sum + r.rate, f64::min(min, r.rate), f64::max(max, r.rate))
        });

    let n = rates.len() as f64;
    // rounding can push the mean an ulp outside the observed range
    let avg = (sum / n).clamp(min, max);

    let variance = rates.iter().map(|r| (r.rate - avg).powi(2)).sum::<f64>() / n;

    Some(FinancialAnalysisResult {
        rate_avg: avg,
        rate_min: min,
        rate_max: max,
        volatility: variance.sqrt(),
        raw: rates,
    })
}

#[async_trait]
impl TypedTool for FinancialAnalyzer {
    type Params = FinancialAnalysisParameters;
    type Output = FinancialAnalysisResult;

    const NAME: &'static str = "financial_analyzer";
    const DESCRIPTION: &'static str =
        "Average, range and volatility of a currency pair's daily exchange rate over the last N days";

    fn normalize(&self, params: &mut FinancialAnalysisParameters) {
        if params.days <= 0 {
            params.days = DEFAULT_DAYS;
        }
    }

    async fn call(
        &self,
        params: FinancialAnalysisParameters,
        ctx: &ExecutionContext,
    ) -> Result<FinancialAnalysisResult, ToolError> {
        debug!(
            correlation_id = %ctx.correlation_id,
            caller = ctx.caller_id.as_deref().unwrap_or("-"),
            "Running financial analysis"
        );
        let result = self.analyze(&params, ctx.cancellation()).await;
        if !matches!(result, Err(AnalysisError::Validation(_))) {
            ctx.record_upstream_call();
        }
        Ok(result?)
    }
}
