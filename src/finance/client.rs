use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Public Frankfurter endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.frankfurter.dev";

/// Budget for a single upstream request, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const DATE_FORMAT: &str = "%Y-%m-%d";

/// One day's exchange rate: units of quote currency per unit of base currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyRate {
    /// ISO-8601 calendar date, e.g. `2025-12-01`
    pub date: String,
    /// Rate on that date
    pub rate: f64,
}

/// Frankfurter time-series response.
#[derive(Debug, Deserialize)]
struct TimeSeriesResponse {
    #[serde(default)]
    base: String,
    #[serde(default)]
    start_date: String,
    #[serde(default)]
    end_date: String,
    /// "2025-01-02": { "EUR": 0.96 }
    #[serde(default)]
    rates: HashMap<String, HashMap<String, f64>>,
}

/// Errors that can occur when fetching a rate series.
#[derive(Debug, thiserror::Error)]
pub enum RateError {
    /// The HTTP client could not be constructed
    #[error("build http client: {0}")]
    Build(#[source] reqwest::Error),
    /// Connection failure or timeout
    #[error("call frankfurter: {0}")]
    Request(#[source] reqwest::Error),
    /// The caller cancelled before a response arrived
    #[error("call frankfurter: request cancelled")]
    Cancelled,
    /// Any status other than 200
    #[error("frankfurter returned status {0}")]
    Status(u16),
    /// The body was not a valid time series
    #[error("decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Source of daily exchange-rate series.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Fetches the `quote` rate per day for `base` over `[start, end]`.
    ///
    /// The returned list is in no particular order.
    async fn fetch_series(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyRate>, RateError>;
}

/// A builder for creating rate clients.
#[derive(Debug, Default)]
pub struct RateClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
}

impl RateClientBuilder {
    /// Creates a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Creates a Frankfurter client.
    pub fn build(self) -> Result<FrankfurterClient, RateError> {
        let client = Client::builder()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(RateError::Build)?;

        let base_url = self.base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        Ok(FrankfurterClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

/// HTTP client for the Frankfurter exchange-rate API.
///
/// Holds only configuration and a connection pool, so one instance is shared
/// by every dispatch.
#[derive(Debug, Clone)]
pub struct FrankfurterClient {
    client: Client,
    base_url: String,
}

impl FrankfurterClient {
    /// Base URL requests are issued against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn series_url(&self, start: NaiveDate, end: NaiveDate) -> String {
        format!(
            "{}/v1/{}..{}",
            self.base_url,
            start.format(DATE_FORMAT),
            end.format(DATE_FORMAT)
        )
    }
}

/// Picks out the `quote` rate per date, skipping dates that lack it.
fn extract_rates(series: TimeSeriesResponse, quote: &str) -> Vec<DailyRate> {
    series
        .rates
        .into_iter()
        .filter_map(|(date, by_currency)| {
            by_currency
                .get(quote)
                .map(|&rate| DailyRate { date, rate })
        })
        .collect()
}

#[async_trait]
impl RateProvider for FrankfurterClient {
    async fn fetch_series(
        &self,
        base: &str,
        quote: &str,
        start: NaiveDate,
        end: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<DailyRate>, RateError> {
        let url = self.series_url(start, end);
        debug!(%url, base, quote, "Requesting rate series");

        let request = self
            .client
            .get(&url)
            .query(&[("base", base), ("symbols", quote)])
            .send();

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RateError::Cancelled),
            result = request => result.map_err(RateError::Request)?,
        };

        if response.status() != StatusCode::OK {
            return Err(RateError::Status(response.status().as_u16()));
        }

        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RateError::Cancelled),
            result = response.text() => result.map_err(RateError::Request)?,
        };

        let series: TimeSeriesResponse = serde_json::from_str(&body).map_err(RateError::Decode)?;
        debug!(
            base = %series.base,
            start_date = %series.start_date,
            end_date = %series.end_date,
            days = series.rates.len(),
            "Rate series received"
        );

        Ok(extract_rates(series, quote))
    }
}
