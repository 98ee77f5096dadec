pub mod analyzer;
pub mod client;

pub use analyzer::{
    AnalysisError, Clock, DEFAULT_DAYS, FinancialAnalysisParameters, FinancialAnalysisResult,
    FinancialAnalyzer, SystemClock, summarize,
};
pub use client::{
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT, DailyRate, FrankfurterClient, RateClientBuilder, RateError,
    RateProvider,
};

#[cfg(test)]
pub use client::MockRateProvider;
