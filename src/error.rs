//! Error types for the biz-engine library.

use thiserror::Error;

/// Errors raised while assembling the engine.
///
/// Dispatch itself never fails with this type: business errors travel in the
/// response envelope and faults as [`crate::tool::DispatchError`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Exchange-rate provider error
    #[error("Rate provider error: {0}")]
    Rate(#[from] crate::finance::RateError),
}
