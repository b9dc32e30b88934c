//! Error types for admission control.

use std::time::Duration;

use crate::storage::StorageError;

/// Errors that fail an admission decision.
///
/// An exhausted budget is not an error: it is a denied [`crate::AdmissionDecision`].
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The counter store could not be consulted, so throughput cannot be enforced.
    #[error("Counter store failure: {0}")]
    Counter(#[from] StorageError),
}

/// Errors from an entitlement lookup. These never leave the scope resolver.
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    /// The entitlement source failed.
    #[error("Entitlement source unavailable: {0}")]
    Unavailable(String),

    /// The entitlement source did not answer in time.
    #[error("Entitlement lookup timed out after {0:?}")]
    Timeout(Duration),
}

/// Errors when building a throughput policy.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// A limited policy needs a window of at least one second.
    #[error("A limited policy needs a window of at least one second")]
    ZeroWindow,
}
