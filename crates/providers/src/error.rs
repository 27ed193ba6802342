//! Provider-layer error taxonomy.

use atelier_core::error::CoreError;

/// Errors from provider adapters and their HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-2xx status code.
    #[error("Provider API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// The provider answered but the response carried no usable artifact.
    #[error("Provider returned no usable result: {0}")]
    MissingResult(String),

    /// Every call of a synchronous batch failed.
    #[error("All {attempted} provider calls failed; first error: {first_error}")]
    AllOutputsFailed { attempted: u32, first_error: String },

    /// A long-running operation did not finish within the poll budget.
    #[error("Operation did not complete after {attempts} poll attempts")]
    TimedOut { attempts: u32 },

    /// Failure reported by a provider in-band (operation error payload,
    /// stub backends, ...).
    #[error("Provider call failed: {0}")]
    Upstream(String),
}

impl From<ProviderError> for CoreError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::TimedOut { .. } => CoreError::TimedOut(err.to_string()),
            other => CoreError::Provider(other.to_string()),
        }
    }
}
