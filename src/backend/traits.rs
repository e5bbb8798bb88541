//! Backend trait and error types.

use std::time::Duration;

use thiserror::Error;

use super::model::RangeResponse;
use crate::timerange::TimeRange;

/// Default range-query resolution (15 seconds).
pub const DEFAULT_STEP: Duration = Duration::from_secs(15);

/// Errors returned by a [`Backend`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The client could not be built. Fatal for the whole run.
    #[error("failed to create backend client: {0}")]
    ClientConstruction(String),

    /// Connection failure, transport error or timeout.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The backend answered with a result other than a range matrix.
    #[error("unexpected result shape: expected matrix, got {0}")]
    UnexpectedResultShape(String),

    /// The backend rejected the query.
    #[error("backend error ({error_type}): {message}")]
    Api { error_type: String, message: String },

    /// The response body could not be decoded.
    #[error("failed to decode backend response: {0}")]
    Decode(String),
}

impl BackendError {
    /// Whether this error should abort the run instead of a single query.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ClientConstruction(_))
    }
}

/// Range-query capability consumed by the scheduler.
///
/// Implementations must be safe to call concurrently: one tick issues one
/// call per catalog query in parallel against the same instance.
///
/// # Error Handling
///
/// - Transport failures and timeouts map to [`BackendError::Unreachable`].
/// - A non-matrix result maps to [`BackendError::UnexpectedResultShape`].
/// - Backend warnings are *not* errors; they travel in
///   [`RangeResponse::warnings`].
#[async_trait::async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Short name used in logs (e.g., "prometheus").
    fn name(&self) -> &str;

    /// Execute `expression` over `range` at resolution `step`.
    async fn execute(
        &self,
        expression: &str,
        range: &TimeRange,
        step: Duration,
    ) -> Result<RangeResponse, BackendError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_client_construction_is_fatal() {
        assert!(BackendError::ClientConstruction("bad url".into()).is_fatal());
        assert!(!BackendError::Unreachable("refused".into()).is_fatal());
        assert!(!BackendError::UnexpectedResultShape("vector".into()).is_fatal());
        assert!(!BackendError::Decode("eof".into()).is_fatal());
    }

    #[test]
    fn test_error_messages() {
        let err = BackendError::UnexpectedResultShape("scalar".into());
        assert_eq!(err.to_string(), "unexpected result shape: expected matrix, got scalar");

        let err = BackendError::Api {
            error_type: "bad_data".into(),
            message: "parse error".into(),
        };
        assert_eq!(err.to_string(), "backend error (bad_data): parse error");
    }
}
