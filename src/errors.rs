use std::time::Duration;

use thiserror::Error;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Config(String),
    #[error("Authorization rejected: {0}")]
    Auth(String),
    #[error("Upstream unavailable: {0}")]
    Transient(String),
    #[error("Unexpected upstream response: {0}")]
    Protocol(String),
    #[error("Ingestion exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl IngestError {
    /// Only transient upstream failures are worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(IngestError::Transient("503".into()).is_retryable());
        assert!(!IngestError::Auth("401".into()).is_retryable());
        assert!(!IngestError::Protocol("bad json".into()).is_retryable());
        assert!(!IngestError::Config("bucket".into()).is_retryable());
        assert!(!IngestError::DeadlineExceeded(Duration::from_secs(1)).is_retryable());
    }
}
