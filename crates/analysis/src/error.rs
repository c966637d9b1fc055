use receiptly_core::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid image URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP error fetching image: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Image server returned HTTP {status}")]
    Status { status: u16 },
}

impl FetchError {
    /// Transport failures and non-2xx responses are worth another attempt.
    pub fn is_retriable(&self) -> bool {
        !matches!(self, FetchError::InvalidUrl { .. })
    }
}

/// The one error a caller of the analyzer sees. Every other stage either
/// recovers or degrades to a weaker result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Failed to fetch image: {0}")]
    Fetch(#[from] FetchError),
    #[error("Input is not a readable image: {0}")]
    UnreadableInput(String),
    #[error("Document service failed: {0}")]
    Service(#[from] ServiceError),
    #[error("No receipt data found in the image")]
    NoReceiptData,
    #[error("Worker task failed: {0}")]
    Worker(String),
}

impl From<tokio::task::JoinError> for AnalysisError {
    fn from(e: tokio::task::JoinError) -> Self {
        AnalysisError::Worker(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_url_is_not_retriable() {
        let err = FetchError::InvalidUrl { url: "nope".into(), reason: "relative URL".into() };
        assert!(!err.is_retriable());
        assert!(FetchError::Status { status: 503 }.is_retriable());
        assert!(FetchError::Status { status: 404 }.is_retriable());
    }

    #[test]
    fn service_errors_convert() {
        let err: AnalysisError = ServiceError::Timeout(120).into();
        assert!(matches!(err, AnalysisError::Service(ServiceError::Timeout(120))));
        assert_eq!(err.to_string(), "Document service failed: Analysis still running after 120 polls");
    }
}
