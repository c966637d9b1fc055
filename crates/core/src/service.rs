use std::future::Future;

use thiserror::Error;

use crate::cloud::{AnalyzedReceipt, LayoutResult};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Document service is not configured: {0}")]
    NotConfigured(String),
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Analysis failed: {0}")]
    Failed(String),
    #[error("Malformed service response: {0}")]
    Protocol(String),
    #[error("Analysis still running after {0} polls")]
    Timeout(usize),
}

/// Structured receipt extraction. `Ok(None)` means the service found no document.
pub trait DocumentService: Send + Sync {
    fn analyze_receipt(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<Option<AnalyzedReceipt>, ServiceError>> + Send;
}

/// Page and text-line geometry, used to locate the receipt in a photo.
pub trait LayoutService: Send + Sync {
    fn analyze_layout(
        &self,
        image: &[u8],
    ) -> impl Future<Output = Result<LayoutResult, ServiceError>> + Send;
}
