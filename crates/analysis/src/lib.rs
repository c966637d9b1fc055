pub mod cloud;
pub mod error;
pub mod fetch;
pub mod pipeline;
pub mod reconcile;

pub use cloud::AzureDocumentClient;
pub use error::{AnalysisError, FetchError};
pub use fetch::ImageFetcher;
pub use pipeline::{ReceiptAnalysis, ReceiptAnalyzer};
pub use reconcile::FieldReconciler;
